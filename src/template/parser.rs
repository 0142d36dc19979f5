// src/template/parser.rs

// --- Imports ---
use crate::ooxml;
use crate::utils::error::{OoxmlError, TemplateError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

// --- Regex Patterns (Lazy Static) ---
// Field lines look like "Name:" or "Name: inline description".
static FIELD_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?):\s*(.*)$").expect("Failed to compile FIELD_LINE_RE")
});

// --- Data Structures ---

/// One field the extraction driver should ask for. Field names double as
/// prompt keys and output spreadsheet column headers, in template order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateField {
    pub name: String,
    pub section: Option<String>,
    pub description: Option<String>,
}

/// Which parser handles a template file, picked by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormat {
    Word,
    Excel,
}

/// Picks the parser for a template path. The path must exist; the extension
/// must be .docx or .xlsx. Legacy .xls is a binary OLE format we cannot
/// read, so it is rejected here rather than failing deep in the zip layer.
pub fn detect_format(path: &Path) -> Result<TemplateFormat, TemplateError> {
    if !path.exists() {
        return Err(TemplateError::NotFound(path.to_path_buf()));
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "docx" => Ok(TemplateFormat::Word),
        "xlsx" => Ok(TemplateFormat::Excel),
        _ => Err(TemplateError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Parses a template file into an ordered field list.
///
/// Word templates declare fields as colon-terminated paragraph lines grouped
/// under plain-text section headers; Excel templates declare them as the
/// header row of the first worksheet. A template with zero fields is an
/// error, since a run with nothing to extract is always a user mistake.
pub fn parse_template(path: &Path) -> Result<Vec<TemplateField>, TemplateError> {
    let format = detect_format(path)?;
    tracing::info!("Parsing template {} as {:?}", path.display(), format);

    let corrupt = |source: OoxmlError| TemplateError::Corrupt {
        path: path.to_path_buf(),
        source,
    };

    let fields = match format {
        TemplateFormat::Word => {
            let paragraphs = ooxml::docx_paragraphs(path).map_err(corrupt)?;
            parse_word_lines(&paragraphs)
        }
        TemplateFormat::Excel => {
            let rows = ooxml::read_sheet_rows(path).map_err(corrupt)?;
            let header = rows.first().map(|r| r.as_slice()).unwrap_or(&[]);
            parse_excel_header(header)
        }
    };

    if fields.is_empty() {
        return Err(TemplateError::Empty(path.to_path_buf()));
    }

    tracing::info!("Parsed {} fields from {}", fields.len(), path.display());
    Ok(fields)
}

/// A flush-left line that does not end in a colon is a section header, as
/// long as any colon it carries sits inside parentheses. Headers like
/// "Baseline Characteristics (Continuous: Mean ± SD)" must not be split at
/// their inner colon, so this check runs before the field pattern.
fn is_section_header(raw: &str, text: &str) -> bool {
    if raw.starts_with(char::is_whitespace) || text.ends_with(':') {
        return false;
    }
    !has_colon_outside_parens(text)
}

fn has_colon_outside_parens(text: &str) -> bool {
    let mut depth: u32 = 0;
    for ch in text.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

/// Classifies Word paragraph lines into section headers and field
/// definitions. The current section is threaded through the loop as a plain
/// accumulator; a later header replaces it for all following fields.
pub fn parse_word_lines(lines: &[String]) -> Vec<TemplateField> {
    let mut fields: Vec<TemplateField> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut current_section: Option<String> = None;

    for raw in lines {
        let text = raw.trim();
        if text.is_empty() {
            continue;
        }

        if is_section_header(raw, text) {
            tracing::debug!("Section header: {}", text);
            current_section = Some(text.to_string());
            continue;
        }

        if let Some(caps) = FIELD_LINE_RE.captures(text) {
            let name = caps[1].trim().to_string();
            if name.is_empty() {
                continue;
            }
            let description = caps
                .get(2)
                .map(|m| m.as_str().trim())
                .filter(|d| !d.is_empty())
                .map(str::to_string);

            // First definition wins; later duplicates are dropped so that
            // column headers stay unique downstream.
            if !seen.insert(name.clone()) {
                tracing::warn!("Duplicate field '{}' in template, keeping first definition", name);
                continue;
            }

            fields.push(TemplateField {
                name,
                section: current_section.clone(),
                description,
            });
        }
        // Anything else is free text; skipped.
    }

    fields
}

/// Turns the header row of an Excel template into fields. Blank cells are
/// skipped; column order is preserved.
pub fn parse_excel_header(cells: &[String]) -> Vec<TemplateField> {
    let mut fields: Vec<TemplateField> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for cell in cells {
        let name = cell.trim();
        if name.is_empty() {
            continue;
        }
        if !seen.insert(name.to_string()) {
            tracing::warn!("Duplicate column '{}' in template, keeping first definition", name);
            continue;
        }
        fields.push(TemplateField {
            name: name.to_string(),
            section: None,
            description: None,
        });
    }

    fields
}

/// Just the field names, in template order.
pub fn field_names(fields: &[TemplateField]) -> Vec<String> {
    fields.iter().map(|f| f.name.clone()).collect()
}

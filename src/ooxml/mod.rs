// src/ooxml/mod.rs
//
// Minimal OOXML support: just enough to read paragraphs out of a .docx,
// read cell rows out of an .xlsx, and write a single-sheet .xlsx. Both
// formats are zip containers holding XML parts.

use crate::utils::error::OoxmlError;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::ZipArchive;

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

/// Reads a named XML part out of an open archive.
fn read_part(archive: &mut ZipArchive<File>, name: &str) -> Result<String, OoxmlError> {
    let mut part = match archive.by_name(name) {
        Ok(p) => p,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(OoxmlError::MissingPart(name.to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    Ok(xml)
}

fn read_part_optional(
    archive: &mut ZipArchive<File>,
    name: &str,
) -> Result<Option<String>, OoxmlError> {
    match read_part(archive, name) {
        Ok(xml) => Ok(Some(xml)),
        Err(OoxmlError::MissingPart(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Extracts the text of each body-level paragraph in a .docx, in document
/// order. Text inside tables is intentionally not included; templates
/// declare their fields in plain paragraphs.
pub fn docx_paragraphs(path: &Path) -> Result<Vec<String>, OoxmlError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;
    let xml = read_part(&mut archive, "word/document.xml")?;
    let doc = roxmltree::Document::parse(&xml)?;

    let body = doc
        .descendants()
        .find(|n| n.tag_name().name() == "body")
        .ok_or_else(|| OoxmlError::MissingPart("word/document.xml: <w:body>".to_string()))?;

    let mut paragraphs = Vec::new();
    for para in body.children().filter(|n| n.tag_name().name() == "p") {
        // A paragraph's visible text is the concatenation of its <w:t> runs.
        let text: String = para
            .descendants()
            .filter(|n| n.tag_name().name() == "t")
            .filter_map(|n| n.text())
            .collect();
        paragraphs.push(text);
    }

    tracing::debug!(
        "Read {} paragraphs from {}",
        paragraphs.len(),
        path.display()
    );
    Ok(paragraphs)
}

/// Locates the first worksheet part in an .xlsx archive.
fn first_worksheet_name(archive: &ZipArchive<File>) -> Result<String, OoxmlError> {
    if archive.index_for_name("xl/worksheets/sheet1.xml").is_some() {
        return Ok("xl/worksheets/sheet1.xml".to_string());
    }
    // Some producers number sheets differently; fall back to the first
    // worksheet part by name order for determinism.
    let mut candidates: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/") && n.ends_with(".xml"))
        .map(|n| n.to_string())
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| OoxmlError::MissingPart("xl/worksheets/".to_string()))
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, OoxmlError> {
    let doc = roxmltree::Document::parse(xml)?;
    let mut strings = Vec::new();
    for si in doc.descendants().filter(|n| n.tag_name().name() == "si") {
        let text: String = si
            .descendants()
            .filter(|n| n.tag_name().name() == "t")
            .filter_map(|n| n.text())
            .collect();
        strings.push(text);
    }
    Ok(strings)
}

/// Reads every row of the first worksheet in an .xlsx as strings.
/// Shared strings, inline strings and plain values are all resolved;
/// absent cells simply do not appear in the row.
pub fn read_sheet_rows(path: &Path) -> Result<Vec<Vec<String>>, OoxmlError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;

    let shared = match read_part_optional(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let sheet_name = first_worksheet_name(&archive)?;
    let xml = read_part(&mut archive, &sheet_name)?;
    let doc = roxmltree::Document::parse(&xml)?;

    let mut rows = Vec::new();
    for row in doc.descendants().filter(|n| n.tag_name().name() == "row") {
        let mut cells = Vec::new();
        for cell in row.children().filter(|n| n.tag_name().name() == "c") {
            let value = match cell.attribute("t") {
                Some("s") => cell
                    .children()
                    .find(|n| n.tag_name().name() == "v")
                    .and_then(|v| v.text())
                    .and_then(|idx| idx.trim().parse::<usize>().ok())
                    .and_then(|idx| shared.get(idx).cloned())
                    .unwrap_or_default(),
                Some("inlineStr") => cell
                    .descendants()
                    .filter(|n| n.tag_name().name() == "t")
                    .filter_map(|n| n.text())
                    .collect(),
                // Numbers, booleans and formula strings all carry a <v>.
                _ => cell
                    .children()
                    .find(|n| n.tag_name().name() == "v")
                    .and_then(|v| v.text())
                    .unwrap_or("")
                    .to_string(),
            };
            cells.push(value);
        }
        rows.push(cells);
    }

    tracing::debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Writes rows as a minimal single-sheet .xlsx with inline-string cells.
/// The whole file is rewritten on every call; callers own the row buffer.
pub fn write_workbook(path: &Path, rows: &[Vec<String>]) -> Result<(), OoxmlError> {
    let file = File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(CONTENT_TYPES_XML.as_bytes())?;
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(ROOT_RELS_XML.as_bytes())?;
    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(WORKBOOK_XML.as_bytes())?;
    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(WORKBOOK_RELS_XML.as_bytes())?;
    zip.start_file("xl/worksheets/sheet1.xml", options)?;
    zip.write_all(worksheet_xml(rows).as_bytes())?;
    zip.finish()?;

    tracing::debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

fn worksheet_xml(rows: &[Vec<String>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        xml.push_str(&format!("<row r=\"{}\">", r + 1));
        for (c, value) in row.iter().enumerate() {
            xml.push_str(&format!(
                "<c r=\"{}{}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
                column_letter(c),
                r + 1,
                xml_escape(value)
            ));
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

/// 0 -> "A", 25 -> "Z", 26 -> "AA", ...
fn column_letter(mut index: usize) -> String {
    let mut letters = String::new();
    loop {
        letters.insert(0, (b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

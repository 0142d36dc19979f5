// src/storage/mod.rs
use crate::ooxml;
use crate::utils::error::StorageError;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const SOURCE_COLUMN: &str = "Source File";

/// Incrementally-built results workbook. All rows stay in memory and the
/// whole .xlsx is rewritten after each append, so a crash mid-run loses at
/// most the row in flight.
#[derive(Debug)]
pub struct ResultsSheet {
    path: PathBuf,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ResultsSheet {
    /// Opens the output workbook. Columns are the source-file column
    /// followed by the template field names in template order. Rows already
    /// on disk are loaded so a re-run appends instead of clobbering; a
    /// header written by a different template is an error rather than a
    /// silent column scramble.
    pub fn open(path: &Path, field_names: &[String]) -> Result<Self, StorageError> {
        let mut columns = vec![SOURCE_COLUMN.to_string()];
        columns.extend(field_names.iter().cloned());

        let mut rows = Vec::new();
        if path.exists() {
            let mut existing = ooxml::read_sheet_rows(path)?;
            if let Some(header) = existing.first() {
                if header != &columns {
                    return Err(StorageError::ColumnMismatch {
                        path: path.to_path_buf(),
                        detail: format!("existing header is {:?}", header),
                    });
                }
                rows = existing.split_off(1);
            }
            tracing::info!(
                "Loaded {} existing rows from {}",
                rows.len(),
                path.display()
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            columns,
            rows,
        })
    }

    /// Source files already recorded, for resume-by-skip.
    pub fn processed_sources(&self) -> HashSet<String> {
        self.rows.iter().filter_map(|r| r.first().cloned()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Appends one extraction result and rewrites the workbook. Values are
    /// looked up by column name; fields the model did not return become
    /// empty cells.
    pub fn append_row(
        &mut self,
        source: &str,
        data: &Map<String, Value>,
    ) -> Result<(), StorageError> {
        let mut row = Vec::with_capacity(self.columns.len());
        row.push(source.to_string());
        for column in &self.columns[1..] {
            row.push(data.get(column).map(cell_text).unwrap_or_default());
        }
        self.rows.push(row);
        self.write()?;

        tracing::info!(
            "Saved {} ({} rows total) to {}",
            source,
            self.rows.len(),
            self.path.display()
        );
        Ok(())
    }

    fn write(&self) -> Result<(), StorageError> {
        let mut all = Vec::with_capacity(self.rows.len() + 1);
        all.push(self.columns.clone());
        all.extend(self.rows.iter().cloned());
        ooxml::write_workbook(&self.path, &all)?;
        Ok(())
    }

    /// Writes a sidecar JSON describing the run next to the workbook.
    pub fn save_run_metadata(
        &self,
        template_path: &Path,
        field_count: usize,
    ) -> Result<PathBuf, StorageError> {
        let metadata = serde_json::json!({
            "template": template_path.display().to_string(),
            "field_count": field_count,
            "row_count": self.rows.len(),
            "output": self.path.display().to_string(),
            "updated_at": chrono::Utc::now().to_rfc3339(),
        });

        let metadata_str = serde_json::to_string_pretty(&metadata)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let meta_path = self.path.with_extension("meta.json");
        std::fs::write(&meta_path, metadata_str)?;

        tracing::info!("Saved run metadata to {}", meta_path.display());
        Ok(meta_path)
    }
}

/// Renders a JSON value as spreadsheet cell text. Nulls become empty cells;
/// nested values are rendered compactly rather than dropped.
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns() -> Vec<String> {
        vec!["Study ID".to_string(), "Year".to_string()]
    }

    fn sample_row() -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("Study ID".to_string(), json!("NCT-001"));
        data.insert("Year".to_string(), json!(2021));
        data
    }

    #[test]
    fn test_append_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");

        let mut sheet = ResultsSheet::open(&path, &columns()).unwrap();
        assert_eq!(sheet.row_count(), 0);
        sheet.append_row("a.pdf", &sample_row()).unwrap();

        // Reopen: the row survives and the source is marked processed.
        let sheet = ResultsSheet::open(&path, &columns()).unwrap();
        assert_eq!(sheet.row_count(), 1);
        assert!(sheet.processed_sources().contains("a.pdf"));
    }

    #[test]
    fn test_missing_fields_become_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");

        let mut sheet = ResultsSheet::open(&path, &columns()).unwrap();
        let mut data = Map::new();
        data.insert("Year".to_string(), json!(null));
        sheet.append_row("b.pdf", &data).unwrap();

        let rows = ooxml::read_sheet_rows(&path).unwrap();
        assert_eq!(rows[0], vec!["Source File", "Study ID", "Year"]);
        assert_eq!(rows[1], vec!["b.pdf", "", ""]);
    }

    #[test]
    fn test_header_round_trip_preserves_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");

        let names = vec!["Z".to_string(), "A".to_string(), "M".to_string()];
        let mut sheet = ResultsSheet::open(&path, &names).unwrap();
        sheet.append_row("c.pdf", &Map::new()).unwrap();

        let rows = ooxml::read_sheet_rows(&path).unwrap();
        assert_eq!(rows[0], vec!["Source File", "Z", "A", "M"]);
    }

    #[test]
    fn test_column_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");

        let mut sheet = ResultsSheet::open(&path, &columns()).unwrap();
        sheet.append_row("a.pdf", &sample_row()).unwrap();

        let other = vec!["Different".to_string()];
        let err = ResultsSheet::open(&path, &other).unwrap_err();
        assert!(matches!(err, StorageError::ColumnMismatch { .. }));
    }

    #[test]
    fn test_cell_text_rendering() {
        assert_eq!(cell_text(&json!(null)), "");
        assert_eq!(cell_text(&json!("text")), "text");
        assert_eq!(cell_text(&json!(12.5)), "12.5");
        assert_eq!(cell_text(&json!(["a", "b"])), "[\"a\",\"b\"]");
    }

    #[test]
    fn test_run_metadata_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");

        let mut sheet = ResultsSheet::open(&path, &columns()).unwrap();
        sheet.append_row("a.pdf", &sample_row()).unwrap();

        let meta_path = sheet
            .save_run_metadata(Path::new("template.docx"), 2)
            .unwrap();
        let meta: Value =
            serde_json::from_str(&std::fs::read_to_string(&meta_path).unwrap()).unwrap();
        assert_eq!(meta["field_count"], json!(2));
        assert_eq!(meta["row_count"], json!(1));
        assert_eq!(meta["template"], json!("template.docx"));
    }
}

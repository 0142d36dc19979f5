// src/utils/error.rs
#![allow(dead_code)]
use std::path::PathBuf;
use thiserror::Error;

// Define specific error types for different parts of the application

/// Failures while cracking open an OOXML container (.docx/.xlsx are zip
/// archives of XML parts).
#[derive(Error, Debug)]
pub enum OoxmlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a valid OOXML archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Malformed XML part: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Missing archive part: {0}")]
    MissingPart(String),
}

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template file not found: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported template format: {0} (expected .docx or .xlsx)")]
    UnsupportedFormat(PathBuf),

    #[error("Failed to read template {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: OoxmlError,
    },

    #[error("No fields found in template: {0}")]
    Empty(PathBuf),
}

#[derive(Error, Debug)]
pub enum GeminiError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error), // Automatically convert reqwest errors

    #[error("HTTP error: {0}")]
    Http(reqwest::StatusCode), // e.g., 400 Bad Request, 403 Forbidden

    #[error("Gemini rate limit exceeded (429)")]
    RateLimited,

    #[error("API key is missing")]
    MissingApiKey,

    #[error("Could not read PDF {0}")]
    PdfRead(PathBuf),

    #[error("Failed to parse Gemini response: {0}")]
    InvalidResponse(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] OoxmlError),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Output file {path} was created from a different template: {detail}")]
    ColumnMismatch { path: PathBuf, detail: String },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Gemini interaction failed: {0}")]
    Gemini(#[from] GeminiError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Data processing failed: {0}")]
    Processing(String),
}

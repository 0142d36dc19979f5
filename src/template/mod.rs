// src/template/mod.rs
pub mod parser;

// Re-export key template types for convenience
#[allow(unused_imports)]
pub use parser::{detect_format, field_names, parse_template, TemplateField, TemplateFormat};

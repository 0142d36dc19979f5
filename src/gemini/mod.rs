// src/gemini/mod.rs
pub mod client;
pub mod models;
pub mod prompt;

pub use client::GeminiClient;
pub use prompt::build_extraction_prompt;

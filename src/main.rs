// src/main.rs
mod gemini;
mod ooxml;
mod storage;
mod template;
mod utils;

use clap::{Parser, Subcommand};
use gemini::GeminiClient;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use storage::ResultsSheet;
use utils::error::GeminiError;
use utils::AppError;

/// Command Line Interface for the template-driven study data extractor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a template and print its field list for verification
    Inspect {
        /// Path to the template file (.docx or .xlsx)
        #[arg(short, long)]
        template: PathBuf,
    },
    /// Extract data from every PDF in the articles directory
    Run {
        /// Path to the template file (.docx or .xlsx)
        #[arg(short, long)]
        template: PathBuf,

        /// Directory containing the PDF articles
        #[arg(long, default_value = "./Articles")]
        articles: PathBuf,

        /// Output workbook path
        #[arg(short, long, default_value = "extracted_studies.xlsx")]
        output: PathBuf,

        /// Gemini API key (falls back to the GEMINI_API_KEY env var)
        #[arg(long)]
        key: Option<String>,

        /// Gemini model name
        #[arg(long, default_value = "gemini-flash-latest")]
        model: String,

        /// Process at most this many new PDFs
        #[arg(long)]
        limit: Option<usize>,
    },
}

const MAX_ATTEMPTS: u32 = 3;
const RATE_LIMIT_BACKOFF_SECS: u64 = 30;
const FAILURE_BACKOFF_SECS: u64 = 2;
// Free-tier quota is 15 requests/minute; one request every 4s stays under it.
const REQUEST_PACING_SECS: u64 = 4;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging();

    // 2. Parse CLI Arguments
    let cli = Cli::parse();

    match cli.command {
        Command::Inspect { template } => inspect(&template),
        Command::Run {
            template,
            articles,
            output,
            key,
            model,
            limit,
        } => run(&template, &articles, &output, key, &model, limit).await,
    }
}

/// Prints the parsed field list grouped by section, for eyeballing a
/// template before spending API quota on it.
fn inspect(template_path: &Path) -> Result<(), AppError> {
    let fields = template::parse_template(template_path)?;

    println!("Template: {}", template_path.display());
    println!("{}", "=".repeat(80));

    let mut current_section: Option<&str> = None;
    for field in &fields {
        let section = field.section.as_deref();
        if section != current_section {
            current_section = section;
            println!("\n[{}]", section.unwrap_or("General"));
        }
        match &field.description {
            Some(desc) => println!("  - {}: {}", field.name, desc),
            None => println!("  - {}", field.name),
        }
    }

    println!("\n{}", "=".repeat(80));
    println!("Total fields: {}", fields.len());
    Ok(())
}

async fn run(
    template_path: &Path,
    articles_dir: &Path,
    output: &Path,
    key: Option<String>,
    model: &str,
    limit: Option<usize>,
) -> Result<(), AppError> {
    // 1. Resolve the API key
    let api_key = match key {
        Some(k) => k,
        None => std::env::var("GEMINI_API_KEY").map_err(|_| {
            AppError::Config("No API key: pass --key or set GEMINI_API_KEY".to_string())
        })?,
    };

    // 2. Load the template; aborts before any PDF is touched if it is bad
    let fields = template::parse_template(template_path)?;
    let columns = template::field_names(&fields);
    tracing::info!(
        "Loaded {} fields from template {}",
        fields.len(),
        template_path.display()
    );

    // 3. Open the results workbook (loads prior rows for resume)
    let mut sheet = ResultsSheet::open(output, &columns)?;

    // 4. Collect the PDFs still to process
    if !articles_dir.exists() {
        return Err(AppError::Config(format!(
            "Articles directory {} does not exist",
            articles_dir.display()
        )));
    }
    let mut pdf_files = list_pdfs(articles_dir)?;
    pdf_files.sort();
    let total = pdf_files.len();

    let processed = sheet.processed_sources();
    let mut to_process: Vec<PathBuf> = pdf_files
        .into_iter()
        .filter(|p| !processed.contains(&file_name(p)))
        .collect();
    if let Some(limit) = limit {
        to_process.truncate(limit);
    }
    tracing::info!("Found {} PDFs total, {} to process", total, to_process.len());

    // 5. Build the prompt once; it only depends on the template
    let prompt = gemini::build_extraction_prompt(&fields);
    let client = GeminiClient::new(&api_key, model)?;

    // 6. Process each PDF sequentially, saving after every success
    let mut success_count = 0;
    let mut failure_count = 0;

    for (idx, pdf_path) in to_process.iter().enumerate() {
        let source = file_name(pdf_path);
        tracing::info!("Processing {} ({}/{})", source, idx + 1, to_process.len());

        match extract_with_retries(&client, pdf_path, &prompt).await {
            Some(data) => {
                sheet.append_row(&source, &data)?;
                success_count += 1;
            }
            None => {
                tracing::error!("Giving up on {} after {} attempts", source, MAX_ATTEMPTS);
                failure_count += 1;
            }
        }

        // Pace requests to stay under the per-minute quota.
        if idx + 1 < to_process.len() {
            tokio::time::sleep(Duration::from_secs(REQUEST_PACING_SECS)).await;
        }
    }

    // 7. Record run metadata next to the workbook
    if success_count > 0 {
        if let Err(e) = sheet.save_run_metadata(template_path, fields.len()) {
            tracing::warn!("Failed to save run metadata: {}", e);
        }
    }

    tracing::info!(
        "Processing finished. Success: {}, Failures: {}",
        success_count,
        failure_count
    );

    if success_count == 0 && failure_count > 0 {
        return Err(AppError::Processing(format!(
            "Failed to extract data from all {} PDFs",
            failure_count
        )));
    }

    Ok(())
}

/// Up to MAX_ATTEMPTS calls per PDF. Rate-limit responses get the long
/// backoff; everything else the short one.
async fn extract_with_retries(
    client: &GeminiClient,
    pdf_path: &Path,
    prompt: &str,
) -> Option<Map<String, Value>> {
    for attempt in 1..=MAX_ATTEMPTS {
        match client.extract_from_pdf(pdf_path, prompt).await {
            Ok(data) => return Some(data),
            Err(GeminiError::RateLimited) => {
                tracing::warn!(
                    "Rate limited on attempt {}, waiting {}s",
                    attempt,
                    RATE_LIMIT_BACKOFF_SECS
                );
                tokio::time::sleep(Duration::from_secs(RATE_LIMIT_BACKOFF_SECS)).await;
            }
            Err(e) => {
                tracing::error!(
                    "Extraction attempt {} failed for {}: {}",
                    attempt,
                    pdf_path.display(),
                    e
                );
                tokio::time::sleep(Duration::from_secs(FAILURE_BACKOFF_SECS)).await;
            }
        }
    }
    None
}

fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let mut pdfs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_pdf = path
            .extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if path.is_file() && is_pdf {
            pdfs.push(path);
        }
    }
    Ok(pdfs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

mod config;
mod error;
mod fields;
mod llm_extract;
mod month;
mod ocr;
mod pdf_extract;
mod pipeline;
mod sheets;

use clap::{Parser, Subcommand};
use config::{Config, OcrMode};
use fields::{MatchMode, extract_fields, extract_fields_with};
use llm_extract::{LanguageModel, LlmClient};
use month::Month;
use ocr::OcrEngine;
use pdf_extract::{PdfReader, TextSource};
use pipeline::{Document, Pipeline, RunSummary};
use sheets::{LocalWorkbookSink, RemoteSheetSink, RowSink};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = ".config/invoice_intake.toml";

#[derive(Parser)]
#[command(name = "invoice_intake", version, about = "Extract invoice fields from PDFs into spreadsheets")]
struct Cli {
    /// TOML config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract every PDF and append one row per invoice to the sheets
    Process {
        /// Remote sheet tab the rows go to
        #[arg(long, value_enum, ignore_case = true)]
        month: Month,
        /// Local master workbook to append to
        #[arg(long)]
        excel: PathBuf,
        /// Where the updated workbook is written (default from config)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Skip the Google Sheet even if configured
        #[arg(long)]
        local_only: bool,
        #[arg(required = true)]
        pdfs: Vec<PathBuf>,
    },
    /// Show the text, model reply and fields for one PDF without writing anything
    Inspect {
        /// Stop after text extraction
        #[arg(long)]
        no_llm: bool,
        pdf: PathBuf,
    },
    /// Run field extraction over a saved model reply (stdin when no file)
    Parse {
        /// Only accept `Field Name: value` lines
        #[arg(long)]
        anchored: bool,
        #[arg(long)]
        json: bool,
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Install crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "Failed to install rustls crypto provider")?;

    let cli = Cli::parse();

    match cli.command {
        Command::Process {
            month,
            excel,
            output,
            local_only,
            pdfs,
        } => {
            let cfg = load_config(&cli.config)?;
            let summary = process(&cfg, month, &excel, output, local_only, &pdfs).await?;
            print_summary(&summary);

            if !summary.is_clean() {
                return Err(format!(
                    "{} of {} documents had errors, {} sinks failed to save",
                    summary.failures(),
                    summary.outcomes.len(),
                    summary.finish_errors.len()
                )
                .into());
            }
        }
        Command::Inspect { no_llm, pdf } => {
            let cfg = load_config(&cli.config)?;
            inspect(&cfg, &pdf, no_llm).await?;
        }
        Command::Parse {
            anchored,
            json,
            file,
        } => {
            let reply = match file {
                Some(path) => std::fs::read_to_string(path)?,
                None => std::io::read_to_string(std::io::stdin())?,
            };
            let record = if anchored {
                extract_fields_with(&reply, MatchMode::Anchored)
            } else {
                extract_fields(&reply)
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                for (name, value) in record.iter() {
                    println!("{name}: {value}");
                }
            }
        }
    }

    Ok(())
}

/// A missing default config means "all defaults"; a missing explicit one is an error.
fn load_config(path: &Path) -> error::Result<Config> {
    if path == Path::new(DEFAULT_CONFIG) && !path.exists() {
        info!(path = %path.display(), "No config file, using defaults");
        return Ok(Config::default());
    }
    let cfg = Config::load(path)?;
    info!(path = %path.display(), "Config loaded");
    Ok(cfg)
}

async fn pdf_reader(cfg: &Config) -> PdfReader {
    let ocr = OcrEngine::new(&cfg.ocr);
    if cfg.ocr.mode != OcrMode::Never && !ocr.is_available().await {
        warn!("pdftoppm or tesseract not found; documents that need OCR will fail");
    }
    PdfReader::new(ocr, cfg.ocr.mode)
}

async fn process(
    cfg: &Config,
    month: Month,
    excel: &Path,
    output: Option<PathBuf>,
    local_only: bool,
    pdfs: &[PathBuf],
) -> Result<RunSummary, Box<dyn std::error::Error>> {
    // Read every input up front so a bad path fails before any row is written.
    let mut documents = Vec::with_capacity(pdfs.len());
    for path in pdfs {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        documents.push(Document { name, bytes });
    }

    let reader = pdf_reader(cfg).await;
    let model = LlmClient::new(&cfg.llm)?;

    let mut sinks: Vec<Box<dyn RowSink>> = Vec::new();
    match &cfg.google_sheets {
        Some(gs) if !local_only => {
            let hub = sheets::create_hub(gs).await?;
            sinks.push(Box::new(RemoteSheetSink::new(hub, &gs.spreadsheet_id, month)));
            info!(spreadsheet = %gs.spreadsheet_id, tab = %month, "Google Sheet sink ready");
        }
        Some(_) => info!("--local-only given, skipping Google Sheet"),
        None => warn!("No [google_sheets] section in config, writing the local workbook only"),
    }

    let output = output.unwrap_or_else(|| cfg.workbook.output.clone());
    sinks.push(Box::new(LocalWorkbookSink::open(
        excel,
        cfg.workbook.sheet.as_deref(),
        output,
    )?));

    info!(documents = documents.len(), month = %month, model = %model.model(), "Processing invoices");
    let pipeline = Pipeline::new(&reader, &model, cfg.extraction.match_mode);
    Ok(pipeline.run(&documents, &mut sinks).await)
}

fn print_summary(summary: &RunSummary) {
    for outcome in &summary.outcomes {
        match &outcome.result {
            Ok(record) => {
                println!("{} Structured Summary:", outcome.name);
                for (name, value) in record.iter() {
                    println!("{name}: {value}");
                }
            }
            Err(e) => println!("{} FAILED: {e}", outcome.name),
        }
        for err in &outcome.sink_errors {
            println!("  not written to {err}");
        }
        println!();
    }
    for err in &summary.finish_errors {
        println!("NOT SAVED {err}");
    }
}

async fn inspect(cfg: &Config, pdf: &Path, no_llm: bool) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = tokio::fs::read(pdf).await?;
    let name = pdf.display().to_string();

    let reader = pdf_reader(cfg).await;
    let text = reader.read_text(&name, &bytes).await?;

    let preview: String = text.chars().take(2000).collect();
    println!("\n--- Combined Text (first 2000 chars) ---");
    println!("{preview}");
    println!("--- End ({} chars) ---\n", text.chars().count());

    if no_llm {
        return Ok(());
    }

    let model = LlmClient::new(&cfg.llm)?;
    println!("--- LLM Reply ({:?} / {}) ---", cfg.llm.backend, model.model());
    let reply = model.generate(&text).await?;
    println!("{reply}");
    println!("--- End ---\n");

    let record = extract_fields_with(&reply, cfg.extraction.match_mode);
    let (filled, total) = record.coverage();
    println!("{}", serde_json::to_string_pretty(&record)?);
    println!("--- Fields ({filled}/{total}) ---");
    Ok(())
}

// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("no API key: set `llm.api_key` or the {0} environment variable")]
    MissingApiKey(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse PDF: {0}")]
    Pdf(String),
    #[error("OCR failed: {0}")]
    Ocr(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("LLM API error {status}: {body}")]
    LlmApi {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("empty response from LLM")]
    EmptyResponse,
    #[error("Google auth error: {0}")]
    Auth(String),
    #[error("Google Sheets error: {0}")]
    Sheets(#[from] google_sheets4::Error),
    #[error("workbook error: {0}")]
    Workbook(String),
}

pub type Result<T> = std::result::Result<T, Error>;

use crate::error::{Error, Result};
use crate::fields::MatchMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub ocr: OcrSection,
    #[serde(default)]
    pub extraction: ExtractionSection,
    #[serde(default)]
    pub workbook: WorkbookSection,
    /// Remote sink. No section, no remote rows.
    pub google_sheets: Option<GoogleSheetsSection>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// Google Generative Language API (`generateContent`).
    #[default]
    Gemini,
    /// Any OpenAI-compatible `chat/completions` server, Ollama included.
    #[serde(alias = "openai_compatible")]
    OpenAi,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub backend: LlmBackend,
    /// Falls back to the backend's public endpoint.
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// Environment variable read when `api_key` is unset.
    pub api_key_env: Option<String>,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub max_input_chars: Option<usize>,
    pub timeout_secs: Option<u64>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            backend: LlmBackend::default(),
            base_url: None,
            model: None,
            api_key: None,
            api_key_env: None,
            temperature: 1.0,
            top_p: 0.95,
            top_k: 64,
            max_output_tokens: 8192,
            max_input_chars: None,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrMode {
    #[default]
    Always,
    WhenScanned,
    Never,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcrSection {
    pub mode: OcrMode,
    pub pdftoppm_path: String,
    pub tesseract_path: String,
    pub dpi: u32,
    pub language: String,
}

impl Default for OcrSection {
    fn default() -> Self {
        Self {
            mode: OcrMode::default(),
            pdftoppm_path: "pdftoppm".to_string(),
            tesseract_path: "tesseract".to_string(),
            dpi: 200,
            language: "eng".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExtractionSection {
    pub match_mode: MatchMode,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WorkbookSection {
    /// Sheet rows are appended to. Defaults to the first sheet.
    pub sheet: Option<String>,
    pub output: PathBuf,
}

impl Default for WorkbookSection {
    fn default() -> Self {
        Self {
            sheet: None,
            output: default_output_path(),
        }
    }
}

fn default_output_path() -> PathBuf {
    PathBuf::from("updated_excel.xlsx")
}

#[derive(Debug, Deserialize)]
pub struct GoogleSheetsSection {
    #[serde(default = "default_service_account_key")]
    pub service_account_key: PathBuf,
    pub spreadsheet_id: String,
}

fn default_service_account_key() -> PathBuf {
    PathBuf::from("secret_key.json")
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = Config::parse("").unwrap();
        assert_eq!(cfg.llm.backend, LlmBackend::Gemini);
        assert_eq!(cfg.llm.top_k, 64);
        assert_eq!(cfg.llm.max_output_tokens, 8192);
        assert_eq!(cfg.ocr.mode, OcrMode::Always);
        assert_eq!(cfg.ocr.dpi, 200);
        assert_eq!(cfg.extraction.match_mode, MatchMode::Substring);
        assert_eq!(cfg.workbook.output, PathBuf::from("updated_excel.xlsx"));
        assert!(cfg.google_sheets.is_none());
    }

    #[test]
    fn test_full_config() {
        let cfg = Config::parse(
            r#"
            [llm]
            backend = "openai"
            base_url = "http://localhost:11434/v1"
            model = "qwen3:8b"
            max_input_chars = 12000

            [ocr]
            mode = "when_scanned"
            language = "eng+hin"

            [extraction]
            match_mode = "anchored"

            [workbook]
            sheet = "Master"
            output = "out/master.xlsx"

            [google_sheets]
            spreadsheet_id = "1AbC"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.llm.backend, LlmBackend::OpenAi);
        assert_eq!(cfg.llm.model.as_deref(), Some("qwen3:8b"));
        assert_eq!(cfg.llm.max_input_chars, Some(12000));
        assert_eq!(cfg.llm.temperature, 1.0);
        assert_eq!(cfg.ocr.mode, OcrMode::WhenScanned);
        assert_eq!(cfg.ocr.tesseract_path, "tesseract");
        assert_eq!(cfg.ocr.language, "eng+hin");
        assert_eq!(cfg.extraction.match_mode, MatchMode::Anchored);
        assert_eq!(cfg.workbook.sheet.as_deref(), Some("Master"));

        let sheets = cfg.google_sheets.unwrap();
        assert_eq!(sheets.spreadsheet_id, "1AbC");
        assert_eq!(sheets.service_account_key, PathBuf::from("secret_key.json"));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(matches!(
            Config::parse("[llm]\nbackend = \"carrier-pigeon\""),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = Config::load("does/not/exist.toml").unwrap_err();
        assert!(err.to_string().contains("does/not/exist.toml"));
    }
}

// src/llm_extract.rs

use crate::config::{LlmBackend, LlmSection};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// The instruction sent ahead of every document's text.
pub const PROMPT: &str = "the following is OCR extracted text from a single invoice PDF. \
Please use the OCR extracted text to give a structured summary. \
The structured summary should consider information such as PO Number, Invoice Number, Invoice Amount, Invoice Date, \
CGST Amount, SGST Amount, IGST Amount, Total Tax Amount, Taxable Amount, TCS Amount, IRN Number, Receiver GSTIN, \
Receiver Name, Vendor GSTIN, Vendor Name, Remarks and Vendor Code. If any of this information is not available or present, \
then NA must be denoted next to the value. Please do not give any additional information.";

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_MODEL: &str = "gemini-1.5-flash";
const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_MODEL: &str = "gpt-4o-mini";
const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

/// Turns document text into the model's free-text summary.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, document_text: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Gemini wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_p: f64,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

// ---------------------------------------------------------------------------
// OpenAI-compatible wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Resolved endpoint configuration ready to make API calls.
#[derive(Debug)]
struct ResolvedEndpoint {
    backend: LlmBackend,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

/// Resolve the LLM config section into a concrete endpoint.
fn resolve_endpoint(llm: &LlmSection) -> Result<ResolvedEndpoint> {
    let (default_url, default_model, default_env) = match llm.backend {
        LlmBackend::Gemini => (GEMINI_BASE_URL, GEMINI_MODEL, GEMINI_KEY_ENV),
        LlmBackend::OpenAi => (OPENAI_BASE_URL, OPENAI_MODEL, OPENAI_KEY_ENV),
    };

    let base_url = llm
        .base_url
        .as_deref()
        .unwrap_or(default_url)
        .trim_end_matches('/')
        .to_string();
    let model = llm.model.clone().unwrap_or_else(|| default_model.to_string());
    let key_env = llm.api_key_env.as_deref().unwrap_or(default_env);

    let api_key = llm
        .api_key
        .clone()
        .or_else(|| std::env::var(key_env).ok())
        .filter(|k| !k.trim().is_empty());

    // Local OpenAI-compatible servers (Ollama) ignore the key.
    let keyless_ok = llm.backend == LlmBackend::OpenAi && is_local(&base_url);
    if api_key.is_none() && !keyless_ok {
        return Err(Error::MissingApiKey(key_env.to_string()));
    }

    info!(backend = ?llm.backend, url = %base_url, model = %model, "Resolved LLM endpoint");
    Ok(ResolvedEndpoint {
        backend: llm.backend,
        base_url,
        model,
        api_key,
    })
}

fn is_local(url: &str) -> bool {
    let host = url
        .split("://")
        .nth(1)
        .unwrap_or(url)
        .split(['/', ':'])
        .next()
        .unwrap_or_default();
    matches!(host, "localhost" | "127.0.0.1")
}

/// The full text sent to the model: instruction, blank line, document.
pub fn build_input(document_text: &str) -> String {
    format!("{PROMPT}\n\n{document_text}")
}

/// Cut to at most `max_chars` characters without splitting one.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Concatenated text parts of the first candidate.
fn gemini_reply(response: GenerateResponse) -> Result<String> {
    let content = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or(Error::EmptyResponse)?;

    let texts: Vec<String> = content.parts.into_iter().filter_map(|p| p.text).collect();
    if texts.is_empty() {
        return Err(Error::EmptyResponse);
    }
    Ok(texts.concat())
}

fn chat_reply(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or(Error::EmptyResponse)
}

/// HTTP client for the configured model backend.
pub struct LlmClient {
    client: Client,
    endpoint: ResolvedEndpoint,
    generation: GenerationConfig,
    max_input_chars: Option<usize>,
}

impl LlmClient {
    pub fn new(llm: &LlmSection) -> Result<Self> {
        let endpoint = resolve_endpoint(llm)?;

        let mut builder = Client::builder();
        if let Some(secs) = llm.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            endpoint,
            generation: GenerationConfig {
                temperature: llm.temperature,
                top_p: llm.top_p,
                top_k: llm.top_k,
                max_output_tokens: llm.max_output_tokens,
                response_mime_type: "text/plain".to_string(),
            },
            max_input_chars: llm.max_input_chars,
        })
    }

    pub fn model(&self) -> &str {
        &self.endpoint.model
    }

    async fn generate_gemini(&self, text: &str) -> Result<String> {
        let model = self.endpoint.model.trim_start_matches("models/");
        let url = format!(
            "{}/models/{}:generateContent",
            self.endpoint.base_url,
            urlencoding::encode(model)
        );

        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(build_input(text)),
                }],
            }],
            generation_config: self.generation.clone(),
        };

        let mut req = self.client.post(&url).json(&request);
        if let Some(key) = &self.endpoint.api_key {
            req = req.header("x-goog-api-key", key.as_str());
        }
        let response = req.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::LlmApi { status, body });
        }

        gemini_reply(response.json().await?)
    }

    async fn generate_chat(&self, text: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.endpoint.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            temperature: self.generation.temperature,
            top_p: self.generation.top_p,
            max_tokens: self.generation.max_output_tokens,
        };

        let url = format!("{}/chat/completions", self.endpoint.base_url);

        let mut req = self.client.post(&url).json(&request);
        if let Some(key) = &self.endpoint.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        let response = req.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::LlmApi { status, body });
        }

        chat_reply(response.json().await?)
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn generate(&self, document_text: &str) -> Result<String> {
        let text = match self.max_input_chars {
            Some(max) => truncate_chars(document_text, max),
            None => document_text,
        };
        debug!(chars = text.chars().count(), backend = ?self.endpoint.backend, "Sending document to LLM");

        let reply = match self.endpoint.backend {
            LlmBackend::Gemini => self.generate_gemini(text).await?,
            LlmBackend::OpenAi => self.generate_chat(text).await?,
        };
        info!(reply_chars = reply.len(), model = %self.endpoint.model, "LLM reply received");
        Ok(reply)
    }
}

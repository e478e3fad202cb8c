//! Language-model completion service used by the role agents.
//!
//! The workflow only depends on [`CompletionService`]; the HTTP clients below
//! are the implementations wired up by the CLI.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::message_log::Role;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub role: Role,
    pub model: String,
    pub temperature: f64,
    pub system: String,
    pub prompt: String,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("completion service returned no text")]
    EmptyResponse,

    #[error("completion client is closed")]
    Closed,
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        CompletionError::Request(err.to_string())
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;

    /// Releases held connections. Later calls fail with [`CompletionError::Closed`].
    async fn close(&self) {}
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client, CompletionError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(CompletionError::from)
}

fn checkout_client(slot: &Mutex<Option<reqwest::Client>>) -> Result<reqwest::Client, CompletionError> {
    slot.lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
        .ok_or(CompletionError::Closed)
}

fn release_client(slot: &Mutex<Option<reqwest::Client>>) {
    slot.lock().unwrap_or_else(|e| e.into_inner()).take();
}

async fn read_success_body(response: reqwest::Response) -> Result<String, CompletionError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(CompletionError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

fn non_empty_text(text: Option<String>) -> Result<String, CompletionError> {
    let text = text.unwrap_or_default();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CompletionError::EmptyResponse);
    }
    Ok(trimmed.to_string())
}

/// Client for OpenAI-compatible `/v1/chat/completions` endpoints.
pub struct OpenAiCompletion {
    api_key: String,
    base_url: String,
    client: Mutex<Option<reqwest::Client>>,
}

impl OpenAiCompletion {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, CompletionError> {
        Ok(Self {
            api_key: api_key.into(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            client: Mutex::new(Some(build_http_client(timeout)?)),
        })
    }

    /// Override the API base URL (proxies, compatible gateways, local mocks).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

pub fn openai_request_body(request: &CompletionRequest) -> Value {
    json!({
        "model": request.model,
        "temperature": request.temperature,
        "messages": [
            { "role": "system", "content": request.system },
            { "role": "user", "content": request.prompt },
        ],
    })
}

pub fn parse_openai_response(body: &str) -> Result<String, CompletionError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|err| CompletionError::InvalidResponse(err.to_string()))?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::InvalidResponse("response has no choices".to_string()))?
        .message
        .content;
    non_empty_text(content)
}

#[async_trait]
impl CompletionService for OpenAiCompletion {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let client = checkout_client(&self.client)?;
        let response = client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&openai_request_body(request))
            .send()
            .await?;
        let body = read_success_body(response).await?;
        parse_openai_response(&body)
    }

    async fn close(&self) {
        release_client(&self.client);
    }
}

/// Client for a local Ollama server's `/api/chat` endpoint.
pub struct OllamaCompletion {
    host: String,
    client: Mutex<Option<reqwest::Client>>,
}

impl OllamaCompletion {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Result<Self, CompletionError> {
        Ok(Self {
            host: host.into().trim_end_matches('/').to_string(),
            client: Mutex::new(Some(build_http_client(timeout)?)),
        })
    }

    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.host)
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<ChatMessage>,
}

pub fn ollama_request_body(request: &CompletionRequest) -> Value {
    json!({
        "model": request.model,
        "stream": false,
        "options": { "temperature": request.temperature },
        "messages": [
            { "role": "system", "content": request.system },
            { "role": "user", "content": request.prompt },
        ],
    })
}

pub fn parse_ollama_response(body: &str) -> Result<String, CompletionError> {
    let parsed: OllamaChatResponse = serde_json::from_str(body)
        .map_err(|err| CompletionError::InvalidResponse(err.to_string()))?;
    non_empty_text(parsed.message.and_then(|message| message.content))
}

#[async_trait]
impl CompletionService for OllamaCompletion {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let client = checkout_client(&self.client)?;
        let response = client
            .post(self.chat_url())
            .json(&ollama_request_body(request))
            .send()
            .await?;
        let body = read_success_body(response).await?;
        parse_ollama_response(&body)
    }

    async fn close(&self) {
        release_client(&self.client);
    }
}

//! Completion boundary over the local Ollama `/api/generate` endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LlmConfig;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("failed to build llm http client: {0}")]
    Client(String),
    #[error("failed to reach llm endpoint {endpoint}: {message}")]
    Transport { endpoint: String, message: String },
    #[error("llm endpoint returned http {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm endpoint returned an undecodable body: {0}")]
    Decode(String),
}

/// A text completion service. `Ok("")` is a successful call that produced
/// nothing; every failure is an `Err`.
pub trait LlmService {
    fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    message: Option<Value>,
}

impl GenerateResponse {
    fn completion_text(self) -> String {
        if let Some(response) = self.response.filter(|text| !text.is_empty()) {
            return response;
        }
        match self.message {
            Some(Value::String(text)) => text,
            Some(Value::Object(message)) => message
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| LlmError::Client(error.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl LlmService for OllamaClient {
    fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String, LlmError> {
        let prompt = full_prompt(prompt, system_prompt);
        let request = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            stream: false,
        };
        debug!(endpoint = %self.endpoint, model = %self.model, "sending completion request");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|error| {
                warn!(endpoint = %self.endpoint, %error, "llm request failed");
                LlmError::Transport {
                    endpoint: self.endpoint.clone(),
                    message: error.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(status = status.as_u16(), "llm endpoint returned an error status");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let decoded = response
            .json::<GenerateResponse>()
            .map_err(|error| LlmError::Decode(error.to_string()))?;
        Ok(decoded.completion_text())
    }
}

/// The system prompt, when present, is prepended on its own line.
#[must_use]
pub fn full_prompt(prompt: &str, system_prompt: Option<&str>) -> String {
    match system_prompt {
        Some(system) => format!("{system}\n{prompt}"),
        None => prompt.to_string(),
    }
}

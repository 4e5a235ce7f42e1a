//! Generative model providers.
//!
//! - `gemini`: native Google Gemini `generateContent`
//! - `openai_compat`: any OpenAI-compatible `chat/completions` endpoint
//!
//! Providers only move text: they send the rendered prompt and return the raw
//! answer. Parsing and retries live in [`crate::judge`].

pub mod gemini;
pub mod openai_compat;

pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatibleProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::LlmConfig;
use crate::error::{ConfigError, ModelError};

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}

/// Raw output of one model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: TokenUsage::default(),
        }
    }
}

/// Trait for text-generation backends.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Send a single prompt and return the model's answer.
    async fn generate(&self, prompt: &str) -> Result<Generation, ModelError>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}

/// Create a model provider from configuration.
///
/// Resolves the API key and builds the HTTP client once; the returned provider
/// is shared by every request.
pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn TextModel>, ConfigError> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiProvider::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiCompatibleProvider::new(config)?)),
        other => Err(ConfigError::Invalid {
            message: format!("unknown llm provider '{}' (expected gemini or openai)", other),
        }),
    }
}

/// Parse a `Retry-After` header given in seconds.
pub(crate) fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Shared status-code mapping for model providers.
pub(crate) fn map_http_error(
    provider: &str,
    status: reqwest::StatusCode,
    retry_after: Option<u64>,
    body_text: &str,
    timeout_secs: u64,
) -> ModelError {
    match status.as_u16() {
        429 => ModelError::RateLimited {
            retry_after_secs: retry_after,
        },
        408 | 504 => ModelError::Timeout { timeout_secs },
        401 | 403 => ModelError::ProviderError {
            status: status.as_u16(),
            message: format!("Authentication failed for {}", provider),
        },
        code => ModelError::ProviderError {
            status: code,
            message: format!("HTTP {} from {}: {}", status, provider, truncate(body_text, 200)),
        },
    }
}

/// Shared transport-error mapping for model providers.
///
/// The request URL is stripped first: error text ends up in response bodies
/// and log files.
pub(crate) fn map_transport_error(
    provider: &str,
    err: reqwest::Error,
    timeout_secs: u64,
) -> ModelError {
    let err = err.without_url();
    if err.is_timeout() {
        ModelError::Timeout { timeout_secs }
    } else if err.is_decode() || err.is_body() {
        ModelError::MalformedOutput {
            message: format!("Failed to read response body: {}", err),
        }
    } else {
        ModelError::Network {
            message: format!("Request to {} failed: {}", provider, err),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

/// Scripted model for tests and offline runs.
///
/// Each call pops the next queued result and records the prompt it was given.
/// An exhausted queue yields `EmptyOutput`.
pub struct MockTextModel {
    responses: Mutex<VecDeque<Result<Generation, ModelError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockTextModel {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A model that answers once with `text`.
    pub fn answering(text: &str) -> Self {
        let model = Self::new();
        model.queue_text(text);
        model
    }

    pub fn queue(&self, response: Result<Generation, ModelError>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    pub fn queue_text(&self, text: &str) {
        self.queue(Ok(Generation::text(text)));
    }

    pub fn queue_error(&self, err: ModelError) {
        self.queue(Err(err));
    }

    /// Number of `generate` calls made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for MockTextModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextModel for MockTextModel {
    async fn generate(&self, prompt: &str) -> Result<Generation, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(Err(ModelError::EmptyOutput))
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

//! Google Gemini API provider.
//!
//! Auth is the `x-goog-api-key` header, so the key never appears in a URL that
//! transport errors could echo. The prompt is sent as a single user turn; the
//! answer is the concatenated text of the first candidate.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::{
    Generation, TextModel, TokenUsage, map_http_error, map_transport_error, retry_after_secs,
};
use crate::config::{LlmConfig, resolve_api_key};
use crate::error::{ConfigError, ModelError};

/// The default Google Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini API provider.
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
    timeout_secs: u64,
}

impl GeminiProvider {
    /// Create a new Gemini provider from configuration.
    ///
    /// Reads the API key from `config.api_key` or the environment variable
    /// named by `config.api_key_env`.
    pub fn new(config: &LlmConfig) -> Result<Self, ConfigError> {
        let api_key = resolve_api_key(config.api_key.as_deref(), &config.api_key_env)?;
        Self::new_with_key(config, api_key)
    }

    /// Create a new Gemini provider with an explicitly provided API key.
    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, ConfigError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }

    fn build_request_body(&self, prompt: &str) -> Value {
        serde_json::json!({
            "contents": [
                { "role": "user", "parts": [ { "text": prompt } ] }
            ],
            "generationConfig": {
                "maxOutputTokens": self.max_tokens,
                "temperature": self.temperature,
            },
        })
    }

    fn endpoint_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Parse a `generateContent` response into text plus usage.
    pub(crate) fn parse_response(body: &Value) -> Result<Generation, ModelError> {
        let candidates = body["candidates"]
            .as_array()
            .ok_or_else(|| ModelError::MalformedOutput {
                message: "Missing 'candidates' array in response".to_string(),
            })?;

        let candidate = candidates
            .first()
            .ok_or_else(|| ModelError::MalformedOutput {
                message: "Empty 'candidates' array in response".to_string(),
            })?;

        let parts = candidate["content"]["parts"]
            .as_array()
            .ok_or_else(|| ModelError::MalformedOutput {
                message: "Missing 'parts' array in candidate content".to_string(),
            })?;

        let text: String = parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(ModelError::EmptyOutput);
        }

        let usage_metadata = &body["usageMetadata"];
        let usage = TokenUsage {
            input_tokens: usage_metadata["promptTokenCount"].as_u64().unwrap_or(0) as usize,
            output_tokens: usage_metadata["candidatesTokenCount"].as_u64().unwrap_or(0) as usize,
        };

        Ok(Generation { text, usage })
    }
}

#[async_trait]
impl TextModel for GeminiProvider {
    async fn generate(&self, prompt: &str) -> Result<Generation, ModelError> {
        let body = self.build_request_body(prompt);

        debug!(
            model = self.model.as_str(),
            prompt_chars = prompt.len(),
            "Sending Gemini generateContent request"
        );

        let response = self
            .client
            .post(self.endpoint_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error("Gemini API", e, self.timeout_secs))?;

        let status = response.status();
        let retry_after = retry_after_secs(response.headers());
        let body_text = response
            .text()
            .await
            .map_err(|e| map_transport_error("Gemini API", e, self.timeout_secs))?;

        if !status.is_success() {
            return Err(map_http_error(
                "Gemini API",
                status,
                retry_after,
                &body_text,
                self.timeout_secs,
            ));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| ModelError::MalformedOutput {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        let generation = Self::parse_response(&response_json)?;
        debug!(
            input_tokens = generation.usage.input_tokens,
            output_tokens = generation.usage.output_tokens,
            "Gemini usage"
        );
        Ok(generation)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

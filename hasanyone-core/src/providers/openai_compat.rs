//! OpenAI-compatible model provider.
//!
//! Works with OpenAI and any endpoint that follows the chat completions API
//! format (Ollama, vLLM, LM Studio, Azure OpenAI behind a proxy).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use super::{
    Generation, TextModel, TokenUsage, map_http_error, map_transport_error, retry_after_secs,
};
use crate::config::{LlmConfig, resolve_api_key};
use crate::error::{ConfigError, ModelError};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat completions provider.
pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
    timeout_secs: u64,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, ConfigError> {
        let api_key = resolve_api_key(config.api_key.as_deref(), &config.api_key_env)?;
        Self::new_with_key(config, api_key)
    }

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
        json!({
            "model": self.model,
            "messages": [ { "role": "user", "content": prompt } ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        })
    }

    /// Parse a chat completions response body.
    pub(crate) fn parse_response(body: &Value) -> Result<Generation, ModelError> {
        let choice = body
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| ModelError::MalformedOutput {
                message: "No choices in response".to_string(),
            })?;

        let message = choice
            .get("message")
            .ok_or_else(|| ModelError::MalformedOutput {
                message: "No message in choice".to_string(),
            })?;

        let text = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        if text.trim().is_empty() {
            return Err(ModelError::EmptyOutput);
        }

        let usage = body
            .get("usage")
            .map(|u| TokenUsage {
                input_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
                output_tokens: u
                    .get("completion_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as usize,
            })
            .unwrap_or_default();

        Ok(Generation { text, usage })
    }
}

#[async_trait]
impl TextModel for OpenAiCompatibleProvider {
    async fn generate(&self, prompt: &str) -> Result<Generation, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request_body(prompt);

        debug!(
            model = self.model.as_str(),
            url = url.as_str(),
            "Sending chat completions request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error("chat completions API", e, self.timeout_secs))?;

        let status = response.status();
        let retry_after = retry_after_secs(response.headers());
        let body_text = response
            .text()
            .await
            .map_err(|e| map_transport_error("chat completions API", e, self.timeout_secs))?;

        if !status.is_success() {
            return Err(map_http_error(
                "chat completions API",
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
            "Chat completions usage"
        );
        Ok(generation)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let config = LlmConfig {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            ..LlmConfig::default()
        };
        let p = OpenAiCompatibleProvider::new_with_key(&config, "k".into()).unwrap();
        let body = p.build_request_body("prompt text");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "prompt text");
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "choices": [ { "message": { "role": "assistant", "content": "NOVEL: YES" } } ],
            "usage": { "prompt_tokens": 10, "completion_tokens": 4 }
        });
        let generation = OpenAiCompatibleProvider::parse_response(&body).unwrap();
        assert_eq!(generation.text, "NOVEL: YES");
        assert_eq!(generation.usage.output_tokens, 4);
    }

    #[test]
    fn test_parse_response_errors() {
        assert!(matches!(
            OpenAiCompatibleProvider::parse_response(&json!({"choices": []})),
            Err(ModelError::MalformedOutput { .. })
        ));
        assert!(matches!(
            OpenAiCompatibleProvider::parse_response(
                &json!({"choices": [ { "message": { "content": null } } ]})
            ),
            Err(ModelError::EmptyOutput)
        ));
    }
}

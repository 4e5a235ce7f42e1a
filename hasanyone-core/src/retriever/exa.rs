//! Exa literature-search provider.
//!
//! Key points of the Exa API as used here:
//! - Auth via the `x-api-key` header
//! - `POST /search` with `numResults`, `type` and `category`
//! - `contents.summary` asks Exa to attach a generated summary per hit
//!
//! Hybrid mode splits the result budget into a neural leg and a keyword leg,
//! runs them sequentially, and keeps the first occurrence of each URL.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

use super::{RawHit, SearchProvider};
use crate::config::{SearchConfig, SearchMode, resolve_api_key};
use crate::error::{ConfigError, RetrievalError};

/// The default Exa API base URL.
const DEFAULT_BASE_URL: &str = "https://api.exa.ai";

/// Exa search provider.
pub struct ExaSearchProvider {
    client: Client,
    base_url: String,
    api_key: String,
    mode: SearchMode,
    neural_ratio: f64,
    category: String,
    use_autoprompt: bool,
    timeout_secs: u64,
}

impl ExaSearchProvider {
    /// Create a provider, resolving the API key from `config.api_key` or the
    /// environment variable named by `config.api_key_env`.
    pub fn new(config: &SearchConfig) -> Result<Self, ConfigError> {
        let api_key = resolve_api_key(config.api_key.as_deref(), &config.api_key_env)?;
        Self::new_with_key(config, api_key)
    }

    /// Create a provider with an explicitly provided API key.
    pub fn new_with_key(config: &SearchConfig, api_key: String) -> Result<Self, ConfigError> {
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
            mode: config.mode,
            neural_ratio: config.effective_neural_ratio(),
            category: config.category.clone(),
            use_autoprompt: config.use_autoprompt,
            timeout_secs: config.timeout_secs,
        })
    }

    /// Build the JSON request body for one search call.
    fn build_request_body(&self, query: &str, limit: usize, search_type: &str) -> Value {
        let mut body = serde_json::json!({
            "query": query,
            "numResults": limit,
            "type": search_type,
            "useAutoprompt": self.use_autoprompt,
            "contents": { "summary": true },
        });
        if !self.category.trim().is_empty() {
            body["category"] = Value::String(self.category.clone());
        }
        body
    }

    /// Perform a single `/search` call.
    async fn search_once(
        &self,
        query: &str,
        limit: usize,
        search_type: &str,
    ) -> Result<Vec<RawHit>, RetrievalError> {
        let url = format!("{}/search", self.base_url);
        let body = self.build_request_body(query, limit, search_type);

        debug!(
            url = url.as_str(),
            search_type,
            limit,
            "Sending Exa search request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text, self.timeout_secs));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| RetrievalError::InvalidResponse {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        Self::parse_response(&response_json)
    }

    /// Extract hits from an Exa response. Individual fields are lenient;
    /// only a missing `results` array fails the call.
    pub(crate) fn parse_response(body: &Value) -> Result<Vec<RawHit>, RetrievalError> {
        let results = body["results"]
            .as_array()
            .ok_or_else(|| RetrievalError::InvalidResponse {
                message: "Missing 'results' array in response".to_string(),
            })?;

        Ok(results.iter().map(Self::parse_hit).collect())
    }

    fn parse_hit(result: &Value) -> RawHit {
        let text = |key: &str| {
            result
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let url = ["url", "link", "id"]
            .iter()
            .filter_map(|key| text(key))
            .find(|candidate| url::Url::parse(candidate).is_ok());

        RawHit {
            title: text("title"),
            summary: text("summary")
                .or_else(|| text("abstract"))
                .or_else(|| text("text")),
            url,
            author: text("author"),
            published_date: text("publishedDate"),
        }
    }

    fn map_http_error(
        status: reqwest::StatusCode,
        body_text: &str,
        timeout_secs: u64,
    ) -> RetrievalError {
        match status.as_u16() {
            408 | 504 => RetrievalError::Timeout { timeout_secs },
            code => RetrievalError::ProviderError {
                status: code,
                message: format!("HTTP {} from Exa API: {}", status, truncate(body_text, 200)),
            },
        }
    }

    fn map_transport_error(&self, err: reqwest::Error) -> RetrievalError {
        let err = err.without_url();
        if err.is_timeout() {
            RetrievalError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else if err.is_decode() || err.is_body() {
            RetrievalError::InvalidResponse {
                message: format!("Failed to read response body: {}", err),
            }
        } else {
            RetrievalError::Network {
                message: format!("Request to Exa API failed: {}", err),
            }
        }
    }

    /// Neural/keyword result counts for a hybrid search of `limit` results.
    pub fn hybrid_split(limit: usize, neural_ratio: f64) -> (usize, usize) {
        let neural = ((limit as f64) * neural_ratio).ceil() as usize;
        let neural = neural.min(limit);
        (neural, limit - neural)
    }

    async fn search_hybrid(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RawHit>, RetrievalError> {
        let (neural, keyword) = Self::hybrid_split(limit, self.neural_ratio);
        debug!(neural, keyword, "Running hybrid search");

        let mut hits = Vec::with_capacity(limit);
        if neural > 0 {
            hits.extend(self.search_once(query, neural, "neural").await?);
        }
        if keyword > 0 {
            hits.extend(self.search_once(query, keyword, "keyword").await?);
        }

        let before = hits.len();
        let hits = dedupe_by_url(hits);
        if hits.len() < before {
            warn!(
                dropped = before - hits.len(),
                "Dropped duplicate papers from hybrid search"
            );
        }
        Ok(hits)
    }
}

#[async_trait]
impl SearchProvider for ExaSearchProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawHit>, RetrievalError> {
        let mut hits = match self.mode {
            SearchMode::Hybrid => self.search_hybrid(query, limit).await?,
            mode => self.search_once(query, limit, &mode.to_string()).await?,
        };
        hits.truncate(limit);
        Ok(hits)
    }

    fn name(&self) -> &str {
        "exa"
    }
}

/// Keep the first hit for each URL. Hits without a URL are never merged.
fn dedupe_by_url(hits: Vec<RawHit>) -> Vec<RawHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|hit| match &hit.url {
            Some(url) => seen.insert(url.clone()),
            None => true,
        })
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

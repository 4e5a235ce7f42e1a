//! Configuration system for HasAnyone.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> explicit file -> environment -> overrides.
//! Configuration is loaded from `~/.config/hasanyone/config.toml` and/or
//! `.hasanyone/config.toml` in the working directory.
//!
//! API keys are referenced by environment variable name and resolved when a
//! provider is constructed, never when the config is loaded.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// How the literature search is performed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Let the provider pick.
    #[default]
    Auto,
    /// Embedding-based search only.
    Neural,
    /// Keyword search only.
    Keyword,
    /// Split the result budget between neural and keyword search.
    Hybrid,
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchMode::Auto => write!(f, "auto"),
            SearchMode::Neural => write!(f, "neural"),
            SearchMode::Keyword => write!(f, "keyword"),
            SearchMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl std::str::FromStr for SearchMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(SearchMode::Auto),
            "neural" => Ok(SearchMode::Neural),
            "keyword" => Ok(SearchMode::Keyword),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(ConfigError::Invalid {
                message: format!(
                    "unknown search mode '{}' (expected auto, neural, keyword or hybrid)",
                    other
                ),
            }),
        }
    }
}

/// Literature-search provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Provider name. Only "exa" is built in.
    pub provider: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Inline API key; takes precedence over `api_key_env` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Hard ceiling for the number of results requested per question.
    pub max_limit: usize,
    pub mode: SearchMode,
    /// Share of the result budget given to neural search in hybrid mode (0.0-1.0).
    pub neural_ratio: f64,
    /// Provider-side category filter.
    pub category: String,
    pub use_autoprompt: bool,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: "exa".to_string(),
            api_key_env: "EXA_API_KEY".to_string(),
            api_key: None,
            base_url: None,
            max_limit: 20,
            mode: SearchMode::Auto,
            neural_ratio: 1.0,
            category: "research paper".to_string(),
            use_autoprompt: true,
            timeout_secs: 30,
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Neural ratio clamped into `0.0..=1.0`.
    pub fn effective_neural_ratio(&self) -> f64 {
        if self.neural_ratio.is_nan() {
            return 1.0;
        }
        self.neural_ratio.clamp(0.0, 1.0)
    }
}

/// Generative model provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "gemini" or "openai" (any OpenAI-compatible endpoint).
    pub provider: String,
    /// Model identifier (e.g., "gemini-2.0-flash", "gpt-4o-mini").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Inline API key; takes precedence over `api_key_env` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    pub temperature: f32,
    /// Per-attempt timeout.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: 1000,
            temperature: 0.2,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry policy for model calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of model invocations allowed, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    /// Add up to 25% random jitter to each backoff.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 8_000,
            jitter: false,
        }
    }
}

/// Pipeline-level knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of evidence items requested per question.
    pub evidence_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { evidence_limit: 5 }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl AppConfig {
    /// Return human-readable warnings for suspicious but usable values.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.pipeline.evidence_limit == 0 || self.pipeline.evidence_limit > self.search.max_limit
        {
            warnings.push(format!(
                "pipeline.evidence_limit ({}) is outside 1..={}; it will be clamped",
                self.pipeline.evidence_limit, self.search.max_limit
            ));
        }
        if !(0.0..=1.0).contains(&self.search.neural_ratio) {
            warnings.push(format!(
                "search.neural_ratio ({}) is outside 0.0-1.0; it will be clamped",
                self.search.neural_ratio
            ));
        }
        if self.llm.temperature < 0.0 || self.llm.temperature > 2.0 {
            warnings.push(format!(
                "llm.temperature ({}) is outside the typical range 0.0-2.0",
                self.llm.temperature
            ));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            warnings.push(format!(
                "retry.max_backoff_ms ({}) is below retry.initial_backoff_ms ({})",
                self.retry.max_backoff_ms, self.retry.initial_backoff_ms
            ));
        }
        warnings
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.search.timeout_secs == 0 || self.llm.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "search.timeout_secs and llm.timeout_secs must be greater than zero"
                    .to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "retry.max_attempts must be at least 1".to_string(),
            });
        }
        if self.search.max_limit == 0 {
            return Err(ConfigError::Invalid {
                message: "search.max_limit must be at least 1".to_string(),
            });
        }
        if self.search.provider != "exa" {
            return Err(ConfigError::Invalid {
                message: format!("unknown search provider '{}'", self.search.provider),
            });
        }
        if !matches!(self.llm.provider.as_str(), "gemini" | "openai") {
            return Err(ConfigError::Invalid {
                message: format!(
                    "unknown llm provider '{}' (expected gemini or openai)",
                    self.llm.provider
                ),
            });
        }
        Ok(())
    }
}

/// Resolve an API key from an inline value or the named environment variable.
pub fn resolve_api_key(inline: Option<&str>, env_var: &str) -> Result<String, ConfigError> {
    if let Some(key) = inline.filter(|k| !k.trim().is_empty()) {
        return Ok(key.to_string());
    }
    match std::env::var(env_var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(ConfigError::EnvVarMissing {
            var: env_var.to_string(),
        }),
    }
}

/// Load configuration by merging all layers.
///
/// `explicit` is a config file named on the command line; it must exist.
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
    overrides: Option<&AppConfig>,
) -> Result<AppConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    // User-level config
    if let Some(dirs) = directories::ProjectDirs::from("dev", "hasanyone", "hasanyone") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".hasanyone").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // Environment variables (HASANYONE_LLM__MODEL, HASANYONE_SEARCH__MODE, etc.)
    figment = figment.merge(Env::prefixed("HASANYONE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: AppConfig = figment.extract()?;
    config.check()?;
    Ok(config)
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> std::path::PathBuf {
    workspace.join(".hasanyone").join("config.toml")
}

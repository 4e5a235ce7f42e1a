//! Error types for the HasAnyone core.
//!
//! Uses `thiserror` for public API error types. Each pipeline stage has its own
//! error enum so the originating kind survives end-to-end and the HTTP boundary
//! can map it to a status code without inspecting messages.

use std::path::PathBuf;

/// Top-level error type for the HasAnyone core library.
#[derive(Debug, thiserror::Error)]
pub enum HasAnyoneError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl HasAnyoneError {
    /// The coarse kind of this error, used by the boundary to pick a status code.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HasAnyoneError::Validation(_) => ErrorKind::Validation,
            HasAnyoneError::Retrieval(_) => ErrorKind::Retrieval,
            HasAnyoneError::Model(_) => ErrorKind::Model,
            HasAnyoneError::Config(_) => ErrorKind::Config,
        }
    }
}

/// Coarse error classification preserved from the failing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Retrieval,
    Model,
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Retrieval => write!(f, "retrieval"),
            ErrorKind::Model => write!(f, "model"),
            ErrorKind::Config => write!(f, "config"),
        }
    }
}

/// Caller input defects. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Research question is required.")]
    EmptyQuestion,
}

/// Failures of the literature-search call.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Search request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Search provider connection failed: {message}")]
    Network { message: String },

    #[error("Search provider returned an unreadable response: {message}")]
    InvalidResponse { message: String },

    #[error("Search provider error (HTTP {status}): {message}")]
    ProviderError { status: u16, message: String },
}

/// Why a retrieval failed, without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalCause {
    Timeout,
    Network,
    InvalidResponse,
    ProviderError,
}

impl RetrievalError {
    pub fn cause(&self) -> RetrievalCause {
        match self {
            RetrievalError::Timeout { .. } => RetrievalCause::Timeout,
            RetrievalError::Network { .. } => RetrievalCause::Network,
            RetrievalError::InvalidResponse { .. } => RetrievalCause::InvalidResponse,
            RetrievalError::ProviderError { .. } => RetrievalCause::ProviderError,
        }
    }
}

/// Failures of the generative-model call.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Rate limited by model provider{}", retry_after_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Model response could not be read: {message}")]
    MalformedOutput { message: String },

    #[error("Model returned an empty response")]
    EmptyOutput,

    #[error("Model provider connection failed: {message}")]
    Network { message: String },

    #[error("Model provider error (HTTP {status}): {message}")]
    ProviderError { status: u16, message: String },
}

fn retry_after_hint(secs: &Option<u64>) -> String {
    secs.map(|s| format!(", retry after {s}s"))
        .unwrap_or_default()
}

/// Why a model call failed, without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCause {
    Timeout,
    RateLimit,
    MalformedOutput,
    EmptyOutput,
    Network,
    ProviderError,
}

impl ModelError {
    pub fn cause(&self) -> ModelCause {
        match self {
            ModelError::Timeout { .. } => ModelCause::Timeout,
            ModelError::RateLimited { .. } => ModelCause::RateLimit,
            ModelError::MalformedOutput { .. } => ModelCause::MalformedOutput,
            ModelError::EmptyOutput => ModelCause::EmptyOutput,
            ModelError::Network { .. } => ModelCause::Network,
            ModelError::ProviderError { .. } => ModelCause::ProviderError,
        }
    }

    /// Only timeouts and rate limits are worth another attempt. Malformed output
    /// is deterministic for a given prompt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelError::Timeout { .. } | ModelError::RateLimited { .. }
        )
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::ParseError {
            message: err.to_string(),
        }
    }
}

/// A type alias for results using the top-level `HasAnyoneError`.
pub type Result<T> = std::result::Result<T, HasAnyoneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_is_user_facing() {
        let err = HasAnyoneError::from(ValidationError::EmptyQuestion);
        assert_eq!(err.to_string(), "Research question is required.");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_error_display_retrieval() {
        let err = HasAnyoneError::Retrieval(RetrievalError::Timeout { timeout_secs: 30 });
        assert_eq!(
            err.to_string(),
            "Retrieval error: Search request timed out after 30s"
        );
        assert_eq!(err.kind(), ErrorKind::Retrieval);
    }

    #[test]
    fn test_error_display_config() {
        let err = HasAnyoneError::Config(ConfigError::EnvVarMissing {
            var: "EXA_API_KEY".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Environment variable not set: EXA_API_KEY"
        );
    }

    #[test]
    fn test_rate_limit_display() {
        let err = ModelError::RateLimited {
            retry_after_secs: Some(60),
        };
        assert_eq!(
            err.to_string(),
            "Rate limited by model provider, retry after 60s"
        );

        let err = ModelError::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(err.to_string(), "Rate limited by model provider");
    }

    #[test]
    fn test_transient_model_errors() {
        assert!(ModelError::Timeout { timeout_secs: 5 }.is_transient());
        assert!(
            ModelError::RateLimited {
                retry_after_secs: None
            }
            .is_transient()
        );
        assert!(!ModelError::EmptyOutput.is_transient());
        assert!(
            !ModelError::MalformedOutput {
                message: "no candidates".into()
            }
            .is_transient()
        );
        assert!(
            !ModelError::Network {
                message: "refused".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_causes() {
        let err = RetrievalError::ProviderError {
            status: 502,
            message: "bad gateway".into(),
        };
        assert_eq!(err.cause(), RetrievalCause::ProviderError);
        assert_eq!(ModelError::EmptyOutput.cause(), ModelCause::EmptyOutput);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::Model.to_string(), "model");
        assert_eq!(ErrorKind::Retrieval.to_string(), "retrieval");
    }
}

//! # HasAnyone Core
//!
//! Core library for HasAnyone, which answers "has anyone already studied this
//! research question?". Provides evidence retrieval, prompt rendering, model
//! judgment, the orchestrating pipeline, the HTTP boundary, configuration,
//! and an offline evaluation harness.

pub mod config;
pub mod error;
pub mod evaluation;
pub mod gateway;
pub mod judge;
pub mod metrics;
pub mod pipeline;
pub mod prompt;
pub mod providers;
pub mod retriever;
pub mod types;

// Re-export commonly used types at the crate root.
pub use config::{AppConfig, SearchMode, load_config};
pub use error::{
    ConfigError, ErrorKind, HasAnyoneError, ModelError, Result, RetrievalError, ValidationError,
};
pub use gateway::GatewayState;
pub use judge::{JudgmentEngine, Sleeper, TokioSleeper};
pub use pipeline::{NoveltyPipeline, PipelineResult};
pub use prompt::{Prompt, PromptBuilder};
pub use providers::{MockTextModel, TextModel, TokenUsage, create_model};
pub use retriever::{EvidenceRetriever, MockSearchProvider, RawHit, SearchProvider};
pub use types::{
    Advisory, AdvisoryCode, Citation, EvidenceItem, EvidenceLink, EvidenceSet, Novelty,
    NoveltyReport, Question, Verdict,
};

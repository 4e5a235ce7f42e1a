//! HTTP boundary for the novelty pipeline.
//!
//! `POST /novelty-check` runs one pipeline and maps the error kind of a failed
//! run onto a status code. `GET /health` reports uptime and request counters.

pub mod server;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ErrorKind, HasAnyoneError};
use crate::metrics::GatewayMetrics;
use crate::pipeline::NoveltyPipeline;

pub use server::{router, run};

/// Inbound request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoveltyRequest {
    #[serde(default)]
    pub research_question: String,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
}

impl ErrorBody {
    pub fn from_error(err: &HasAnyoneError) -> Self {
        Self {
            error: err.kind().to_string(),
            detail: err.to_string(),
        }
    }
}

/// Status code for a failed run, chosen by error kind alone.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Retrieval => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Model => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Config => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// State shared by all handlers. The pipeline is immutable; only the atomic
/// counters change.
#[derive(Clone)]
pub struct GatewayState {
    pub pipeline: Arc<NoveltyPipeline>,
    pub metrics: Arc<GatewayMetrics>,
}

impl GatewayState {
    pub fn new(pipeline: NoveltyPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            metrics: Arc::new(GatewayMetrics::new()),
        }
    }
}

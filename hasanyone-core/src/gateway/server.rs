//! axum server for the novelty-check API.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::{ErrorBody, GatewayState, NoveltyRequest, status_for};
use crate::config::ServerConfig;

/// Build the axum router with all routes.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/novelty-check", post(novelty_check_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn novelty_check_handler(
    State(state): State<GatewayState>,
    payload: Result<Json<NoveltyRequest>, JsonRejection>,
) -> Response {
    state.metrics.record_request();

    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            state.metrics.record_error(crate::error::ErrorKind::Validation);
            let body = ErrorBody {
                error: "validation".to_string(),
                detail: rejection.body_text(),
            };
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    match state.pipeline.run(&request.research_question).await {
        Ok(report) => {
            state.metrics.record_verdict(report.novelty);
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(err) => {
            let kind = err.kind();
            state.metrics.record_error(kind);
            let status = status_for(kind);
            if status.is_server_error() {
                warn!(kind = %kind, error = %err, "Novelty check failed");
            }
            (status, Json(ErrorBody::from_error(&err))).into_response()
        }
    }
}

/// Health check endpoint.
async fn health_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "uptime_secs": state.metrics.uptime_secs(),
        "evidence_limit": state.pipeline.evidence_limit(),
        "requests": state.metrics.snapshot(),
    });
    Json(body)
}

/// Bind and serve until Ctrl-C.
pub async fn run(state: GatewayState, config: &ServerConfig) -> Result<(), std::io::Error> {
    let app = router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = addr.as_str(), "Novelty-check API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

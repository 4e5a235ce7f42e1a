//! Integration tests for the novelty-check HTTP API.

use std::sync::Arc;

use axum::body::Body;
use hasanyone_core::error::{ModelError, RetrievalError};
use hasanyone_core::gateway::{GatewayState, router};
use hasanyone_core::judge::RecordingSleeper;
use hasanyone_core::{AppConfig, MockSearchProvider, MockTextModel, NoveltyPipeline};
use tower::ServiceExt;

fn make_state(search: MockSearchProvider, model: MockTextModel) -> GatewayState {
    let pipeline =
        NoveltyPipeline::with_providers(&AppConfig::default(), Arc::new(search), Arc::new(model))
            .with_sleeper(Arc::new(RecordingSleeper::new()));
    GatewayState::new(pipeline)
}

fn make_post_request(uri: &str, body: serde_json::Value) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn send(
    state: GatewayState,
    request: axum::http::Request<Body>,
) -> (axum::http::StatusCode, serde_json::Value) {
    let app = router(state);
    let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, request)
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    (status, json)
}

async fn check(state: GatewayState, question: &str) -> (axum::http::StatusCode, serde_json::Value) {
    send(
        state,
        make_post_request(
            "/novelty-check",
            serde_json::json!({ "research_question": question }),
        ),
    )
    .await
}

#[tokio::test]
async fn test_success_response_shape() {
    let state = make_state(
        MockSearchProvider::with_hits(vec![MockSearchProvider::hit(
            "Sleep and memory consolidation",
            "Review.",
            "https://example.org/sleep",
        )]),
        MockTextModel::answering("NOVEL: NO\nCITATIONS: 1\nEXPLANATION: Reviewed in [1]."),
    );

    let (status, json) = check(state, "Has anyone studied sleep and memory?").await;
    assert_eq!(status, 200);
    assert_eq!(json["novelty"], "NO");
    assert_eq!(json["explanation"], "Reviewed in [1].");
    assert_eq!(json["citations"][0]["url"], "https://example.org/sleep");
    assert_eq!(json["papers"][0]["title"], "Sleep and memory consolidation");
}

#[tokio::test]
async fn test_empty_question_is_400() {
    let state = make_state(MockSearchProvider::new(), MockTextModel::new());
    let (status, json) = check(state, "   ").await;
    assert_eq!(status, 400);
    assert_eq!(json["error"], "validation");
    assert_eq!(json["detail"], "Research question is required.");
}

#[tokio::test]
async fn test_missing_field_is_400() {
    let state = make_state(MockSearchProvider::new(), MockTextModel::new());
    let request = make_post_request("/novelty-check", serde_json::json!({}));
    let (status, json) = send(state, request).await;
    assert_eq!(status, 400);
    assert_eq!(json["detail"], "Research question is required.");
}

#[tokio::test]
async fn test_retrieval_failure_is_500() {
    let state = make_state(
        MockSearchProvider::failing(RetrievalError::Timeout { timeout_secs: 30 }),
        MockTextModel::new(),
    );
    let (status, json) = check(state, "Has anyone studied X?").await;
    assert_eq!(status, 500);
    assert_eq!(json["error"], "retrieval");
}

#[tokio::test]
async fn test_model_failure_is_503() {
    let model = MockTextModel::new();
    model.queue_error(ModelError::ProviderError {
        status: 500,
        message: "upstream down".into(),
    });
    let state = make_state(MockSearchProvider::with_hits(vec![]), model);
    let (status, json) = check(state, "Has anyone studied X?").await;
    assert_eq!(status, 503);
    assert_eq!(json["error"], "model");
}

#[tokio::test]
async fn test_health_counts_outcomes() {
    let state = make_state(
        MockSearchProvider::with_hits(vec![]),
        MockTextModel::answering("NOVEL: YES\nEXPLANATION: Nothing found."),
    );

    let (status, json) = check(state.clone(), "Has anyone studied X?").await;
    assert_eq!(status, 200);
    assert_eq!(json["advisories"][0]["code"], "no_evidence");
    let (status, _) = check(state.clone(), "").await;
    assert_eq!(status, 400);

    let request = axum::http::Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(state, request).await;
    assert_eq!(status, 200);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["requests"]["requests"], 2);
    assert_eq!(json["requests"]["novel"], 1);
    assert_eq!(json["requests"]["validation_errors"], 1);
}

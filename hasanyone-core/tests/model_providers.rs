//! Integration tests for the Gemini and OpenAI-compatible model providers.
//!
//! Uses wiremock for HTTP mocking: request shape, response parsing, and the
//! mapping of provider statuses onto model error causes.

use hasanyone_core::config::LlmConfig;
use hasanyone_core::HasAnyoneError;
use hasanyone_core::error::{ModelCause, ModelError};
use hasanyone_core::gateway::ErrorBody;
use hasanyone_core::providers::{GeminiProvider, OpenAiCompatibleProvider, TextModel};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gemini(mock_server: &MockServer) -> GeminiProvider {
    let config = LlmConfig {
        base_url: Some(mock_server.uri()),
        timeout_secs: 5,
        ..LlmConfig::default()
    };
    GeminiProvider::new_with_key(&config, "gem-key".into()).expect("failed to create provider")
}

fn openai(mock_server: &MockServer) -> OpenAiCompatibleProvider {
    let config = LlmConfig {
        provider: "openai".into(),
        model: "gpt-4o-mini".into(),
        base_url: Some(mock_server.uri()),
        timeout_secs: 5,
        ..LlmConfig::default()
    };
    OpenAiCompatibleProvider::new_with_key(&config, "oa-key".into())
        .expect("failed to create provider")
}

#[tokio::test]
async fn test_gemini_generate_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .and(header("x-goog-api-key", "gem-key"))
        .and(body_partial_json(json!({
            "contents": [ { "parts": [ { "text": "the prompt" } ] } ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [
                { "content": { "parts": [ { "text": "NOVEL: YES\nEXPLANATION: none" } ] } }
            ],
            "usageMetadata": { "promptTokenCount": 42, "candidatesTokenCount": 7 }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let generation = gemini(&mock_server)
        .generate("the prompt")
        .await
        .expect("generate failed");
    assert_eq!(generation.text, "NOVEL: YES\nEXPLANATION: none");
    assert_eq!(generation.usage.input_tokens, 42);
    assert_eq!(generation.usage.output_tokens, 7);
}

#[tokio::test]
async fn test_gemini_key_not_in_request_url() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [ { "content": { "parts": [ { "text": "NOVEL: NO" } ] } } ]
        })))
        .mount(&mock_server)
        .await;

    gemini(&mock_server).generate("p").await.expect("generate failed");

    let requests = mock_server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].url.as_str().contains("gem-key"));
    assert!(requests[0].url.query().is_none());
}

const SECRET: &str = "SUPER-SECRET-KEY";

fn unreachable_config(provider: &str) -> LlmConfig {
    LlmConfig {
        provider: provider.into(),
        base_url: Some("http://127.0.0.1:1".into()),
        timeout_secs: 5,
        ..LlmConfig::default()
    }
}

fn assert_no_secret(err: ModelError) {
    let text = err.to_string();
    assert!(!text.contains(SECRET), "key leaked: {text}");
    assert!(!text.contains("key="), "query string leaked: {text}");

    let body = ErrorBody::from_error(&HasAnyoneError::from(err));
    assert!(!body.detail.contains(SECRET), "key leaked: {}", body.detail);
}

#[tokio::test]
async fn test_gemini_transport_error_hides_key() {
    let provider = GeminiProvider::new_with_key(&unreachable_config("gemini"), SECRET.into())
        .expect("failed to create provider");

    let err = provider.generate("p").await.unwrap_err();
    assert_eq!(err.cause(), ModelCause::Network);
    assert_no_secret(err);
}

#[tokio::test]
async fn test_openai_transport_error_hides_key() {
    let config = unreachable_config("openai");
    let provider = OpenAiCompatibleProvider::new_with_key(&config, SECRET.into())
        .expect("failed to create provider");

    let err = provider.generate("p").await.unwrap_err();
    assert_no_secret(err);
}

#[tokio::test]
async fn test_gemini_rate_limit_reads_retry_after() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "4")
                .set_body_string("quota exceeded"),
        )
        .mount(&mock_server)
        .await;

    let err = gemini(&mock_server).generate("p").await.unwrap_err();
    assert!(matches!(
        err,
        ModelError::RateLimited {
            retry_after_secs: Some(4)
        }
    ));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_gemini_blocked_prompt_is_malformed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        })))
        .mount(&mock_server)
        .await;

    let err = gemini(&mock_server).generate("p").await.unwrap_err();
    assert_eq!(err.cause(), ModelCause::MalformedOutput);
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_gemini_gateway_timeout_is_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(504))
        .mount(&mock_server)
        .await;

    let err = gemini(&mock_server).generate("p").await.unwrap_err();
    assert_eq!(err.cause(), ModelCause::Timeout);
}

#[tokio::test]
async fn test_openai_generate_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer oa-key"))
        .and(body_partial_json(json!({ "model": "gpt-4o-mini" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [ { "message": { "role": "assistant", "content": "NOVEL: NO" } } ],
            "usage": { "prompt_tokens": 11, "completion_tokens": 3 }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let generation = openai(&mock_server).generate("p").await.expect("generate failed");
    assert_eq!(generation.text, "NOVEL: NO");
    assert_eq!(generation.usage.total(), 14);
}

#[tokio::test]
async fn test_openai_auth_failure_is_provider_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&mock_server)
        .await;

    let err = openai(&mock_server).generate("p").await.unwrap_err();
    assert!(matches!(err, ModelError::ProviderError { status: 401, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_openai_empty_content_is_empty_output() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [ { "message": { "role": "assistant", "content": "" } } ]
        })))
        .mount(&mock_server)
        .await;

    let err = openai(&mock_server).generate("p").await.unwrap_err();
    assert_eq!(err.cause(), ModelCause::EmptyOutput);
}

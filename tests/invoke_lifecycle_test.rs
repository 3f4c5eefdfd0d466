// Exercises the `/invoke` endpoint end to end: auth collapse, rate limiting,
// call budgets, message validation, multi-turn continuity, and collaboration
// state extraction from a reply producer's trailer.

mod common;

use std::sync::Arc;
use std::time::Duration;

use a2a_runtime::conversation::CollabPhase;
use a2a_runtime::credential::Tier;
use a2a_runtime::external::{NoopSummarizer, ReplyProducer, ReplyProducerError, SanitisedCaller};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn invoke_request(token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/a2a/invoke")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn happy_invoke_returns_trace_id_and_remaining_budget() {
    let harness = common::default_harness().await;
    let created = common::issue_token(&harness.credentials, Tier::Friends, Some(50));
    let router = common::router(harness.state.clone());

    let response = router
        .oneshot(invoke_request(&created.plaintext, json!({ "message": "hi" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-trace-id"));
    let body = json_body(response).await;
    assert_eq!(body["success"], json!(true));
    assert!(body["conversation_id"].as_str().unwrap().starts_with("conv_"));
    assert_eq!(body["tokens_remaining"], json!(49));
}

#[tokio::test]
async fn invalid_token_collapses_to_generic_unauthorized() {
    let harness = common::default_harness().await;
    let router = common::router(harness.state.clone());

    let response = router
        .oneshot(invoke_request("fed_does_not_exist", json!({ "message": "hi" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"], json!("unauthorized"));
}

#[tokio::test]
async fn eleventh_call_in_a_minute_is_rate_limited() {
    let harness = common::default_harness().await;
    let created = common::issue_token(&harness.credentials, Tier::Friends, None);
    let router = common::router(harness.state.clone());

    for _ in 0..10 {
        let response = router
            .clone()
            .oneshot(invoke_request(&created.plaintext, json!({ "message": "hi" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = router
        .oneshot(invoke_request(&created.plaintext, json!({ "message": "hi" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get("retry-after").unwrap().to_str().unwrap(), "60");
    let body = json_body(response).await;
    assert_eq!(body["error"], json!("rate_limited"));
}

#[tokio::test]
async fn max_calls_budget_is_enforced_without_revoking_the_token() {
    let harness = common::default_harness().await;
    let created = common::issue_token(&harness.credentials, Tier::Friends, Some(2));
    let router = common::router(harness.state.clone());

    for _ in 0..2 {
        let response = router
            .clone()
            .oneshot(invoke_request(&created.plaintext, json!({ "message": "hi" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = router
        .oneshot(invoke_request(&created.plaintext, json!({ "message": "hi" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = harness.credentials.get_token(&created.token.id).unwrap();
    assert_eq!(token.calls_made, 2);
    assert!(!token.revoked);
}

#[tokio::test]
async fn message_length_and_emptiness_are_validated() {
    let harness = common::default_harness().await;
    let created = common::issue_token(&harness.credentials, Tier::Friends, None);
    let router = common::router(harness.state.clone());

    let too_long = "x".repeat(15_000);
    let response = router
        .clone()
        .oneshot(invoke_request(&created.plaintext, json!({ "message": too_long })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], json!("invalid_message"));

    let response = router
        .oneshot(invoke_request(&created.plaintext, json!({ "message": "" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], json!("missing_message"));
}

#[tokio::test]
async fn repeated_conversation_id_accumulates_turns() {
    let harness = common::default_harness().await;
    let created = common::issue_token(&harness.credentials, Tier::Friends, None);
    let router = common::router(harness.state.clone());

    let first = router
        .clone()
        .oneshot(invoke_request(&created.plaintext, json!({ "message": "hi" })))
        .await
        .unwrap();
    let first_body = json_body(first).await;
    let conversation_id = first_body["conversation_id"].as_str().unwrap().to_string();

    let second = router
        .oneshot(invoke_request(
            &created.plaintext,
            json!({ "message": "again", "conversation_id": conversation_id }),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    let conv = harness
        .state
        .conversations
        .get_conversation(&conversation_id, Default::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conv.message_count, 4);

    let collab = harness.state.collab.get(&conversation_id).unwrap();
    assert_eq!(collab.turn_count, 2);
}

struct CollabStateReplyProducer;

#[async_trait]
impl ReplyProducer for CollabStateReplyProducer {
    async fn reply(
        &self,
        _conversation_id: &str,
        _inbound_message: &str,
        _caller: &SanitisedCaller,
        _context: Option<&serde_json::Value>,
        _timeout: Duration,
    ) -> Result<String, ReplyProducerError> {
        Ok(r#"Sounds good! <collab_state>{"phase":"explore","overlapScore":0.42,"activeThreads":["a","b"]}</collab_state>"#
            .to_string())
    }
}

#[tokio::test]
async fn collab_state_trailer_is_applied_and_stripped_from_the_reply() {
    let harness = common::build(Arc::new(CollabStateReplyProducer), Arc::new(NoopSummarizer)).await;
    let created = common::issue_token(&harness.credentials, Tier::Friends, None);
    let router = common::router(harness.state.clone());

    let response = router
        .oneshot(invoke_request(&created.plaintext, json!({ "message": "hi" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(!body["response"].as_str().unwrap().contains("<collab_state>"));
    assert!(body["response"].as_str().unwrap().starts_with("Sounds good!"));

    let conversation_id = body["conversation_id"].as_str().unwrap();
    let collab = harness.state.collab.get(conversation_id).unwrap();
    assert_eq!(collab.phase, CollabPhase::Explore);
    assert_eq!(collab.overlap_score, 0.42);
    assert_eq!(collab.active_threads, vec!["a".to_string(), "b".to_string()]);
}

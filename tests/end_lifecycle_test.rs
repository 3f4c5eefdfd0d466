// Exercises `/end`: conclusion, summarization via a custom collaborator,
// and idempotent re-conclusion of an already-closed conversation.

use std::sync::Arc;

use a2a_runtime::conversation::{ConversationStatus, Message};
use a2a_runtime::credential::Tier;
use a2a_runtime::external::{ConversationSummary, EchoReplyProducer, Summarizer};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

struct FixedSummarizer;

#[async_trait]
impl Summarizer for FixedSummarizer {
    async fn summarize(
        &self,
        _messages: &[Message],
        _owner_context: Option<&serde_json::Value>,
    ) -> anyhow::Result<ConversationSummary> {
        Ok(ConversationSummary {
            summary: Some("caller asked about the weather".to_string()),
            owner_summary: Some("weather chit-chat".to_string()),
            ..Default::default()
        })
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn bearer_request(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn end_concludes_summarizes_and_is_idempotent() {
    let harness = common::build(Arc::new(EchoReplyProducer), Arc::new(FixedSummarizer)).await;
    let created = common::issue_token(&harness.credentials, Tier::Friends, None);
    let router = common::router(harness.state.clone());

    let invoke = router
        .clone()
        .oneshot(bearer_request("/api/a2a/invoke", &created.plaintext, json!({ "message": "hi" })))
        .await
        .unwrap();
    let invoke_body = json_body(invoke).await;
    let conversation_id = invoke_body["conversation_id"].as_str().unwrap().to_string();

    let end = router
        .clone()
        .oneshot(bearer_request(
            "/api/a2a/end",
            &created.plaintext,
            json!({ "conversation_id": conversation_id }),
        ))
        .await
        .unwrap();
    assert_eq!(end.status(), StatusCode::OK);
    let end_body = json_body(end).await;
    assert_eq!(end_body["status"], json!("concluded"));
    assert_eq!(end_body["summary"], json!("caller asked about the weather"));

    let conv = harness
        .state
        .conversations
        .get_conversation(&conversation_id, Default::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conv.status, ConversationStatus::Concluded);
    assert_eq!(conv.summary.as_deref(), Some("caller asked about the weather"));
    assert_eq!(conv.owner_summary.as_deref(), Some("weather chit-chat"));

    let second_end = router
        .oneshot(bearer_request(
            "/api/a2a/end",
            &created.plaintext,
            json!({ "conversation_id": conversation_id }),
        ))
        .await
        .unwrap();
    assert_eq!(second_end.status(), StatusCode::OK);
    let second_body = json_body(second_end).await;
    assert_eq!(second_body["success"], json!(true));
}

#[tokio::test]
async fn end_without_conversation_id_is_rejected() {
    let harness = common::default_harness().await;
    let created = common::issue_token(&harness.credentials, Tier::Friends, None);
    let router = common::router(harness.state.clone());

    let response = router
        .oneshot(bearer_request("/api/a2a/end", &created.plaintext, json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], json!("missing_conversation_id"));
}

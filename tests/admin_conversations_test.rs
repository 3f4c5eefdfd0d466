// Exercises the owner-only admin endpoints' loopback/token gate.

mod common;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

#[tokio::test]
async fn loopback_callers_reach_the_admin_endpoint_without_a_token() {
    let harness = common::default_harness().await;
    let router = common::router(harness.state.clone());

    let mut request = Request::builder()
        .method("GET")
        .uri("/api/a2a/conversations")
        .body(Body::empty())
        .unwrap();
    request.extensions_mut().insert(ConnectInfo(common::loopback_addr()));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn remote_callers_without_admin_token_are_rejected() {
    let harness = common::default_harness().await;
    let router = common::router(harness.state.clone());

    let mut request = Request::builder()
        .method("GET")
        .uri("/api/a2a/conversations")
        .body(Body::empty())
        .unwrap();
    request.extensions_mut().insert(ConnectInfo(common::remote_addr()));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_conversation_id_is_not_found() {
    let harness = common::default_harness().await;
    let router = common::router(harness.state.clone());

    let mut request = Request::builder()
        .method("GET")
        .uri("/api/a2a/conversations/does-not-exist")
        .body(Body::empty())
        .unwrap();
    request.extensions_mut().insert(ConnectInfo(common::loopback_addr()));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

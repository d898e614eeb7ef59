//! Stripe webhook signature checks.

#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::StatusCode;

use lamplight_integration_tests::TestContext;

const EVENT: &str = r#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;

#[tokio::test]
async fn test_missing_signature_is_rejected() {
    let mut ctx = TestContext::new();
    let request = ctx
        .request("POST", "/api/webhooks/stripe")
        .header("content-type", "application/json")
        .body(Body::from(EVENT))
        .unwrap();
    let response = ctx.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bad_signature_is_rejected() {
    let mut ctx = TestContext::new();
    let request = ctx
        .request("POST", "/api/webhooks/stripe")
        .header("content-type", "application/json")
        .header("stripe-signature", "t=1700000000,v1=deadbeef")
        .body(Body::from(EVENT))
        .unwrap();
    let response = ctx.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

//! HTMX cart flow and checkout entry points.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::StatusCode;
use serde_json::json;

use lamplight_integration_tests::{TestContext, body_json, body_text};

#[tokio::test]
async fn test_add_to_cart_updates_count() {
    let mut ctx = TestContext::new();

    let response = ctx.post_form("/cart/add", "book_id=1&quantity=2").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["hx-trigger"], "cart-updated");
    assert_eq!(body_text(response).await.trim(), "2");

    let response = ctx.post_form("/cart/add", "book_id=1").await;
    assert_eq!(body_text(response).await.trim(), "3");

    let response = ctx.get("/cart/count").await;
    assert_eq!(body_text(response).await.trim(), "3");
}

#[tokio::test]
async fn test_add_unknown_book_is_not_found() {
    let mut ctx = TestContext::new();
    let response = ctx.post_form("/cart/add", "book_id=999").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cart_page_shows_server_totals() {
    let mut ctx = TestContext::new();
    ctx.post_form("/cart/add", "book_id=1&quantity=1").await;

    let response = ctx.get("/cart").await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Still Waters"));
    assert!(html.contains("Free shipping on orders over $50.00."));
}

#[tokio::test]
async fn test_update_to_zero_removes_line() {
    let mut ctx = TestContext::new();
    ctx.post_form("/cart/add", "book_id=2&quantity=2").await;

    let response = ctx.post_form("/cart/update", "book_id=2&quantity=0").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["hx-trigger"], "cart-updated");
    assert!(body_text(response).await.contains("Your cart is empty."));

    let response = ctx.get("/cart/count").await;
    assert_eq!(body_text(response).await.trim(), "");
}

#[tokio::test]
async fn test_clear_is_idempotent() {
    let mut ctx = TestContext::new();
    ctx.post_form("/cart/add", "book_id=3").await;

    for _ in 0..2 {
        let response = ctx.post_form("/cart/clear", "").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Your cart is empty."));
    }
}

#[tokio::test]
async fn test_payment_intent_for_empty_cart_is_rejected() {
    let mut ctx = TestContext::new();
    let response = ctx
        .post_json(
            "/api/create-payment-intent",
            &json!({ "email": "reader@example.com" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_confirm_without_checkout_is_not_found() {
    let mut ctx = TestContext::new();
    let response = ctx
        .post_json(
            "/api/checkout/confirm",
            &json!({ "paymentIntentId": "pi_3Abc123" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_recover_without_backup() {
    let mut ctx = TestContext::new();
    ctx.post_form("/cart/add", "book_id=1&quantity=2").await;

    let response = ctx.post_json("/api/cart/recover", &json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["recovered"], false);
    assert_eq!(body["itemCount"], 2);
}

#[tokio::test]
async fn test_success_page_without_order_redirects_to_cart() {
    let mut ctx = TestContext::new();
    let response = ctx.get("/checkout/success").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()["location"], "/cart");
}

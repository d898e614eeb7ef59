//! Health, security headers and the book catalog API.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::StatusCode;
use serde_json::json;

use lamplight_core::catalog;
use lamplight_integration_tests::{TestContext, body_json, body_text};

#[tokio::test]
async fn test_health() {
    let mut ctx = TestContext::new();
    let response = ctx.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn test_readiness_reports_unreachable_database() {
    let mut ctx = TestContext::new();
    let response = ctx.get("/health/ready").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_security_headers_and_request_id() {
    let mut ctx = TestContext::new();
    let request = ctx
        .request("GET", "/health")
        .header("x-request-id", "upstream-42")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = ctx.send(request).await;

    let headers = response.headers();
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert!(
        headers["content-security-policy"]
            .to_str()
            .unwrap()
            .contains("https://js.stripe.com")
    );
    assert_eq!(headers["x-request-id"], "upstream-42");
}

#[tokio::test]
async fn test_list_books() {
    let mut ctx = TestContext::new();
    let response = ctx.get("/api/books").await;
    assert_eq!(response.status(), StatusCode::OK);

    let books = body_json(response).await;
    let books = books.as_array().unwrap();
    assert_eq!(books.len(), catalog::books().len());
    assert_eq!(books[0]["title"], "Still Waters");
}

#[tokio::test]
async fn test_show_book() {
    let mut ctx = TestContext::new();
    let response = ctx.get("/api/books/2").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["title"], "A Lamp Unto My Feet");

    let response = ctx.get("/api/books/999").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_featured_books_fall_back_to_catalog_flags() {
    let mut ctx = TestContext::new();
    let response = ctx.get("/api/books/featured").await;
    assert_eq!(response.status(), StatusCode::OK);

    let featured = body_json(response).await;
    let expected: Vec<i32> = catalog::featured().map(|b| b.id.as_i32()).collect();
    let ids: Vec<i64> = featured
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, expected.into_iter().map(i64::from).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_bookmark_is_kept_per_visitor() {
    let mut ctx = TestContext::new();

    let response = ctx.get("/api/books/1/bookmark").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::Value::Null);

    let request = ctx
        .request("PUT", "/api/books/1/bookmark")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(
            json!({ "page": 42, "chapter": "  The Quiet Shore " }).to_string(),
        ))
        .unwrap();
    let response = ctx.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let bookmark = body_json(ctx.get("/api/books/1/bookmark").await).await;
    assert_eq!(bookmark["page"], 42);
    assert_eq!(bookmark["chapter"], "The Quiet Shore");

    let other = body_json(TestContext::new().get("/api/books/1/bookmark").await).await;
    assert_eq!(other, serde_json::Value::Null);
}

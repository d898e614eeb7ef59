//! Integration tests for Lamplight Books.
//!
//! The storefront router is driven in-process with
//! `tower::ServiceExt::oneshot`. Sessions use an in-memory store and the
//! database pool points at a closed port, so every test also exercises the
//! fallbacks taken when Postgres is unreachable.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p lamplight-integration-tests
//! ```

#![allow(clippy::missing_panics_doc, clippy::expect_used)]

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderValue, Request, Response, header};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use tower_sessions::{MemoryStore, SessionManagerLayer};

use lamplight_core::CurrencyCode;
use lamplight_storefront::config::{StorefrontConfig, StripeConfig};
use lamplight_storefront::state::AppState;

/// Admin bearer token accepted by [`TestContext`].
pub const ADMIN_TOKEN: &str = "test-admin-token-9f3c2a71e84b";

/// Webhook signing secret used by [`TestContext`].
pub const WEBHOOK_SECRET: &str = "whsec_test_5d1e9b7c3a2f";

static NEXT_CLIENT: AtomicU8 = AtomicU8::new(1);

fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://lamplight@127.0.0.1:1/lamplight"),
        host: [127, 0, 0, 1].into(),
        port: 3000,
        base_url: "http://localhost:3000".to_string(),
        admin_token: SecretString::from(ADMIN_TOKEN),
        stripe: StripeConfig {
            secret_key: SecretString::from("sk_test_integration"),
            webhook_secret: SecretString::from(WEBHOOK_SECRET),
            publishable_key: Some("pk_test_integration".to_string()),
            currency: CurrencyCode::USD,
            api_base: "http://127.0.0.1:1".to_string(),
        },
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// The storefront router plus the identity of one simulated visitor.
pub struct TestContext {
    app: Router,
    client_ip: String,
    cookie: Option<HeaderValue>,
}

impl TestContext {
    /// Build a router with an in-memory session store and an unreachable
    /// database. Each context gets its own client IP so rate limits do not
    /// leak between tests.
    #[must_use]
    pub fn new() -> Self {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://lamplight@127.0.0.1:1/lamplight")
            .expect("lazy pool from a valid URL");
        let state = AppState::new(test_config(), pool).expect("app state");
        let app = lamplight_storefront::router(state)
            .layer(SessionManagerLayer::new(MemoryStore::default()).with_secure(false));

        let n = NEXT_CLIENT.fetch_add(1, Ordering::Relaxed);
        Self {
            app,
            client_ip: format!("203.0.113.{n}"),
            cookie: None,
        }
    }

    /// Start a request from this visitor.
    #[must_use]
    pub fn request(&self, method: &str, uri: &str) -> axum::http::request::Builder {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", &self.client_ip);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie.clone());
        }
        builder
    }

    /// Send a request and remember any session cookie it sets.
    pub async fn send(&mut self, request: Request<Body>) -> Response<Body> {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let pair = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(';').next());
        if let Some(pair) = pair {
            self.cookie = HeaderValue::from_str(pair).ok();
        }

        response
    }

    /// `GET` with no body.
    pub async fn get(&mut self, uri: &str) -> Response<Body> {
        let request = self
            .request("GET", uri)
            .body(Body::empty())
            .expect("valid request");
        self.send(request).await
    }

    /// `POST` a JSON body.
    pub async fn post_json(&mut self, uri: &str, body: &serde_json::Value) -> Response<Body> {
        let request = self
            .request("POST", uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("valid request");
        self.send(request).await
    }

    /// `POST` a urlencoded form, as HTMX does.
    pub async fn post_form(&mut self, uri: &str, body: &str) -> Response<Body> {
        let request = self
            .request("POST", uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("hx-request", "true")
            .body(Body::from(body.to_string()))
            .expect("valid request");
        self.send(request).await
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect a response body as text.
pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).expect("JSON body")
}

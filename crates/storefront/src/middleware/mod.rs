//! HTTP middleware stack for the storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Session layer (tower-sessions with `PostgreSQL` store)
//! 5. Security headers (CSP, HSTS, etc.)
//! 6. Rate limiting (governor) on submission endpoints

pub mod admin;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use admin::RequireAdmin;
pub use rate_limit::{api_rate_limiter, submission_rate_limiter};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;

//! Database operations for the storefront `PostgreSQL` database.
//!
//! ## Tables
//!
//! - `books` - Mirror of the compiled catalog (stock, featured ranking)
//! - `orders` / `order_items` - Orders with denormalized line prices
//! - `reviews` - Reader-submitted reviews (ids start at 10000)
//! - `newsletter_subscribers` - Signups keyed by lowercased email
//! - `tower_sessions.session` - Tower-sessions storage
//!
//! The `featured_books()` function returns the ranked featured book ids.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p lamplight-cli -- migrate
//! ```

pub mod books;
pub mod newsletter;
pub mod orders;
pub mod reviews;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use books::BookRepository;
pub use newsletter::NewsletterRepository;
pub use orders::OrderRepository;
pub use reviews::ReviewRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Write would break an order invariant.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! lamplight migrate
//! ```
//!
//! # Environment Variables
//!
//! - `LAMPLIGHT_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//!
//! # Migration Files
//!
//! Migrations live in `crates/storefront/migrations/` and are embedded at
//! compile time.

use tracing::info;

use lamplight_storefront::db;

use super::{CommandError, database_url};

/// Run the storefront migrations.
///
/// # Errors
///
/// Returns an error if the database URL is missing, the connection fails, or
/// a migration fails.
pub async fn run() -> Result<(), CommandError> {
    let database_url = database_url()?;

    info!("Connecting to database...");
    let pool = db::create_pool(&database_url).await?;

    info!("Running migrations...");
    sqlx::migrate!("../storefront/migrations").run(&pool).await?;

    info!("Migrations complete!");
    Ok(())
}

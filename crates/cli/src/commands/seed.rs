//! Seed the database from the compiled book catalog.
//!
//! The storefront serves book details from the catalog compiled into the
//! binary. The `books` table mirrors it so orders can reference books and
//! track stock.

use tracing::info;

use lamplight_core::catalog;
use lamplight_storefront::db::{self, BookRepository};

use super::{CommandError, database_url};

/// Upsert every catalog book into `books`.
///
/// # Errors
///
/// Returns an error if the database URL is missing, the connection fails, or
/// an upsert fails.
pub async fn books() -> Result<(), CommandError> {
    let database_url = database_url()?;

    let pool = db::create_pool(&database_url).await?;
    info!("Connected to database");

    let books = catalog::books();
    let count = BookRepository::new(&pool).upsert_catalog(books).await?;

    info!(count, "Catalog seeded");
    Ok(())
}

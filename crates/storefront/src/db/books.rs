//! Book mirror repository.
//!
//! The catalog itself is compiled in; the `books` table exists so orders and
//! reviews can reference books with foreign keys, and to hold stock counts
//! and the featured ranking.

use sqlx::PgPool;
use tracing::{debug, instrument};

use lamplight_core::{Book, BookId};

use super::RepositoryError;

/// Repository for the `books` table.
pub struct BookRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> BookRepository<'a> {
    /// Create a new book repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Featured book ids, in display order, from `featured_books()`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn featured_ids(&self) -> Result<Vec<BookId>, RepositoryError> {
        let rows: Vec<(i32,)> = sqlx::query_as("SELECT book_id FROM featured_books()")
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(|(id,)| BookId::new(id)).collect())
    }

    /// Insert or refresh catalog rows. Stock counts are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any upsert fails.
    #[instrument(skip(self, books), fields(count = books.len()))]
    pub async fn upsert_catalog(&self, books: &[Book]) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut count = 0_u64;

        for book in books {
            sqlx::query(
                r"
                INSERT INTO books (id, title, author, price, featured)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO UPDATE
                SET title = EXCLUDED.title,
                    author = EXCLUDED.author,
                    price = EXCLUDED.price,
                    featured = EXCLUDED.featured,
                    updated_at = now()
                ",
            )
            .bind(book.id.as_i32())
            .bind(&book.title)
            .bind(&book.author)
            .bind(book.price)
            .bind(book.featured)
            .execute(&mut *tx)
            .await?;
            count += 1;
        }

        tx.commit().await?;
        debug!(count, "Upserted catalog");
        Ok(count)
    }
}

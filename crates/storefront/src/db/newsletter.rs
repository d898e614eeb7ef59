//! Newsletter subscriber repository.

use sqlx::PgPool;
use tracing::instrument;

use lamplight_core::Email;
use lamplight_core::newsletter::Signup;

use super::RepositoryError;

/// Repository for `newsletter_subscribers`.
pub struct NewsletterRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> NewsletterRepository<'a> {
    /// Create a new newsletter repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Subscribe an email, re-subscribing it if it already exists.
    ///
    /// Returns `true` when a new row was created.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the upsert fails.
    #[instrument(skip(self, signup), fields(source = signup.source.as_str()))]
    pub async fn upsert(&self, signup: &Signup) -> Result<bool, RepositoryError> {
        // xmax is zero only for freshly inserted rows
        let (inserted,): (bool,) = sqlx::query_as(
            r"
            INSERT INTO newsletter_subscribers (email, name, source, subscribed)
            VALUES ($1, $2, $3, TRUE)
            ON CONFLICT (email) DO UPDATE
            SET subscribed = TRUE,
                name = COALESCE(EXCLUDED.name, newsletter_subscribers.name),
                updated_at = now()
            RETURNING (xmax = 0)
            ",
        )
        .bind(signup.email.as_str())
        .bind(signup.name.as_deref())
        .bind(signup.source.as_str())
        .fetch_one(self.pool)
        .await?;

        Ok(inserted)
    }

    /// Mark an email as unsubscribed. The row is kept.
    ///
    /// Returns `true` if a subscribed row was changed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(self, email))]
    pub async fn unsubscribe(&self, email: &Email) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE newsletter_subscribers
            SET subscribed = FALSE, updated_at = now()
            WHERE email = $1 AND subscribed
            ",
        )
        .bind(email.as_str())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

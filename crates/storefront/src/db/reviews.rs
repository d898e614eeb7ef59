//! Review repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

use lamplight_core::review::{NewReview, Rating, Review};
use lamplight_core::{BookId, Email, ReviewId};

use super::RepositoryError;

/// Raw `reviews` row.
#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: i32,
    book_id: i32,
    rating: i16,
    title: Option<String>,
    comment: String,
    reviewer_name: String,
    reviewer_email: String,
    is_verified_purchase: bool,
    is_highlighted: bool,
    is_approved: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = RepositoryError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let rating = Rating::try_from(row.rating).map_err(|e| {
            RepositoryError::DataCorruption(format!("review {}: {e}", row.id))
        })?;
        let email = Email::parse(&row.reviewer_email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: ReviewId::new(row.id),
            book_id: BookId::new(row.book_id),
            rating,
            title: row.title,
            comment: row.comment,
            reviewer_name: row.reviewer_name,
            reviewer_email: Some(email),
            is_verified_purchase: row.is_verified_purchase,
            is_highlighted: row.is_highlighted,
            is_approved: row.is_approved,
            date: row.created_at,
        })
    }
}

const REVIEW_COLUMNS: &str = "id, book_id, rating, title, comment, reviewer_name, reviewer_email, \
     is_verified_purchase, is_highlighted, is_approved, created_at";

/// Repository for review database operations.
pub struct ReviewRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReviewRepository<'a> {
    /// Create a new review repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All approved reviews, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a row fails validation.
    #[instrument(skip(self))]
    pub async fn approved(&self) -> Result<Vec<Review>, RepositoryError> {
        let rows: Vec<ReviewRow> = sqlx::query_as(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE is_approved ORDER BY created_at DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Review::try_from).collect()
    }

    /// Store a new, unapproved review.
    ///
    /// The verified-purchase flag is set when the reviewer's email has a
    /// completed order containing the book.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    #[instrument(skip(self, review), fields(book_id = %review.book_id))]
    pub async fn insert(&self, review: &NewReview) -> Result<Review, RepositoryError> {
        let row: ReviewRow = sqlx::query_as(&format!(
            r"
            INSERT INTO reviews
                (book_id, rating, title, comment, reviewer_name, reviewer_email,
                 is_verified_purchase)
            VALUES ($1, $2, $3, $4, $5, $6, EXISTS (
                SELECT 1
                FROM orders o
                JOIN order_items i ON i.order_id = o.id
                WHERE o.customer_email = $6
                  AND i.book_id = $1
                  AND o.status = 'completed'
            ))
            RETURNING {REVIEW_COLUMNS}
            "
        ))
        .bind(review.book_id.as_i32())
        .bind(i16::from(review.rating))
        .bind(review.title.as_deref())
        .bind(&review.comment)
        .bind(&review.reviewer_name)
        .bind(review.reviewer_email.as_str())
        .fetch_one(self.pool)
        .await?;

        debug!(id = row.id, verified = row.is_verified_purchase, "Inserted review");
        Review::try_from(row)
    }

    /// Mark a review as approved.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no review has this id.
    #[instrument(skip(self))]
    pub async fn approve(&self, id: ReviewId) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE reviews SET is_approved = TRUE WHERE id = $1")
            .bind(id.as_i32())
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Delete a review.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no review has this id.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: ReviewId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id.as_i32())
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

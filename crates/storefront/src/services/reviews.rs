//! Review listing, statistics, submission and moderation.
//!
//! The visible review set is the curated list compiled into the core crate
//! plus every approved review in Postgres. The merged set is cached with
//! `moka` for a minute and dropped whenever moderation changes it. When the
//! database is unreachable the curated list is served on its own and not
//! cached.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use lamplight_core::ReviewId;
use lamplight_core::review::{
    self, Review, ReviewFilter, ReviewStats, ReviewSubmission, ReviewValidationError,
};

use crate::db::{RepositoryError, ReviewRepository};

const CACHE_TTL: Duration = Duration::from_secs(60);

/// Errors from review submission.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error(transparent)]
    Invalid(#[from] ReviewValidationError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Reviews backed by Postgres with an in-memory cache.
#[derive(Clone)]
pub struct ReviewService {
    pool: PgPool,
    cache: Cache<(), Arc<[Review]>>,
}

impl ReviewService {
    /// Create a review service over a pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(CACHE_TTL)
            .build();

        Self { pool, cache }
    }

    /// Every visible review: curated plus approved.
    #[instrument(skip(self))]
    pub async fn visible(&self) -> Arc<[Review]> {
        if let Some(reviews) = self.cache.get(&()).await {
            return reviews;
        }

        match ReviewRepository::new(&self.pool).approved().await {
            Ok(persisted) => {
                let merged: Arc<[Review]> = review::union(review::curated(), persisted).into();
                self.cache.insert((), Arc::clone(&merged)).await;
                debug!(count = merged.len(), "Cached visible reviews");
                merged
            }
            Err(e) => {
                warn!(error = %e, "Falling back to curated reviews");
                review::curated().into()
            }
        }
    }

    /// Reviews matching a filter, sorted, with rating statistics for the
    /// same book selection. Both are computed from one visible set.
    pub async fn listing(&self, filter: &ReviewFilter) -> (Vec<Review>, ReviewStats) {
        let visible = self.visible().await;
        (
            review::list(&visible, filter),
            review::stats(&visible, filter.book_id),
        )
    }

    /// Validate and store a new review. It stays hidden until approved.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::Invalid` with every field problem, or
    /// `ReviewError::Repository` if the insert fails.
    #[instrument(skip_all, fields(book_id = ?submission.book_id))]
    pub async fn submit(&self, submission: ReviewSubmission) -> Result<Review, ReviewError> {
        let new_review = submission.validate()?;
        let stored = ReviewRepository::new(&self.pool).insert(&new_review).await?;
        info!(review_id = %stored.id, "Review submitted for moderation");
        Ok(stored)
    }

    /// Approve a review, making it visible.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the review does not exist.
    #[instrument(skip(self))]
    pub async fn approve(&self, id: ReviewId) -> Result<(), RepositoryError> {
        ReviewRepository::new(&self.pool).approve(id).await?;
        self.invalidate().await;
        info!(review_id = %id, "Review approved");
        Ok(())
    }

    /// Delete a stored review. Curated reviews cannot be deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the review does not exist.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: ReviewId) -> Result<(), RepositoryError> {
        ReviewRepository::new(&self.pool).delete(id).await?;
        self.invalidate().await;
        info!(review_id = %id, "Review deleted");
        Ok(())
    }

    /// Drop the cached review set.
    pub async fn invalidate(&self) {
        self.cache.invalidate(&()).await;
    }
}

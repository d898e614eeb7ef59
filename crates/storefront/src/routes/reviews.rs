//! Review API.
//!
//! Listing is public and never fails: when Postgres is down the curated
//! reviews are served. Submission is rate limited and lands unapproved.
//! Moderation needs the admin token.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Serialize;
use tracing::instrument;

use lamplight_core::ReviewId;
use lamplight_core::review::{Review, ReviewFilter, ReviewStats, ReviewSubmission};

use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

/// Response for `GET /api/reviews`.
#[derive(Debug, Serialize)]
pub struct ReviewListResponse {
    pub reviews: Vec<Review>,
    pub stats: ReviewStats,
}

/// Response for a stored submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: &'static str,
    pub review: Review,
}

/// List visible reviews with statistics for the same book selection.
///
/// Query: `bookId` (`all` or an id), `minRating` (0 disables), `sortBy`
/// (`date`, `rating`, `helpful`), `order` (`asc`, `desc`).
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(filter): Query<ReviewFilter>,
) -> Json<ReviewListResponse> {
    let (reviews, stats) = state.reviews().listing(&filter).await;
    Json(ReviewListResponse { reviews, stats })
}

/// Submit a review for moderation.
#[instrument(skip(state, submission))]
pub async fn submit(
    State(state): State<AppState>,
    Json(submission): Json<ReviewSubmission>,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    let review = state.reviews().submit(submission).await?;

    add_breadcrumb(
        "review",
        "Review submitted",
        Some(&[("book_id", &review.book_id.to_string())]),
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            success: true,
            message: "Thank you! Your review will appear once it has been approved.",
            review,
        }),
    ))
}

/// Approve a review.
#[instrument(skip(state, _admin))]
pub async fn approve(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
) -> Result<StatusCode> {
    state.reviews().approve(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a review.
#[instrument(skip(state, _admin))]
pub async fn delete(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
) -> Result<StatusCode> {
    state.reviews().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

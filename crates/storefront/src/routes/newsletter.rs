//! Newsletter subscription route handlers.
//!
//! Subscribers are upserted by lowercased email, so signing up twice is
//! reported the same way as signing up once. When the database is
//! unreachable the signup is kept in the visitor's session and written on
//! their next successful signup.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use lamplight_core::Email;
use lamplight_core::newsletter::{Signup, SignupForm};

use crate::db::NewsletterRepository;
use crate::error::{AppError, Result};
use crate::models::session_keys;
use crate::services::SessionStorage;
use crate::state::AppState;

const SUBSCRIBED_MESSAGE: &str = "Thanks for subscribing! Watch your inbox for news from Miriam.";
const STORED_LOCALLY_MESSAGE: &str =
    "Thanks for subscribing! We saved your signup and will add you shortly.";

/// Response for a signup.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResponse {
    pub success: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stored_locally: bool,
}

/// Unsubscribe body.
#[derive(Debug, Deserialize)]
pub struct UnsubscribeForm {
    pub email: String,
}

/// Response for an unsubscribe.
#[derive(Debug, Serialize)]
pub struct UnsubscribeResponse {
    pub success: bool,
    pub message: &'static str,
}

/// Subscribe to the newsletter.
#[instrument(skip(state, session, form))]
pub async fn subscribe(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<SignupForm>,
) -> Result<Json<SubscribeResponse>> {
    let signup = form
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let repo = NewsletterRepository::new(state.pool());
    match repo.upsert(&signup).await {
        Ok(inserted) => {
            info!(new = inserted, source = signup.source.as_str(), "Newsletter signup");
            flush_pending(&repo, &session).await;
            Ok(Json(SubscribeResponse {
                success: true,
                message: SUBSCRIBED_MESSAGE,
                stored_locally: false,
            }))
        }
        Err(e) => {
            warn!(error = %e, "Newsletter signup not persisted, keeping it in the session");
            keep_pending(&session, signup).await?;
            Ok(Json(SubscribeResponse {
                success: true,
                message: STORED_LOCALLY_MESSAGE,
                stored_locally: true,
            }))
        }
    }
}

/// Queue a signup in the session, once per email.
async fn keep_pending<S: SessionStorage>(session: &S, signup: Signup) -> Result<()> {
    let mut pending: Vec<Signup> = session
        .load(session_keys::PENDING_NEWSLETTER)
        .await?
        .unwrap_or_default();
    if !pending.iter().any(|p| p.email == signup.email) {
        pending.push(signup);
    }
    session
        .store(session_keys::PENDING_NEWSLETTER, &pending)
        .await?;
    Ok(())
}

/// Write signups captured during an earlier outage. Best effort: anything
/// that still fails stays in the session.
async fn flush_pending<S: SessionStorage>(repo: &NewsletterRepository<'_>, session: &S) {
    let pending: Vec<Signup> = match session.load(session_keys::PENDING_NEWSLETTER).await {
        Ok(Some(pending)) => pending,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %e, "Could not read pending newsletter signups");
            return;
        }
    };

    let mut remaining = Vec::new();
    for signup in pending {
        if let Err(e) = repo.upsert(&signup).await {
            warn!(error = %e, "Pending newsletter signup still not persisted");
            remaining.push(signup);
        }
    }

    let result = if remaining.is_empty() {
        session.remove(session_keys::PENDING_NEWSLETTER).await
    } else {
        session
            .store(session_keys::PENDING_NEWSLETTER, &remaining)
            .await
    };
    if let Err(e) = result {
        warn!(error = %e, "Could not update pending newsletter signups");
    }
}

/// Unsubscribe an email. Unknown addresses get the same answer.
#[instrument(skip(state, form))]
pub async fn unsubscribe(
    State(state): State<AppState>,
    Json(form): Json<UnsubscribeForm>,
) -> Result<Json<UnsubscribeResponse>> {
    let email = Email::parse_normalized(&form.email)
        .map_err(|_| AppError::BadRequest("please enter a valid email address".to_string()))?;

    let changed = NewsletterRepository::new(state.pool())
        .unsubscribe(&email)
        .await?;
    info!(changed, "Newsletter unsubscribe");

    Ok(Json(UnsubscribeResponse {
        success: true,
        message: "You have been unsubscribed.",
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use sqlx::postgres::PgPoolOptions;

    use super::*;
    use crate::services::storage::MemoryStorage;

    fn signup(email: &str) -> Signup {
        SignupForm {
            email: email.to_string(),
            name: None,
            source: None,
        }
        .validate()
        .unwrap()
    }

    async fn pending(storage: &MemoryStorage) -> Vec<Signup> {
        storage
            .load(session_keys::PENDING_NEWSLETTER)
            .await
            .unwrap()
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_same_email_is_queued_once() {
        let storage = MemoryStorage::default();

        keep_pending(&storage, signup("TEST@EXAMPLE.COM")).await.unwrap();
        keep_pending(&storage, signup("test@example.com")).await.unwrap();
        keep_pending(&storage, signup("other@example.com")).await.unwrap();

        let queued = pending(&storage).await;
        assert_eq!(queued.len(), 2);
        assert_eq!(queued.first().map(|s| s.email.as_str()), Some("test@example.com"));
    }

    #[tokio::test]
    async fn test_flush_keeps_signups_that_still_fail() {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://lamplight@127.0.0.1:1/lamplight")
            .unwrap();
        let repo = NewsletterRepository::new(&pool);
        let storage = MemoryStorage::default();
        keep_pending(&storage, signup("ruth@example.com")).await.unwrap();
        keep_pending(&storage, signup("naomi@example.com")).await.unwrap();

        flush_pending(&repo, &storage).await;

        let queued = pending(&storage).await;
        assert_eq!(queued, vec![signup("ruth@example.com"), signup("naomi@example.com")]);
    }

    #[tokio::test]
    async fn test_flush_without_pending_signups_is_a_no_op() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://lamplight@127.0.0.1:1/lamplight")
            .unwrap();
        let storage = MemoryStorage::default();

        flush_pending(&NewsletterRepository::new(&pool), &storage).await;

        assert!(!storage.contains(session_keys::PENDING_NEWSLETTER));
    }
}

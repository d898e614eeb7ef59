//! Stripe webhook endpoint.
//!
//! The raw body is verified against the `Stripe-Signature` header before it
//! is parsed. Failing to apply a verified event returns a 5xx so Stripe
//! redelivers it.

use axum::{Json, extract::State, http::HeaderMap};
use serde_json::{Value, json};
use tracing::{instrument, warn};

use crate::error::{AppError, Result};
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Receive a Stripe event.
#[instrument(skip_all)]
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("missing Stripe-Signature header".to_string()))?;

    let event = state.stripe().verify_webhook(&body, signature).map_err(|e| {
        warn!(error = %e, "Rejected webhook");
        AppError::BadRequest("invalid webhook signature".to_string())
    })?;

    state.checkout().handle_webhook(&event).await?;

    Ok(Json(json!({ "received": true })))
}

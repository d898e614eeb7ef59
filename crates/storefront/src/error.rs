//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lamplight_core::review::ReviewValidationError;
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{CartError, CheckoutError, ReviewError, StorageError, StripeError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Stripe API operation failed.
    #[error("Payment error: {0}")]
    Payment(#[from] StripeError),

    /// Checkout could not proceed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Session storage failed.
    #[error("Session error: {0}")]
    Session(#[from] StorageError),

    /// Submitted form has invalid fields.
    #[error("Validation error: {0}")]
    Validation(#[from] ReviewValidationError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::UnknownBook(id) => Self::NotFound(format!("book {id}")),
            CartError::Storage(e) => Self::Session(e),
        }
    }
}

impl From<ReviewError> for AppError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::Invalid(e) => Self::Validation(e),
            ReviewError::Repository(e) => Self::Database(e),
        }
    }
}

/// Body of a 400 response for a form with invalid fields.
#[derive(Debug, Serialize)]
struct ValidationBody {
    error: &'static str,
    fields: BTreeMap<&'static str, String>,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Database(RepositoryError::NotFound)
            | Self::NotFound(_)
            | Self::Checkout(CheckoutError::UnknownPaymentIntent) => StatusCode::NOT_FOUND,
            Self::Database(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Database(_)
            | Self::Session(_)
            | Self::Checkout(
                CheckoutError::Amount(_) | CheckoutError::Repository(_) | CheckoutError::Session(_),
            ) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Payment(_) | Self::Checkout(CheckoutError::Payment(_)) => StatusCode::BAD_GATEWAY,
            Self::Validation(_) | Self::BadRequest(_) | Self::Checkout(CheckoutError::Invalid(_)) => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        if let Self::Validation(ReviewValidationError(errors)) = &self {
            let fields = errors
                .iter()
                .map(|e| (e.field(), e.to_string()))
                .collect();
            let body = ValidationBody {
                error: "Please correct the highlighted fields",
                fields,
            };
            return (status, Json(body)).into_response();
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Database(RepositoryError::NotFound) => "Not found".to_string(),
            Self::Payment(_) | Self::Checkout(CheckoutError::Payment(_)) => {
                "Payment service unavailable, please try again".to_string()
            }
            Self::Checkout(CheckoutError::Invalid(e)) => e.to_string(),
            Self::Checkout(CheckoutError::UnknownPaymentIntent) => {
                "No checkout in progress for this payment".to_string()
            }
            _ if status.is_server_error() => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added to cart", Some(&[("book_id", "1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

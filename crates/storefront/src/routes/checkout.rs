//! Checkout route handlers.
//!
//! The browser asks for a payment handle, mounts Stripe Elements with it,
//! confirms the card client-side and then calls back here. Totals are always
//! computed on the server from the catalog.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use lamplight_core::checkout::{CheckoutOutcome, CheckoutRequest, OrderReceipt};

use crate::error::{Result, add_breadcrumb};
use crate::filters;
use crate::services::{CartStore, PaymentHandle};
use crate::state::AppState;

/// Response for `POST /api/create-payment-intent`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    #[serde(flatten)]
    pub handle: PaymentHandle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publishable_key: Option<String>,
}

/// Body of `POST /api/checkout/confirm`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub payment_intent_id: String,
}

/// Response for `POST /api/cart/recover`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverResponse {
    pub recovered: bool,
    pub item_count: u64,
}

/// Price the cart and create a payment intent for it.
#[instrument(skip(state, session, request))]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<PaymentIntentResponse>> {
    let cart = CartStore::new(session);
    let handle = state.checkout().begin(&cart, request).await?;

    add_breadcrumb(
        "checkout",
        "Payment intent created",
        Some(&[("order_id", &handle.order_id.to_string())]),
    );

    Ok(Json(PaymentIntentResponse {
        handle,
        publishable_key: state.config().stripe.publishable_key.clone(),
    }))
}

/// HTTP status for a confirmation outcome.
const fn outcome_status(outcome: &CheckoutOutcome) -> StatusCode {
    match outcome {
        CheckoutOutcome::PaymentFailed { .. } => StatusCode::PAYMENT_REQUIRED,
        CheckoutOutcome::Retry { .. } => StatusCode::BAD_GATEWAY,
        CheckoutOutcome::Succeeded { .. }
        | CheckoutOutcome::RequiresAction { .. }
        | CheckoutOutcome::Processing => StatusCode::OK,
    }
}

/// Confirm a payment the browser has submitted to Stripe.
///
/// Declines come back as `402` with the card message; the cart is kept so
/// the visitor can try another card.
#[instrument(skip(state, session))]
pub async fn confirm(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<ConfirmRequest>,
) -> Result<Response> {
    let cart = CartStore::new(session);
    let outcome = state
        .checkout()
        .confirm(&cart, &body.payment_intent_id)
        .await?;

    if outcome.clears_cart() {
        add_breadcrumb("checkout", "Payment confirmed", None);
    }

    Ok((outcome_status(&outcome), Json(outcome)).into_response())
}

/// Restore cart lines saved when checkout started.
#[instrument(skip(session))]
pub async fn recover(session: Session) -> Result<Json<RecoverResponse>> {
    let store = CartStore::new(session);
    let response = match store.recover().await? {
        Some(cart) => RecoverResponse {
            recovered: true,
            item_count: cart.total_items(),
        },
        None => RecoverResponse {
            recovered: false,
            item_count: store.load().await?.total_items(),
        },
    };
    Ok(Json(response))
}

/// Order line display data for the success page.
pub struct ReceiptLineView {
    pub title: String,
    pub quantity: u32,
    pub line_price: String,
}

/// Receipt display data for the success page.
pub struct ReceiptView {
    pub order_id: String,
    pub email: String,
    pub items: Vec<ReceiptLineView>,
    pub subtotal: String,
    pub shipping: String,
    pub tax: String,
    pub total: String,
}

impl From<&OrderReceipt> for ReceiptView {
    fn from(receipt: &OrderReceipt) -> Self {
        Self {
            order_id: receipt.order_id.to_string(),
            email: receipt.email.clone(),
            items: receipt
                .items
                .iter()
                .map(|line| ReceiptLineView {
                    title: line.title.clone(),
                    quantity: line.quantity,
                    line_price: line.line_total().to_string(),
                })
                .collect(),
            subtotal: receipt.summary.subtotal.to_string(),
            shipping: receipt.summary.shipping.to_string(),
            tax: receipt.summary.tax.to_string(),
            total: receipt.summary.total.to_string(),
        }
    }
}

/// Checkout success page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/success.html")]
pub struct CheckoutSuccessTemplate {
    pub order: ReceiptView,
}

/// Show the most recent order, or send the visitor back to the cart.
#[instrument(skip(session))]
pub async fn success(session: Session) -> Result<Response> {
    let receipt = CartStore::new(session).last_order().await?;
    Ok(match receipt {
        Some(receipt) => CheckoutSuccessTemplate {
            order: ReceiptView::from(&receipt),
        }
        .into_response(),
        None => Redirect::to("/cart").into_response(),
    })
}

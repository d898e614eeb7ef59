//! Checkout request validation and payment outcome mapping.
//!
//! The browser sends `{book_id, quantity}` lines and an email. Prices and
//! totals are always recomputed here from the catalog; anything the client
//! computed is advisory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cart::{Cart, CartLine};
use crate::catalog;
use crate::pricing::OrderSummary;
use crate::types::{BookId, OrderId, Price};

/// Most copies of a single book accepted in one order.
pub const MAX_COPIES_PER_LINE: u32 = 99;

/// Postal address collected by the payment form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
}

/// Body of `POST /api/create-payment-intent`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default, alias = "cartItems")]
    pub items: Vec<CartLine>,
    #[serde(default, alias = "customerEmail")]
    pub email: String,
    #[serde(default, alias = "customerName")]
    pub name: Option<String>,
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub billing_address: Option<Address>,
}

/// Why a checkout request was rejected before contacting the payment provider.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckoutValidationError {
    #[error("your cart is empty")]
    EmptyCart,
    #[error("an email address is required")]
    MissingEmail,
    #[error("book {0} is not available")]
    UnknownBook(BookId),
    #[error("at most {max} copies of a book per order")]
    TooManyCopies { max: u32 },
}

/// One order line priced at checkout time.
///
/// The unit price is captured so past orders are unaffected by later
/// catalog changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub book_id: BookId,
    pub title: String,
    pub quantity: u32,
    pub price: Price,
}

impl OrderLine {
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price * self.quantity
    }
}

/// A validated order ready to be persisted as `pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub items: Vec<OrderLine>,
    pub summary: OrderSummary,
}

impl CheckoutRequest {
    /// Validate the request and price it from the catalog.
    ///
    /// Duplicate lines for the same book are merged and zero quantities
    /// dropped, the same way the cart treats them.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn price(self) -> Result<OrderDraft, CheckoutValidationError> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err(CheckoutValidationError::MissingEmail);
        }

        let mut cart = Cart::new();
        for line in self.items.iter().filter(|line| line.quantity > 0) {
            let book = catalog::find(line.book_id)
                .ok_or(CheckoutValidationError::UnknownBook(line.book_id))?;
            cart.add(book, line.quantity);
        }
        if cart.is_empty() {
            return Err(CheckoutValidationError::EmptyCart);
        }
        if cart
            .items()
            .iter()
            .any(|item| item.quantity > MAX_COPIES_PER_LINE)
        {
            return Err(CheckoutValidationError::TooManyCopies {
                max: MAX_COPIES_PER_LINE,
            });
        }

        let items = cart
            .items()
            .iter()
            .map(|item| OrderLine {
                book_id: item.book.id,
                title: item.book.title.clone(),
                quantity: item.quantity,
                price: item.book.price,
            })
            .collect();

        Ok(OrderDraft {
            customer_email: email.to_lowercase(),
            customer_name: self
                .name
                .map(|n| n.trim().to_owned())
                .filter(|n| !n.is_empty()),
            shipping_address: self.shipping_address,
            billing_address: self.billing_address,
            items,
            summary: cart.summary(),
        })
    }
}

// =============================================================================
// Payment outcome
// =============================================================================

/// PaymentIntent status as reported by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

/// Category of a payment error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorKind {
    /// Declined, expired or otherwise refused card.
    CardError,
    /// Bad input in the payment form.
    ValidationError,
    /// Anything else (API, rate limit, idempotency errors).
    #[serde(other)]
    Other,
}

/// The payment provider's last error for an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailure {
    pub kind: PaymentErrorKind,
    pub message: Option<String>,
}

/// What the provider reported for a confirmation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentAttempt {
    pub payment_intent_id: String,
    pub status: PaymentStatus,
    pub last_error: Option<PaymentFailure>,
    /// Redirect for 3-D Secure and similar flows.
    pub redirect_url: Option<String>,
}

/// Message shown when the cause of a failure should not be exposed.
pub const GENERIC_RETRY_MESSAGE: &str =
    "Something went wrong while processing your payment. Please try again.";

const DEFAULT_DECLINE_MESSAGE: &str = "Your payment could not be completed.";

/// Result of a checkout confirmation, as returned to the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    /// Paid. The cart is cleared and the order completed.
    Succeeded {
        #[serde(rename = "orderId")]
        order_id: OrderId,
        #[serde(rename = "paymentIntentId")]
        payment_intent_id: String,
    },
    /// The provider refused the payment. The cart is kept.
    PaymentFailed {
        kind: PaymentErrorKind,
        message: String,
    },
    /// The provider needs the customer to complete an extra step.
    RequiresAction {
        #[serde(rename = "redirectUrl")]
        redirect_url: Option<String>,
    },
    /// Payment is in flight; the webhook will settle the order.
    Processing,
    /// Transport or unexpected failure. The cart is kept.
    Retry { message: String },
}

impl CheckoutOutcome {
    /// Map a provider-reported attempt to an outcome.
    #[must_use]
    pub fn from_attempt(order_id: OrderId, attempt: PaymentAttempt) -> Self {
        match attempt.status {
            PaymentStatus::Succeeded => Self::Succeeded {
                order_id,
                payment_intent_id: attempt.payment_intent_id,
            },
            PaymentStatus::RequiresAction => Self::RequiresAction {
                redirect_url: attempt.redirect_url,
            },
            PaymentStatus::Processing | PaymentStatus::RequiresCapture => Self::Processing,
            PaymentStatus::RequiresPaymentMethod => match attempt.last_error {
                Some(PaymentFailure {
                    kind: kind @ (PaymentErrorKind::CardError | PaymentErrorKind::ValidationError),
                    message,
                }) => Self::PaymentFailed {
                    kind,
                    message: message.unwrap_or_else(|| DEFAULT_DECLINE_MESSAGE.to_owned()),
                },
                _ => Self::retry(),
            },
            PaymentStatus::RequiresConfirmation
            | PaymentStatus::Canceled
            | PaymentStatus::Unknown => Self::retry(),
        }
    }

    /// Generic retry outcome for transport errors.
    #[must_use]
    pub fn retry() -> Self {
        Self::Retry {
            message: GENERIC_RETRY_MESSAGE.to_owned(),
        }
    }

    /// Only a successful payment clears the cart.
    #[must_use]
    pub const fn clears_cart(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Record of the visitor's most recent completed order, kept in the session
/// for the success page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    pub order_id: OrderId,
    pub payment_intent_id: String,
    pub email: String,
    pub items: Vec<OrderLine>,
    pub summary: OrderSummary,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn line(id: i32, quantity: u32) -> CartLine {
        CartLine {
            book_id: BookId::new(id),
            quantity,
        }
    }

    fn request(items: Vec<CartLine>) -> CheckoutRequest {
        CheckoutRequest {
            items,
            email: " Reader@Example.com ".to_string(),
            ..CheckoutRequest::default()
        }
    }

    fn attempt(status: PaymentStatus, last_error: Option<PaymentFailure>) -> PaymentAttempt {
        PaymentAttempt {
            payment_intent_id: "pi_123".to_string(),
            status,
            last_error,
            redirect_url: None,
        }
    }

    #[test]
    fn test_price_recomputes_from_catalog() {
        let draft = request(vec![line(1, 2)]).price().unwrap();
        assert_eq!(draft.customer_email, "reader@example.com");
        assert_eq!(draft.items.len(), 1);
        assert_eq!(draft.items[0].price, Price::from_cents(1299));
        assert_eq!(draft.summary.subtotal, Price::from_cents(2598));
        assert_eq!(draft.summary.total, Price::from_cents(3305));
    }

    #[test]
    fn test_price_merges_duplicate_lines_and_drops_zero() {
        let draft = request(vec![line(1, 1), line(2, 0), line(1, 2)])
            .price()
            .unwrap();
        assert_eq!(draft.items.len(), 1);
        assert_eq!(draft.items[0].quantity, 3);
    }

    #[test]
    fn test_price_rejects_empty_cart() {
        assert_eq!(
            request(vec![]).price(),
            Err(CheckoutValidationError::EmptyCart)
        );
        assert_eq!(
            request(vec![line(1, 0)]).price(),
            Err(CheckoutValidationError::EmptyCart)
        );
    }

    #[test]
    fn test_price_rejects_blank_email() {
        let req = CheckoutRequest {
            email: "   ".to_string(),
            ..request(vec![line(1, 1)])
        };
        assert_eq!(req.price(), Err(CheckoutValidationError::MissingEmail));
    }

    #[test]
    fn test_price_rejects_unknown_book() {
        assert_eq!(
            request(vec![line(42, 1)]).price(),
            Err(CheckoutValidationError::UnknownBook(BookId::new(42)))
        );
    }

    #[test]
    fn test_price_rejects_excessive_quantity() {
        assert!(matches!(
            request(vec![line(1, 60), line(1, 60)]).price(),
            Err(CheckoutValidationError::TooManyCopies { .. })
        ));
    }

    #[test]
    fn test_request_accepts_legacy_field_names() {
        let req: CheckoutRequest = serde_json::from_value(serde_json::json!({
            "cartItems": [{"bookId": 2, "quantity": 1}],
            "customerEmail": "a@b.co"
        }))
        .unwrap();
        assert_eq!(req.items, vec![line(2, 1)]);
        assert_eq!(req.email, "a@b.co");
    }

    #[test]
    fn test_succeeded_clears_cart() {
        let outcome =
            CheckoutOutcome::from_attempt(OrderId::new(7), attempt(PaymentStatus::Succeeded, None));
        assert!(outcome.clears_cart());
        assert_eq!(
            outcome,
            CheckoutOutcome::Succeeded {
                order_id: OrderId::new(7),
                payment_intent_id: "pi_123".to_string()
            }
        );
    }

    #[test]
    fn test_card_error_keeps_cart_and_surfaces_message() {
        let failure = PaymentFailure {
            kind: PaymentErrorKind::CardError,
            message: Some("Your card was declined.".to_string()),
        };
        let outcome = CheckoutOutcome::from_attempt(
            OrderId::new(7),
            attempt(PaymentStatus::RequiresPaymentMethod, Some(failure)),
        );
        assert!(!outcome.clears_cart());
        assert_eq!(
            outcome,
            CheckoutOutcome::PaymentFailed {
                kind: PaymentErrorKind::CardError,
                message: "Your card was declined.".to_string()
            }
        );
    }

    #[test]
    fn test_other_errors_become_generic_retry() {
        let failure = PaymentFailure {
            kind: PaymentErrorKind::Other,
            message: Some("internal detail".to_string()),
        };
        let outcome = CheckoutOutcome::from_attempt(
            OrderId::new(7),
            attempt(PaymentStatus::RequiresPaymentMethod, Some(failure)),
        );
        assert_eq!(outcome, CheckoutOutcome::retry());
        assert!(!outcome.clears_cart());
    }

    #[test]
    fn test_requires_action_passes_redirect() {
        let mut a = attempt(PaymentStatus::RequiresAction, None);
        a.redirect_url = Some("https://hooks.stripe.com/3ds".to_string());
        let outcome = CheckoutOutcome::from_attempt(OrderId::new(1), a);
        assert_eq!(
            outcome,
            CheckoutOutcome::RequiresAction {
                redirect_url: Some("https://hooks.stripe.com/3ds".to_string())
            }
        );
    }

    #[test]
    fn test_unknown_status_deserializes() {
        let status: PaymentStatus = serde_json::from_str("\"something_new\"").unwrap();
        assert_eq!(status, PaymentStatus::Unknown);
        let kind: PaymentErrorKind = serde_json::from_str("\"api_error\"").unwrap();
        assert_eq!(kind, PaymentErrorKind::Other);
    }

    #[test]
    fn test_outcome_json_is_tagged() {
        let json = serde_json::to_value(CheckoutOutcome::retry()).unwrap();
        assert_eq!(json["status"], "retry");
        assert_eq!(json["message"], GENERIC_RETRY_MESSAGE);
    }
}

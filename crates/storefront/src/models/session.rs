//! Session-related types.
//!
//! Everything per-visitor (cart, checkout progress, bookmarks) lives in the
//! visitor's session, so no cross-request locking is needed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lamplight_core::checkout::OrderLine;
use lamplight_core::{OrderId, OrderSummary};

/// A checkout that has a payment handle but is not yet settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCheckout {
    pub order_id: OrderId,
    pub payment_intent_id: String,
    pub email: String,
    pub items: Vec<OrderLine>,
    pub summary: OrderSummary,
}

/// Reading progress for one book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub page: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Session keys.
pub mod session_keys {
    use lamplight_core::BookId;

    /// Cart lines (`{book_id, quantity}`), rebuilt against the catalog on load.
    pub const CART: &str = "cart";

    /// Copy of the cart taken when a payment handle is issued.
    pub const CART_BACKUP: &str = "cart_backup";

    /// Receipt of the most recent completed order.
    pub const LAST_ORDER: &str = "last_order";

    /// Checkout awaiting payment confirmation.
    pub const PENDING_CHECKOUT: &str = "pending_checkout";

    /// Newsletter signups captured while the database was unreachable.
    pub const PENDING_NEWSLETTER: &str = "pending_newsletter";

    /// Key for a book's reading-progress bookmark.
    #[must_use]
    pub fn bookmark(book_id: BookId) -> String {
        format!("bookmark:{book_id}")
    }
}

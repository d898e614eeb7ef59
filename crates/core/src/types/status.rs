//! Status enums for orders and payments.

use serde::{Deserialize, Serialize};

/// Lifecycle of an order.
///
/// Orders are written as `Pending` when a payment handle is requested and
/// only move on when the payment provider reports a final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl OrderStatus {
    /// Whether moving from `self` to `next` is allowed.
    ///
    /// Only pending orders change state; completed and failed are final.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed | Self::Failed)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Where a newsletter signup came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SignupSource {
    #[default]
    Footer,
    Homepage,
    BookPage,
    Checkout,
}

impl SignupSource {
    /// Stable string stored in the `source` column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Footer => "footer",
            Self::Homepage => "homepage",
            Self::BookPage => "book_page",
            Self::Checkout => "checkout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Completed));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Failed));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Failed.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn test_order_status_display() {
        assert_eq!(OrderStatus::Completed.to_string(), "completed");
    }

    #[test]
    fn test_signup_source_serde() {
        let source: SignupSource = serde_json::from_str("\"book_page\"").unwrap_or_default();
        assert_eq!(source, SignupSource::BookPage);
        assert_eq!(source.as_str(), "book_page");
    }
}

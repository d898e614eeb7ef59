//! Shipping, tax and total derivation.
//!
//! Everything here is a pure function of the cart subtotal. Nothing is
//! cached: callers derive a fresh [`OrderSummary`] whenever the cart
//! changes, and checkout derives its own from catalog prices on the server.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::Price;

/// Subtotals strictly above this ship free.
pub const FREE_SHIPPING_THRESHOLD: Price = Price::from_cents(5000);

/// Flat shipping fee below the threshold.
pub const FLAT_SHIPPING: Price = Price::from_cents(499);

/// Sales tax rate (8%).
pub const TAX_RATE: Decimal = Decimal::from_parts(8, 0, 0, false, 2);

/// Shipping for a subtotal: free above $50.00, $4.99 otherwise.
///
/// The threshold is exclusive, so exactly $50.00 still pays shipping.
#[must_use]
pub fn shipping_for(subtotal: Price) -> Price {
    if subtotal > FREE_SHIPPING_THRESHOLD {
        Price::ZERO
    } else {
        FLAT_SHIPPING
    }
}

/// Tax for a subtotal, rounded to cents.
#[must_use]
pub fn tax_for(subtotal: Price) -> Price {
    subtotal.percentage(TAX_RATE)
}

/// Breakdown of what the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub subtotal: Price,
    pub shipping: Price,
    pub tax: Price,
    pub total: Price,
}

impl OrderSummary {
    /// Derive shipping, tax and total from a subtotal.
    #[must_use]
    pub fn from_subtotal(subtotal: Price) -> Self {
        let shipping = shipping_for(subtotal);
        let tax = tax_for(subtotal);
        Self {
            subtotal,
            shipping,
            tax,
            total: subtotal + shipping + tax,
        }
    }

    /// Whether the order qualifies for free shipping.
    #[must_use]
    pub fn ships_free(&self) -> bool {
        self.shipping.is_zero()
    }
}

//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `storage` - Per-visitor key-value storage over the session
//! - `cart` - Cart persistence, checkout backup and receipts
//! - `checkout` - Order pricing, payment handles and settlement
//! - `stripe` - Stripe REST client and webhook verification
//! - `reviews` - Cached review listing, submission and moderation

pub mod cart;
pub mod checkout;
pub mod reviews;
pub mod storage;
pub mod stripe;

pub use cart::{CartError, CartStore};
pub use checkout::{CheckoutError, CheckoutService, PaymentHandle};
pub use reviews::{ReviewError, ReviewService};
pub use storage::{SessionStorage, StorageError};
pub use stripe::{StripeClient, StripeError};

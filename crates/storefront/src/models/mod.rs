//! Session-stored models for storefront visitors.

pub mod session;

pub use session::{Bookmark, PendingCheckout, session_keys};

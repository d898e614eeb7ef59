//! Lamplight Core - Shared types and storefront logic.
//!
//! This crate provides the domain types and pure logic used across all
//! Lamplight Books components:
//! - `storefront` - Public-facing book shop and JSON API
//! - `cli` - Command-line tools for migrations and catalog seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients. Anything that needs to talk to the
//! outside world lives in the storefront crate and calls into this one.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, emails, and statuses
//! - [`catalog`] - The author's books, compiled in
//! - [`cart`] - Cart aggregate (add/update/remove/clear/totals)
//! - [`pricing`] - Shipping, tax and grand total derivation
//! - [`checkout`] - Checkout request validation and payment outcome mapping
//! - [`review`] - Review submission, filtering, sorting and statistics
//! - [`newsletter`] - Newsletter signup validation
//! - [`html`] - Escaping of user-supplied free text

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod html;
pub mod newsletter;
pub mod pricing;
pub mod review;
pub mod types;

pub use cart::{Cart, CartItem};
pub use catalog::Book;
pub use pricing::OrderSummary;
pub use types::*;

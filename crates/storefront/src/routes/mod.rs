//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! # Books (JSON)
//! GET    /api/books                   - Catalog in display order
//! GET    /api/books/featured          - Featured books
//! GET    /api/books/{id}              - One book
//! GET    /api/books/{id}/bookmark     - Reading position (session)
//! PUT    /api/books/{id}/bookmark     - Save reading position (session)
//!
//! # Reviews (JSON)
//! GET    /api/reviews                 - Filtered reviews with stats
//! POST   /api/reviews                 - Submit a review (rate limited)
//! DELETE /api/reviews/{id}            - Delete a review (admin)
//! POST   /api/reviews/{id}/approve    - Approve a review (admin)
//!
//! # Newsletter (JSON)
//! POST   /api/newsletter              - Subscribe (rate limited)
//! POST   /api/newsletter/unsubscribe  - Unsubscribe
//!
//! # Checkout (JSON)
//! POST   /api/create-payment-intent   - Price cart, get payment handle (rate limited)
//! POST   /api/checkout/confirm        - Settle after client-side confirmation
//! POST   /api/cart/recover            - Restore cart from checkout backup
//! POST   /api/webhooks/stripe         - Signed Stripe events
//!
//! # Cart (HTMX fragments)
//! GET    /cart                        - Cart page
//! POST   /cart/add                    - Add to cart (returns count badge, triggers cart-updated)
//! POST   /cart/update                 - Update quantity (returns cart_items fragment)
//! POST   /cart/remove                 - Remove item (returns cart_items fragment)
//! POST   /cart/clear                  - Empty the cart (returns cart_items fragment)
//! GET    /cart/count                  - Cart count badge (fragment)
//!
//! # Checkout pages
//! GET    /checkout/success            - Receipt for the last order
//! ```

pub mod books;
pub mod cart;
pub mod checkout;
pub mod newsletter;
pub mod reviews;
pub mod webhooks;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::middleware::{api_rate_limiter, submission_rate_limiter};
use crate::state::AppState;

/// Create the book routes router.
pub fn book_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(books::index))
        .route("/featured", get(books::featured))
        .route("/{id}", get(books::show))
        .route(
            "/{id}/bookmark",
            get(books::bookmark).put(books::save_bookmark),
        )
}

/// Create the review routes router.
pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(reviews::index).merge(post(reviews::submit).layer(submission_rate_limiter())),
        )
        .route("/{id}", delete(reviews::delete))
        .route("/{id}/approve", post(reviews::approve))
}

/// Create the newsletter routes router.
pub fn newsletter_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(newsletter::subscribe).layer(submission_rate_limiter()),
        )
        .route("/unsubscribe", post(newsletter::unsubscribe))
}

/// Create the JSON API router. Stripe webhooks are left out of the IP
/// rate limit.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/books", book_routes())
        .nest("/reviews", review_routes())
        .nest("/newsletter", newsletter_routes())
        .route(
            "/create-payment-intent",
            post(checkout::create_payment_intent).layer(submission_rate_limiter()),
        )
        .route("/checkout/confirm", post(checkout::confirm))
        .route("/cart/recover", post(checkout::recover))
        .route_layer(api_rate_limiter())
        .route("/webhooks/stripe", post(webhooks::stripe))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
        .route("/count", get(cart::count))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        // JSON API
        .nest("/api", api_routes())
        // Cart routes
        .nest("/cart", cart_routes())
        // Checkout pages
        .route("/checkout/success", get(checkout::success))
}

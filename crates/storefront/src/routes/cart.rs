//! Cart route handlers.
//!
//! Cart operations use HTMX for dynamic updates without full page reloads.
//! The cart itself lives in the visitor's session as `{book_id, quantity}`
//! lines and is re-priced from the catalog on every request.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    response::{AppendHeaders, IntoResponse, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use lamplight_core::{BookId, Cart, CartItem};

use crate::error::{Result, add_breadcrumb};
use crate::filters;
use crate::services::CartStore;

/// HTMX event fired whenever the cart changes.
const CART_UPDATED: (&str, &str) = ("HX-Trigger", "cart-updated");

/// Cart line display data for templates.
#[derive(Clone)]
pub struct CartItemView {
    pub book_id: BookId,
    pub title: String,
    pub author: String,
    pub image: String,
    pub quantity: u32,
    pub price: String,
    pub line_price: String,
}

impl From<&CartItem> for CartItemView {
    fn from(item: &CartItem) -> Self {
        Self {
            book_id: item.book.id,
            title: item.book.title.clone(),
            author: item.book.author.clone(),
            image: item.book.image.clone(),
            quantity: item.quantity,
            price: item.book.price.to_string(),
            line_price: item.line_total().to_string(),
        }
    }
}

/// Cart display data for templates.
#[derive(Clone)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub item_count: u64,
    pub subtotal: String,
    pub shipping: String,
    pub tax: String,
    pub total: String,
    pub ships_free: bool,
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        let summary = cart.summary();
        Self {
            items: cart.items().iter().map(CartItemView::from).collect(),
            item_count: cart.total_items(),
            subtotal: summary.subtotal.to_string(),
            shipping: summary.shipping.to_string(),
            tax: summary.tax.to_string(),
            total: summary.total.to_string(),
            ships_free: summary.ships_free(),
        }
    }
}

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub book_id: BookId,
    pub quantity: Option<u32>,
}

/// Update cart form data. Zero or less removes the line.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub book_id: BookId,
    pub quantity: i64,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub book_id: BookId,
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub cart: CartView,
}

/// Cart items fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_items.html")]
pub struct CartItemsTemplate {
    pub cart: CartView,
}

/// Cart count badge fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub count: u64,
}

fn items_fragment(cart: &Cart) -> Response {
    (
        AppendHeaders([CART_UPDATED]),
        CartItemsTemplate {
            cart: CartView::from(cart),
        },
    )
        .into_response()
}

/// Display cart page.
#[instrument(skip(session))]
pub async fn show(session: Session) -> Result<CartShowTemplate> {
    let cart = CartStore::new(session).load().await?;
    Ok(CartShowTemplate {
        cart: CartView::from(&cart),
    })
}

/// Add a book to the cart (HTMX).
///
/// Returns the new count badge and triggers `cart-updated`.
#[instrument(skip(session))]
pub async fn add(session: Session, Form(form): Form<AddToCartForm>) -> Result<Response> {
    let cart = CartStore::new(session)
        .add(form.book_id, form.quantity.unwrap_or(1))
        .await?;

    add_breadcrumb(
        "cart",
        "Added to cart",
        Some(&[("book_id", &form.book_id.to_string())]),
    );

    Ok((
        AppendHeaders([CART_UPDATED]),
        CartCountTemplate {
            count: cart.total_items(),
        },
    )
        .into_response())
}

/// Update a line's quantity (HTMX).
#[instrument(skip(session))]
pub async fn update(session: Session, Form(form): Form<UpdateCartForm>) -> Result<Response> {
    let cart = CartStore::new(session)
        .update_quantity(form.book_id, form.quantity)
        .await?;
    Ok(items_fragment(&cart))
}

/// Remove a line (HTMX).
#[instrument(skip(session))]
pub async fn remove(session: Session, Form(form): Form<RemoveFromCartForm>) -> Result<Response> {
    let cart = CartStore::new(session).remove(form.book_id).await?;
    Ok(items_fragment(&cart))
}

/// Empty the cart (HTMX).
#[instrument(skip(session))]
pub async fn clear(session: Session) -> Result<Response> {
    CartStore::new(session).clear().await?;
    Ok(items_fragment(&Cart::new()))
}

/// Cart count badge (HTMX).
#[instrument(skip(session))]
pub async fn count(session: Session) -> Result<CartCountTemplate> {
    let cart = CartStore::new(session).load().await?;
    Ok(CartCountTemplate {
        count: cart.total_items(),
    })
}

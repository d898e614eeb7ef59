//! Shopping cart aggregate.
//!
//! A [`Cart`] is an ordered list of [`CartItem`]s with two invariants:
//!
//! - no two items share a `book.id`
//! - every item has `quantity >= 1` (zero-quantity items are removed)
//!
//! Both hold for every sequence of public operations and for any cart
//! deserialized from storage, since deserialization rebuilds the cart
//! through [`Cart::add`].

use serde::{Deserialize, Serialize};

use crate::catalog::Book;
use crate::pricing::OrderSummary;
use crate::types::{BookId, Price};

/// A book and how many copies of it are in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub book: Book,
    pub quantity: u32,
}

impl CartItem {
    /// `price * quantity` for this line.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.book.price * self.quantity
    }
}

/// A `{book_id, quantity}` pair, as sent to checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub book_id: BookId,
    pub quantity: u32,
}

/// The shopping cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredCart")]
pub struct Cart {
    items: Vec<CartItem>,
}

/// Untrusted shape of a cart read back from storage.
#[derive(Deserialize)]
struct StoredCart {
    #[serde(default)]
    items: Vec<CartItem>,
}

impl From<StoredCart> for Cart {
    fn from(stored: StoredCart) -> Self {
        let mut cart = Self::new();
        for item in stored.items.into_iter().filter(|item| item.quantity > 0) {
            cart.add(&item.book, item.quantity);
        }
        cart
    }
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Items in the order they were first added.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of distinct books (not copies).
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Get the item for a book, if present.
    #[must_use]
    pub fn get(&self, book_id: BookId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.book.id == book_id)
    }

    /// Add `quantity` copies of `book`.
    ///
    /// A quantity of zero is treated as one. If the book is already in the
    /// cart its quantity is incremented, otherwise a new item is appended.
    pub fn add(&mut self, book: &Book, quantity: u32) {
        let quantity = quantity.max(1);
        if let Some(item) = self.items.iter_mut().find(|item| item.book.id == book.id) {
            item.quantity = item.quantity.saturating_add(quantity);
        } else {
            self.items.push(CartItem {
                book: book.clone(),
                quantity,
            });
        }
    }

    /// Set the quantity for a book.
    ///
    /// A quantity of zero or less removes the item. Does nothing if the book
    /// is not in the cart.
    pub fn update_quantity(&mut self, book_id: BookId, quantity: i64) {
        if quantity <= 0 {
            self.remove(book_id);
            return;
        }
        if let Some(item) = self.items.iter_mut().find(|item| item.book.id == book_id) {
            item.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        }
    }

    /// Remove a book from the cart. Returns `true` if it was present.
    pub fn remove(&mut self, book_id: BookId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.book.id != book_id);
        self.items.len() != before
    }

    /// Remove every item.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Total number of copies (sum of quantities, not item count).
    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Sum of `price * quantity` over all items.
    #[must_use]
    pub fn total_price(&self) -> Price {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Shipping, tax and grand total for the current contents.
    #[must_use]
    pub fn summary(&self) -> OrderSummary {
        OrderSummary::from_subtotal(self.total_price())
    }

    /// The `{book_id, quantity}` pairs to send to checkout.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLine> {
        self.items
            .iter()
            .map(|item| CartLine {
                book_id: item.book.id,
                quantity: item.quantity,
            })
            .collect()
    }
}

//! Cart store bound to one visitor's session.
//!
//! The session holds only `{book_id, quantity}` lines. Books are looked up in
//! the catalog on every load, so a stale or tampered session can never carry
//! its own prices, and lines for books no longer in the catalog are dropped.

use thiserror::Error;
use tracing::{debug, instrument};

use lamplight_core::cart::CartLine;
use lamplight_core::checkout::OrderReceipt;
use lamplight_core::{BookId, Cart, catalog};

use super::storage::{SessionStorage, StorageError};
use crate::models::{PendingCheckout, session_keys};

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("book not found: {0}")]
    UnknownBook(BookId),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The visitor's cart and checkout bookkeeping.
pub struct CartStore<S> {
    storage: S,
}

fn rebuild(lines: &[CartLine]) -> Cart {
    let mut cart = Cart::new();
    for line in lines.iter().filter(|line| line.quantity > 0) {
        if let Some(book) = catalog::find(line.book_id) {
            cart.add(book, line.quantity);
        }
    }
    cart
}

impl<S: SessionStorage> CartStore<S> {
    /// Create a cart store over a visitor's storage.
    #[must_use]
    pub const fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Load the current cart. A missing cart is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read.
    pub async fn load(&self) -> Result<Cart, StorageError> {
        self.load_key(session_keys::CART).await
    }

    async fn load_key(&self, key: &str) -> Result<Cart, StorageError> {
        let lines: Vec<CartLine> = self.storage.load(key).await?.unwrap_or_default();
        Ok(rebuild(&lines))
    }

    /// Persist the cart. An empty cart removes the key.
    async fn save(&self, cart: &Cart) -> Result<(), StorageError> {
        if cart.is_empty() {
            self.storage.remove(session_keys::CART).await
        } else {
            self.storage.store(session_keys::CART, &cart.lines()).await
        }
    }

    /// Add copies of a catalog book. A quantity of zero adds one copy.
    ///
    /// # Errors
    ///
    /// Returns `CartError::UnknownBook` if the book is not in the catalog.
    #[instrument(skip(self))]
    pub async fn add(&self, book_id: BookId, quantity: u32) -> Result<Cart, CartError> {
        let book = catalog::find(book_id).ok_or(CartError::UnknownBook(book_id))?;
        let mut cart = self.load().await?;
        cart.add(book, quantity);
        self.save(&cart).await?;
        debug!(total_items = cart.total_items(), "Added to cart");
        Ok(cart)
    }

    /// Set a book's quantity; zero or less removes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read or written.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        book_id: BookId,
        quantity: i64,
    ) -> Result<Cart, StorageError> {
        let mut cart = self.load().await?;
        cart.update_quantity(book_id, quantity);
        self.save(&cart).await?;
        Ok(cart)
    }

    /// Remove a book if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read or written.
    #[instrument(skip(self))]
    pub async fn remove(&self, book_id: BookId) -> Result<Cart, StorageError> {
        let mut cart = self.load().await?;
        if cart.remove(book_id) {
            self.save(&cart).await?;
        }
        Ok(cart)
    }

    /// Empty the cart and remove its key.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be written.
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(session_keys::CART).await
    }

    /// Keep a copy of the lines being paid for, so an abandoned or failed
    /// payment can be recovered later.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be written.
    pub async fn backup(&self, lines: &[CartLine]) -> Result<(), StorageError> {
        if lines.is_empty() {
            return Ok(());
        }
        self.storage.store(session_keys::CART_BACKUP, &lines).await
    }

    /// Restore the backup taken at checkout.
    ///
    /// Backup lines are merged into whatever the cart holds now; the backup
    /// is then dropped. Returns `None` when there was nothing to restore.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read or written.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<Option<Cart>, StorageError> {
        let backup = self.load_key(session_keys::CART_BACKUP).await?;
        if backup.is_empty() {
            return Ok(None);
        }

        let mut cart = self.load().await?;
        for item in backup.items() {
            let missing = cart
                .get(item.book.id)
                .map_or(item.quantity, |current| {
                    item.quantity.saturating_sub(current.quantity)
                });
            if missing > 0 {
                cart.add(&item.book, missing);
            }
        }

        self.save(&cart).await?;
        self.storage.remove(session_keys::CART_BACKUP).await?;
        debug!(total_items = cart.total_items(), "Recovered cart from backup");
        Ok(Some(cart))
    }

    /// Record a checkout awaiting confirmation.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be written.
    pub async fn set_pending_checkout(&self, pending: &PendingCheckout) -> Result<(), StorageError> {
        self.storage
            .store(session_keys::PENDING_CHECKOUT, pending)
            .await
    }

    /// The checkout awaiting confirmation, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read.
    pub async fn pending_checkout(&self) -> Result<Option<PendingCheckout>, StorageError> {
        self.storage.load(session_keys::PENDING_CHECKOUT).await
    }

    /// Finish a paid checkout: empty the cart, drop the backup and pending
    /// record, and keep the receipt for the success page.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be written.
    #[instrument(skip(self, receipt), fields(order_id = %receipt.order_id))]
    pub async fn complete(&self, receipt: &OrderReceipt) -> Result<(), StorageError> {
        self.clear().await?;
        self.storage.remove(session_keys::CART_BACKUP).await?;
        self.storage.remove(session_keys::PENDING_CHECKOUT).await?;
        self.storage.store(session_keys::LAST_ORDER, receipt).await
    }

    /// Receipt of the most recent completed order.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read.
    pub async fn last_order(&self) -> Result<Option<OrderReceipt>, StorageError> {
        self.storage.load(session_keys::LAST_ORDER).await
    }
}

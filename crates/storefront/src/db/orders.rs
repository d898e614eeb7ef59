//! Order repository.
//!
//! Orders are written once as `pending` when a payment handle is requested
//! and only ever change status afterwards. Line items carry the unit price
//! captured at that moment.

use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{debug, instrument};

use lamplight_core::checkout::OrderDraft;
use lamplight_core::{CurrencyCode, OrderId, OrderStatus};

use super::RepositoryError;

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a pending order and its items in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if either insert fails.
    #[instrument(skip(self, draft), fields(items = draft.items.len()))]
    pub async fn create_pending(
        &self,
        draft: &OrderDraft,
        currency: CurrencyCode,
    ) -> Result<OrderId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let (id,): (i32,) = sqlx::query_as(
            r"
            INSERT INTO orders
                (customer_email, customer_name, shipping_address, billing_address,
                 subtotal, shipping, tax, total_amount, currency, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending')
            RETURNING id
            ",
        )
        .bind(&draft.customer_email)
        .bind(draft.customer_name.as_deref())
        .bind(draft.shipping_address.as_ref().map(Json))
        .bind(draft.billing_address.as_ref().map(Json))
        .bind(draft.summary.subtotal)
        .bind(draft.summary.shipping)
        .bind(draft.summary.tax)
        .bind(draft.summary.total)
        .bind(currency.as_stripe_code())
        .fetch_one(&mut *tx)
        .await?;

        for item in &draft.items {
            let quantity = i32::try_from(item.quantity).map_err(|_| {
                RepositoryError::Conflict(format!("quantity out of range: {}", item.quantity))
            })?;
            sqlx::query(
                r"
                INSERT INTO order_items (order_id, book_id, title, quantity, price)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(id)
            .bind(item.book_id.as_i32())
            .bind(&item.title)
            .bind(quantity)
            .bind(item.price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(order_id = id, "Created pending order");
        Ok(OrderId::new(id))
    }

    /// Record the payment intent that pays for an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    #[instrument(skip(self))]
    pub async fn attach_payment_intent(
        &self,
        order_id: OrderId,
        payment_intent_id: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE orders SET payment_intent_id = $2, updated_at = now() WHERE id = $1",
        )
        .bind(order_id.as_i32())
        .bind(payment_intent_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Move the order paid by `payment_intent_id` out of `pending`.
    ///
    /// Returns the order id when this call performed the transition, `None`
    /// if the order was already settled or is unknown.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(self))]
    pub async fn settle(
        &self,
        payment_intent_id: &str,
        status: OrderStatus,
    ) -> Result<Option<OrderId>, RepositoryError> {
        if !OrderStatus::Pending.can_transition_to(status) {
            return Err(RepositoryError::Conflict(format!(
                "cannot settle an order as {status}"
            )));
        }

        let row: Option<(i32,)> = sqlx::query_as(
            r"
            UPDATE orders
            SET status = $2, updated_at = now()
            WHERE payment_intent_id = $1 AND status = 'pending'
            RETURNING id
            ",
        )
        .bind(payment_intent_id)
        .bind(status)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(id,)| OrderId::new(id)))
    }

    /// Move a pending order out of `pending` by its id, recording
    /// `payment_intent_id` if the order has none yet.
    ///
    /// Used when the intent id was never attached to the order and the
    /// order id is known from the intent's metadata instead. An order
    /// already paid by a different intent is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(self))]
    pub async fn settle_order(
        &self,
        order_id: OrderId,
        payment_intent_id: &str,
        status: OrderStatus,
    ) -> Result<Option<OrderId>, RepositoryError> {
        if !OrderStatus::Pending.can_transition_to(status) {
            return Err(RepositoryError::Conflict(format!(
                "cannot settle an order as {status}"
            )));
        }

        let row: Option<(i32,)> = sqlx::query_as(
            r"
            UPDATE orders
            SET status = $3,
                payment_intent_id = COALESCE(payment_intent_id, $2),
                updated_at = now()
            WHERE id = $1
              AND status = 'pending'
              AND (payment_intent_id IS NULL OR payment_intent_id = $2)
            RETURNING id
            ",
        )
        .bind(order_id.as_i32())
        .bind(payment_intent_id)
        .bind(status)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(id,)| OrderId::new(id)))
    }

    /// Mark a still-pending order as failed, e.g. when no payment intent
    /// could be created for it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(self))]
    pub async fn mark_failed(&self, order_id: OrderId) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE orders SET status = 'failed', updated_at = now() WHERE id = $1 AND status = 'pending'",
        )
        .bind(order_id.as_i32())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Decrement mirrored stock for every line of an order.
    ///
    /// Each book is a single conditional update; books without a stock
    /// count, or with too little stock, are left unchanged.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(self))]
    pub async fn decrement_stock(&self, order_id: OrderId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE books b
            SET stock = b.stock - i.quantity, updated_at = now()
            FROM order_items i
            WHERE i.order_id = $1
              AND b.id = i.book_id
              AND b.stock IS NOT NULL
              AND b.stock >= i.quantity
            ",
        )
        .bind(order_id.as_i32())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

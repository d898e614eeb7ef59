//! Checkout orchestration.
//!
//! The browser sends cart lines and an email; this service prices them
//! from the catalog, records a pending order, and asks Stripe for a payment
//! handle. After Stripe Elements confirms the payment client-side, the
//! browser calls back with the payment intent id and the order is settled
//! from Stripe's own view of the intent, never from anything the browser
//! reports.

use std::future::Future;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use lamplight_core::cart::CartLine;
use lamplight_core::checkout::{
    CheckoutOutcome, CheckoutRequest, CheckoutValidationError, OrderDraft, OrderReceipt,
};
use lamplight_core::{CurrencyCode, OrderId, OrderStatus, OrderSummary, PriceError};

use super::cart::CartStore;
use super::storage::{SessionStorage, StorageError};
use super::stripe::{NewPaymentIntent, PaymentIntent, StripeClient, StripeError, WebhookEvent};
use crate::db::{OrderRepository, RepositoryError};
use crate::models::PendingCheckout;

/// Errors from the checkout flow.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Invalid(#[from] CheckoutValidationError),

    #[error("order total cannot be charged: {0}")]
    Amount(#[from] PriceError),

    #[error("payment provider error: {0}")]
    Payment(#[from] StripeError),

    #[error("order storage error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("session error: {0}")]
    Session(#[from] StorageError),

    #[error("no checkout in progress for this payment")]
    UnknownPaymentIntent,
}

/// Creates and inspects payment intents.
pub trait PaymentGateway: Send + Sync {
    fn create_intent(
        &self,
        params: &NewPaymentIntent<'_>,
    ) -> impl Future<Output = Result<PaymentIntent, StripeError>> + Send;

    fn retrieve_intent(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<PaymentIntent, StripeError>> + Send;
}

impl PaymentGateway for StripeClient {
    async fn create_intent(
        &self,
        params: &NewPaymentIntent<'_>,
    ) -> Result<PaymentIntent, StripeError> {
        self.create_payment_intent(params).await
    }

    async fn retrieve_intent(&self, id: &str) -> Result<PaymentIntent, StripeError> {
        self.retrieve_payment_intent(id).await
    }
}

/// Persists orders and their status transitions.
pub trait OrderStore: Send + Sync {
    fn create_pending(
        &self,
        draft: &OrderDraft,
        currency: CurrencyCode,
    ) -> impl Future<Output = Result<OrderId, RepositoryError>> + Send;

    fn attach_payment_intent(
        &self,
        order_id: OrderId,
        payment_intent_id: &str,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn mark_failed(
        &self,
        order_id: OrderId,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn settle(
        &self,
        payment_intent_id: &str,
        status: OrderStatus,
    ) -> impl Future<Output = Result<Option<OrderId>, RepositoryError>> + Send;

    fn settle_order(
        &self,
        order_id: OrderId,
        payment_intent_id: &str,
        status: OrderStatus,
    ) -> impl Future<Output = Result<Option<OrderId>, RepositoryError>> + Send;

    fn decrement_stock(
        &self,
        order_id: OrderId,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;
}

impl OrderStore for OrderRepository<'_> {
    async fn create_pending(
        &self,
        draft: &OrderDraft,
        currency: CurrencyCode,
    ) -> Result<OrderId, RepositoryError> {
        OrderRepository::create_pending(self, draft, currency).await
    }

    async fn attach_payment_intent(
        &self,
        order_id: OrderId,
        payment_intent_id: &str,
    ) -> Result<(), RepositoryError> {
        OrderRepository::attach_payment_intent(self, order_id, payment_intent_id).await
    }

    async fn mark_failed(&self, order_id: OrderId) -> Result<(), RepositoryError> {
        OrderRepository::mark_failed(self, order_id).await
    }

    async fn settle(
        &self,
        payment_intent_id: &str,
        status: OrderStatus,
    ) -> Result<Option<OrderId>, RepositoryError> {
        OrderRepository::settle(self, payment_intent_id, status).await
    }

    async fn settle_order(
        &self,
        order_id: OrderId,
        payment_intent_id: &str,
        status: OrderStatus,
    ) -> Result<Option<OrderId>, RepositoryError> {
        OrderRepository::settle_order(self, order_id, payment_intent_id, status).await
    }

    async fn decrement_stock(&self, order_id: OrderId) -> Result<u64, RepositoryError> {
        OrderRepository::decrement_stock(self, order_id).await
    }
}

/// What the browser needs to mount the payment form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHandle {
    pub client_secret: String,
    pub payment_intent_id: String,
    pub order_id: OrderId,
    pub summary: OrderSummary,
}

/// Checkout flow over a payment gateway and an order store.
pub struct CheckoutService<'a, G, O> {
    gateway: &'a G,
    orders: O,
    currency: CurrencyCode,
}

impl<'a, G: PaymentGateway, O: OrderStore> CheckoutService<'a, G, O> {
    #[must_use]
    pub const fn new(gateway: &'a G, orders: O, currency: CurrencyCode) -> Self {
        Self {
            gateway,
            orders,
            currency,
        }
    }

    /// Price a checkout request and obtain a payment handle for it.
    ///
    /// A request without lines is filled from the visitor's cart. The cart
    /// is left as it is and a backup of the priced lines is kept until the
    /// payment is confirmed.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Invalid` for an empty cart, a missing email or
    /// an unknown book. Provider and storage failures are returned as-is; the
    /// pending order is then marked failed where possible.
    #[instrument(skip_all)]
    pub async fn begin<S: SessionStorage>(
        &self,
        cart: &CartStore<S>,
        mut request: CheckoutRequest,
    ) -> Result<PaymentHandle, CheckoutError> {
        if request.items.is_empty() {
            request.items = cart.load().await?.lines();
        }

        let draft = request.price()?;
        let amount = draft.summary.total.to_minor_units()?;
        let order_id = self.orders.create_pending(&draft, self.currency).await?;

        let params = NewPaymentIntent {
            order_id,
            amount,
            currency: self.currency,
            receipt_email: &draft.customer_email,
        };
        let intent = match self.gateway.create_intent(&params).await {
            Ok(intent) => intent,
            Err(e) => {
                self.abandon(order_id).await;
                return Err(e.into());
            }
        };
        let Some(client_secret) = intent.client_secret.clone() else {
            self.abandon(order_id).await;
            return Err(StripeError::Parse("payment intent has no client secret".to_string()).into());
        };

        if let Err(e) = self.orders.attach_payment_intent(order_id, &intent.id).await {
            self.abandon(order_id).await;
            return Err(e.into());
        }

        let lines: Vec<CartLine> = draft
            .items
            .iter()
            .map(|item| CartLine {
                book_id: item.book_id,
                quantity: item.quantity,
            })
            .collect();
        cart.backup(&lines).await?;
        cart.set_pending_checkout(&PendingCheckout {
            order_id,
            payment_intent_id: intent.id.clone(),
            email: draft.customer_email.clone(),
            items: draft.items,
            summary: draft.summary,
        })
        .await?;

        info!(%order_id, payment_intent = %intent.id, total = %draft.summary.total, "Checkout started");

        Ok(PaymentHandle {
            client_secret,
            payment_intent_id: intent.id,
            order_id,
            summary: draft.summary,
        })
    }

    async fn abandon(&self, order_id: OrderId) {
        if let Err(e) = self.orders.mark_failed(order_id).await {
            warn!(%order_id, error = %e, "Failed to mark abandoned order as failed");
        }
    }

    /// Settle a checkout after the browser reports the payment confirmed.
    ///
    /// The payment intent must belong to this visitor's pending checkout.
    /// Its status is read back from Stripe. Only a succeeded payment clears
    /// the cart; every other outcome leaves it intact.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::UnknownPaymentIntent` if the visitor has no
    /// pending checkout for this intent, or a session error.
    #[instrument(skip(self, cart))]
    pub async fn confirm<S: SessionStorage>(
        &self,
        cart: &CartStore<S>,
        payment_intent_id: &str,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let pending = cart
            .pending_checkout()
            .await?
            .filter(|pending| pending.payment_intent_id == payment_intent_id)
            .ok_or(CheckoutError::UnknownPaymentIntent)?;

        let intent = match self.gateway.retrieve_intent(payment_intent_id).await {
            Ok(intent) => intent,
            Err(e) => {
                warn!(error = %e, "Could not read payment intent back from Stripe");
                return Ok(CheckoutOutcome::retry());
            }
        };

        let outcome = CheckoutOutcome::from_attempt(pending.order_id, intent.into());
        if !outcome.clears_cart() {
            debug!(?outcome, "Payment not completed");
            return Ok(outcome);
        }

        // The payment has been taken; a storage error must not hide that.
        if let Err(e) = self
            .complete_order(payment_intent_id, Some(pending.order_id))
            .await
        {
            error!(order_id = %pending.order_id, error = %e, "Failed to complete paid order");
        }

        let receipt = OrderReceipt {
            order_id: pending.order_id,
            payment_intent_id: pending.payment_intent_id,
            email: pending.email,
            items: pending.items,
            summary: pending.summary,
            completed_at: Utc::now(),
        };
        cart.complete(&receipt).await?;

        info!(order_id = %receipt.order_id, "Checkout completed");
        Ok(outcome)
    }

    /// Apply a verified Stripe webhook event.
    ///
    /// A declined attempt leaves the order pending, since the customer can
    /// retry with another card on the same intent. Only a canceled intent
    /// fails the order.
    ///
    /// # Errors
    ///
    /// Returns an error if the event payload is malformed or the order update
    /// fails, so Stripe retries the delivery.
    #[instrument(skip_all, fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn handle_webhook(&self, event: &WebhookEvent) -> Result<(), CheckoutError> {
        match event.event_type.as_str() {
            "payment_intent.succeeded" => {
                let intent = event.payment_intent()?;
                match self.complete_order(&intent.id, intent.order_id()).await? {
                    Some(order_id) => info!(%order_id, "Order completed by webhook"),
                    None => debug!(payment_intent = %intent.id, "No pending order to complete"),
                }
            }
            "payment_intent.payment_failed" => {
                let intent = event.payment_intent()?;
                info!(
                    payment_intent = %intent.id,
                    order_id = ?intent.order_id(),
                    "Payment attempt declined, order stays pending"
                );
            }
            "payment_intent.canceled" => {
                let intent = event.payment_intent()?;
                if let Some(order_id) = self
                    .settle_intent(&intent.id, intent.order_id(), OrderStatus::Failed)
                    .await?
                {
                    info!(%order_id, "Order failed by webhook");
                }
            }
            other => debug!(event_type = other, "Ignoring webhook event"),
        }
        Ok(())
    }

    /// Mark the order completed and decrement stock, once.
    ///
    /// Stock is a best-effort mirror: a failed decrement is logged and the
    /// order still counts as completed.
    async fn complete_order(
        &self,
        payment_intent_id: &str,
        order_id: Option<OrderId>,
    ) -> Result<Option<OrderId>, RepositoryError> {
        let settled = self
            .settle_intent(payment_intent_id, order_id, OrderStatus::Completed)
            .await?;

        if let Some(order_id) = settled {
            match self.orders.decrement_stock(order_id).await {
                Ok(updated) => debug!(%order_id, updated, "Stock decremented"),
                Err(e) => warn!(%order_id, error = %e, "Stock decrement failed"),
            }
        }

        Ok(settled)
    }

    /// Settle the order paid by `payment_intent_id`, falling back to
    /// `order_id` when no order has that intent attached.
    async fn settle_intent(
        &self,
        payment_intent_id: &str,
        order_id: Option<OrderId>,
        status: OrderStatus,
    ) -> Result<Option<OrderId>, RepositoryError> {
        if let Some(settled) = self.orders.settle(payment_intent_id, status).await? {
            return Ok(Some(settled));
        }
        match order_id {
            Some(order_id) => {
                self.orders
                    .settle_order(order_id, payment_intent_id, status)
                    .await
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use lamplight_core::checkout::{PaymentErrorKind, PaymentStatus};
    use lamplight_core::{BookId, Price};

    use super::*;
    use crate::models::session_keys;
    use crate::services::storage::MemoryStorage;
    use crate::services::stripe::LastPaymentError;

    fn intent(id: &str, status: PaymentStatus) -> PaymentIntent {
        PaymentIntent {
            id: id.to_string(),
            client_secret: Some(format!("{id}_secret_1")),
            status,
            amount: 0,
            last_payment_error: None,
            next_action: None,
            metadata: HashMap::new(),
        }
    }

    #[derive(Default)]
    struct FakeGateway {
        fail_create: bool,
        retrieved: Mutex<Option<Result<PaymentIntent, String>>>,
        created: Mutex<Vec<(OrderId, i64)>>,
    }

    impl FakeGateway {
        fn will_report(&self, result: Result<PaymentIntent, String>) {
            *self.retrieved.lock().unwrap() = Some(result);
        }
    }

    impl PaymentGateway for FakeGateway {
        async fn create_intent(
            &self,
            params: &NewPaymentIntent<'_>,
        ) -> Result<PaymentIntent, StripeError> {
            if self.fail_create {
                return Err(StripeError::Api {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            self.created
                .lock()
                .unwrap()
                .push((params.order_id, params.amount));
            Ok(intent("pi_test1", PaymentStatus::RequiresPaymentMethod))
        }

        async fn retrieve_intent(&self, _id: &str) -> Result<PaymentIntent, StripeError> {
            match self.retrieved.lock().unwrap().clone() {
                Some(Ok(intent)) => Ok(intent),
                Some(Err(message)) => Err(StripeError::Api {
                    status: 503,
                    message,
                }),
                None => Err(StripeError::Parse("no intent".to_string())),
            }
        }
    }

    #[derive(Default)]
    struct FakeOrders {
        fail_attach: bool,
        statuses: Mutex<HashMap<i32, OrderStatus>>,
        intents: Mutex<HashMap<String, i32>>,
        stock_decrements: Mutex<Vec<OrderId>>,
    }

    impl FakeOrders {
        fn status(&self, id: i32) -> Option<OrderStatus> {
            self.statuses.lock().unwrap().get(&id).copied()
        }
    }

    impl OrderStore for &FakeOrders {
        async fn create_pending(
            &self,
            _draft: &OrderDraft,
            _currency: CurrencyCode,
        ) -> Result<OrderId, RepositoryError> {
            let mut statuses = self.statuses.lock().unwrap();
            let id = i32::try_from(statuses.len()).unwrap() + 1;
            statuses.insert(id, OrderStatus::Pending);
            Ok(OrderId::new(id))
        }

        async fn attach_payment_intent(
            &self,
            order_id: OrderId,
            payment_intent_id: &str,
        ) -> Result<(), RepositoryError> {
            if self.fail_attach {
                return Err(RepositoryError::NotFound);
            }
            self.intents
                .lock()
                .unwrap()
                .insert(payment_intent_id.to_string(), order_id.as_i32());
            Ok(())
        }

        async fn mark_failed(&self, order_id: OrderId) -> Result<(), RepositoryError> {
            self.statuses
                .lock()
                .unwrap()
                .insert(order_id.as_i32(), OrderStatus::Failed);
            Ok(())
        }

        async fn settle(
            &self,
            payment_intent_id: &str,
            status: OrderStatus,
        ) -> Result<Option<OrderId>, RepositoryError> {
            let Some(id) = self.intents.lock().unwrap().get(payment_intent_id).copied() else {
                return Ok(None);
            };
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.get(&id) != Some(&OrderStatus::Pending) {
                return Ok(None);
            }
            statuses.insert(id, status);
            Ok(Some(OrderId::new(id)))
        }

        async fn settle_order(
            &self,
            order_id: OrderId,
            payment_intent_id: &str,
            status: OrderStatus,
        ) -> Result<Option<OrderId>, RepositoryError> {
            let id = order_id.as_i32();
            let mut intents = self.intents.lock().unwrap();
            if intents.iter().any(|(pi, o)| *o == id && pi != payment_intent_id) {
                return Ok(None);
            }
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.get(&id) != Some(&OrderStatus::Pending) {
                return Ok(None);
            }
            statuses.insert(id, status);
            intents.insert(payment_intent_id.to_string(), id);
            Ok(Some(order_id))
        }

        async fn decrement_stock(&self, order_id: OrderId) -> Result<u64, RepositoryError> {
            self.stock_decrements.lock().unwrap().push(order_id);
            Ok(1)
        }
    }

    fn request(email: &str) -> CheckoutRequest {
        CheckoutRequest {
            email: email.to_string(),
            ..CheckoutRequest::default()
        }
    }

    async fn cart_with_two_copies(storage: &MemoryStorage) -> CartStore<&MemoryStorage> {
        let cart = CartStore::new(storage);
        cart.add(BookId::new(1), 2).await.unwrap();
        cart
    }

    #[tokio::test]
    async fn test_begin_prices_from_catalog() {
        let gateway = FakeGateway::default();
        let orders = FakeOrders::default();
        let storage = MemoryStorage::default();
        let cart = cart_with_two_copies(&storage).await;
        let service = CheckoutService::new(&gateway, &orders, CurrencyCode::USD);

        let handle = service.begin(&cart, request("Reader@Example.com")).await.unwrap();

        assert_eq!(handle.client_secret, "pi_test1_secret_1");
        assert_eq!(handle.summary.total, Price::from_cents(3305));
        assert_eq!(gateway.created.lock().unwrap()[0], (handle.order_id, 3305));
        assert_eq!(orders.status(handle.order_id.as_i32()), Some(OrderStatus::Pending));

        let pending = cart.pending_checkout().await.unwrap().unwrap();
        assert_eq!(pending.email, "reader@example.com");
        assert!(storage.contains(session_keys::CART_BACKUP));
        assert_eq!(cart.load().await.unwrap().total_items(), 2);
    }

    #[tokio::test]
    async fn test_begin_rejects_empty_cart() {
        let gateway = FakeGateway::default();
        let orders = FakeOrders::default();
        let storage = MemoryStorage::default();
        let cart = CartStore::new(&storage);
        let service = CheckoutService::new(&gateway, &orders, CurrencyCode::USD);

        let result = service.begin(&cart, request("reader@example.com")).await;
        assert!(matches!(
            result,
            Err(CheckoutError::Invalid(CheckoutValidationError::EmptyCart))
        ));
        assert!(orders.statuses.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_begin_marks_order_failed_when_provider_fails() {
        let gateway = FakeGateway {
            fail_create: true,
            ..FakeGateway::default()
        };
        let orders = FakeOrders::default();
        let storage = MemoryStorage::default();
        let cart = cart_with_two_copies(&storage).await;
        let service = CheckoutService::new(&gateway, &orders, CurrencyCode::USD);

        let result = service.begin(&cart, request("reader@example.com")).await;
        assert!(matches!(result, Err(CheckoutError::Payment(_))));
        assert_eq!(orders.status(1), Some(OrderStatus::Failed));
        assert_eq!(cart.load().await.unwrap().total_items(), 2);
    }

    #[tokio::test]
    async fn test_confirm_success_clears_cart() {
        let gateway = FakeGateway::default();
        let orders = FakeOrders::default();
        let storage = MemoryStorage::default();
        let cart = cart_with_two_copies(&storage).await;
        let service = CheckoutService::new(&gateway, &orders, CurrencyCode::USD);
        let handle = service.begin(&cart, request("reader@example.com")).await.unwrap();

        gateway.will_report(Ok(intent("pi_test1", PaymentStatus::Succeeded)));
        let outcome = service.confirm(&cart, "pi_test1").await.unwrap();

        assert!(outcome.clears_cart());
        assert!(cart.load().await.unwrap().is_empty());
        assert_eq!(orders.status(handle.order_id.as_i32()), Some(OrderStatus::Completed));
        assert_eq!(*orders.stock_decrements.lock().unwrap(), vec![handle.order_id]);
        assert_eq!(
            cart.last_order().await.unwrap().unwrap().order_id,
            handle.order_id
        );
        assert!(!storage.contains(session_keys::PENDING_CHECKOUT));
    }

    #[tokio::test]
    async fn test_confirm_card_error_keeps_cart() {
        let gateway = FakeGateway::default();
        let orders = FakeOrders::default();
        let storage = MemoryStorage::default();
        let cart = cart_with_two_copies(&storage).await;
        let service = CheckoutService::new(&gateway, &orders, CurrencyCode::USD);
        service.begin(&cart, request("reader@example.com")).await.unwrap();

        let mut declined = intent("pi_test1", PaymentStatus::RequiresPaymentMethod);
        declined.last_payment_error = Some(LastPaymentError {
            kind: PaymentErrorKind::CardError,
            message: Some("Your card was declined.".to_string()),
        });
        gateway.will_report(Ok(declined));

        let outcome = service.confirm(&cart, "pi_test1").await.unwrap();
        assert_eq!(
            outcome,
            CheckoutOutcome::PaymentFailed {
                kind: PaymentErrorKind::CardError,
                message: "Your card was declined.".to_string(),
            }
        );
        assert_eq!(cart.load().await.unwrap().total_items(), 2);
        assert!(storage.contains(session_keys::CART_BACKUP));
        assert_eq!(orders.status(1), Some(OrderStatus::Pending));
    }

    #[tokio::test]
    async fn test_confirm_transport_error_is_retry() {
        let gateway = FakeGateway::default();
        let orders = FakeOrders::default();
        let storage = MemoryStorage::default();
        let cart = cart_with_two_copies(&storage).await;
        let service = CheckoutService::new(&gateway, &orders, CurrencyCode::USD);
        service.begin(&cart, request("reader@example.com")).await.unwrap();

        gateway.will_report(Err("unavailable".to_string()));
        let outcome = service.confirm(&cart, "pi_test1").await.unwrap();

        assert_eq!(outcome, CheckoutOutcome::retry());
        assert_eq!(cart.load().await.unwrap().total_items(), 2);
    }

    #[tokio::test]
    async fn test_confirm_unknown_intent() {
        let gateway = FakeGateway::default();
        let orders = FakeOrders::default();
        let storage = MemoryStorage::default();
        let cart = cart_with_two_copies(&storage).await;
        let service = CheckoutService::new(&gateway, &orders, CurrencyCode::USD);
        service.begin(&cart, request("reader@example.com")).await.unwrap();

        let result = service.confirm(&cart, "pi_someone_else").await;
        assert!(matches!(result, Err(CheckoutError::UnknownPaymentIntent)));
    }

    #[tokio::test]
    async fn test_webhook_settles_once() {
        let gateway = FakeGateway::default();
        let orders = FakeOrders::default();
        let storage = MemoryStorage::default();
        let cart = cart_with_two_copies(&storage).await;
        let service = CheckoutService::new(&gateway, &orders, CurrencyCode::USD);
        let handle = service.begin(&cart, request("reader@example.com")).await.unwrap();

        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_test1", "status": "succeeded", "amount": 3305}}
        }))
        .unwrap();

        service.handle_webhook(&event).await.unwrap();
        service.handle_webhook(&event).await.unwrap();

        assert_eq!(orders.status(handle.order_id.as_i32()), Some(OrderStatus::Completed));
        assert_eq!(orders.stock_decrements.lock().unwrap().len(), 1);
    }

    fn webhook(event_type: &str, object: serde_json::Value) -> WebhookEvent {
        serde_json::from_value(serde_json::json!({
            "id": "evt_test",
            "type": event_type,
            "data": {"object": object}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_declined_then_retried_payment_completes_order() {
        let gateway = FakeGateway::default();
        let orders = FakeOrders::default();
        let storage = MemoryStorage::default();
        let cart = cart_with_two_copies(&storage).await;
        let service = CheckoutService::new(&gateway, &orders, CurrencyCode::USD);
        let handle = service.begin(&cart, request("reader@example.com")).await.unwrap();

        let declined = webhook(
            "payment_intent.payment_failed",
            serde_json::json!({"id": "pi_test1", "status": "requires_payment_method", "amount": 3305}),
        );
        service.handle_webhook(&declined).await.unwrap();
        assert_eq!(orders.status(handle.order_id.as_i32()), Some(OrderStatus::Pending));
        assert_eq!(cart.load().await.unwrap().total_items(), 2);

        gateway.will_report(Ok(intent("pi_test1", PaymentStatus::Succeeded)));
        let outcome = service.confirm(&cart, "pi_test1").await.unwrap();
        assert!(outcome.clears_cart());

        let succeeded = webhook(
            "payment_intent.succeeded",
            serde_json::json!({"id": "pi_test1", "status": "succeeded", "amount": 3305}),
        );
        service.handle_webhook(&succeeded).await.unwrap();

        assert!(cart.load().await.unwrap().is_empty());
        assert_eq!(orders.status(handle.order_id.as_i32()), Some(OrderStatus::Completed));
        assert_eq!(*orders.stock_decrements.lock().unwrap(), vec![handle.order_id]);
    }

    #[tokio::test]
    async fn test_webhook_canceled_fails_order() {
        let gateway = FakeGateway::default();
        let orders = FakeOrders::default();
        let storage = MemoryStorage::default();
        let cart = cart_with_two_copies(&storage).await;
        let service = CheckoutService::new(&gateway, &orders, CurrencyCode::USD);
        let handle = service.begin(&cart, request("reader@example.com")).await.unwrap();

        let canceled = webhook(
            "payment_intent.canceled",
            serde_json::json!({"id": "pi_test1", "status": "canceled", "amount": 3305}),
        );
        service.handle_webhook(&canceled).await.unwrap();

        assert_eq!(orders.status(handle.order_id.as_i32()), Some(OrderStatus::Failed));
        assert!(orders.stock_decrements.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_begin_marks_order_failed_when_intent_cannot_be_attached() {
        let gateway = FakeGateway::default();
        let orders = FakeOrders {
            fail_attach: true,
            ..FakeOrders::default()
        };
        let storage = MemoryStorage::default();
        let cart = cart_with_two_copies(&storage).await;
        let service = CheckoutService::new(&gateway, &orders, CurrencyCode::USD);

        let result = service.begin(&cart, request("reader@example.com")).await;

        assert!(matches!(result, Err(CheckoutError::Repository(_))));
        assert_eq!(orders.status(1), Some(OrderStatus::Failed));
        assert!(cart.pending_checkout().await.unwrap().is_none());
        assert_eq!(cart.load().await.unwrap().total_items(), 2);
    }

    #[tokio::test]
    async fn test_webhook_completes_order_from_metadata() {
        let gateway = FakeGateway::default();
        let orders = FakeOrders::default();
        let service = CheckoutService::new(&gateway, &orders, CurrencyCode::USD);
        let order_id = OrderId::new(7);
        orders
            .statuses
            .lock()
            .unwrap()
            .insert(order_id.as_i32(), OrderStatus::Pending);

        let succeeded = webhook(
            "payment_intent.succeeded",
            serde_json::json!({
                "id": "pi_unattached",
                "status": "succeeded",
                "amount": 3305,
                "metadata": {"order_id": order_id.to_string()}
            }),
        );
        service.handle_webhook(&succeeded).await.unwrap();
        service.handle_webhook(&succeeded).await.unwrap();

        assert_eq!(orders.status(order_id.as_i32()), Some(OrderStatus::Completed));
        assert_eq!(*orders.stock_decrements.lock().unwrap(), vec![order_id]);
    }
}

//! Stripe REST client for payment intents and webhook verification.
//!
//! Only the two calls checkout needs are implemented: creating a
//! `PaymentIntent` for a priced order and retrieving it again after the
//! browser confirms. Card data never touches this server; Stripe Elements
//! confirms the intent client-side with the returned client secret.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, instrument};

use lamplight_core::checkout::{PaymentAttempt, PaymentErrorKind, PaymentFailure, PaymentStatus};
use lamplight_core::{CurrencyCode, OrderId};

use crate::config::StripeConfig;
use crate::crypto::constant_time_compare;

/// Webhook timestamps older than this are rejected (seconds).
const WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Errors that can occur when talking to Stripe.
#[derive(Debug, Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse a response or identifier.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Webhook signature missing, stale or wrong.
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),
}

/// A Stripe `PaymentIntent`, reduced to the fields checkout reads.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: PaymentStatus,
    pub amount: i64,
    #[serde(default)]
    pub last_payment_error: Option<LastPaymentError>,
    #[serde(default)]
    pub next_action: Option<NextAction>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntent {
    /// The order id recorded in metadata when the intent was created.
    #[must_use]
    pub fn order_id(&self) -> Option<OrderId> {
        self.metadata
            .get("order_id")
            .and_then(|raw| raw.parse::<i32>().ok())
            .map(OrderId::new)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastPaymentError {
    #[serde(rename = "type")]
    pub kind: PaymentErrorKind,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NextAction {
    pub redirect_to_url: Option<RedirectToUrl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedirectToUrl {
    pub url: Option<String>,
}

impl From<PaymentIntent> for PaymentAttempt {
    fn from(intent: PaymentIntent) -> Self {
        Self {
            payment_intent_id: intent.id,
            status: intent.status,
            last_error: intent.last_payment_error.map(|e| PaymentFailure {
                kind: e.kind,
                message: e.message,
            }),
            redirect_url: intent
                .next_action
                .and_then(|a| a.redirect_to_url)
                .and_then(|r| r.url),
        }
    }
}

/// A verified webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    /// The event's object as a payment intent, for `payment_intent.*` events.
    ///
    /// # Errors
    ///
    /// Returns `StripeError::Parse` if the object is not a payment intent.
    pub fn payment_intent(&self) -> Result<PaymentIntent, StripeError> {
        PaymentIntent::deserialize(&self.data.object).map_err(|e| StripeError::Parse(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Parameters for a new payment intent.
#[derive(Debug, Clone)]
pub struct NewPaymentIntent<'a> {
    pub order_id: OrderId,
    /// Amount in the currency's minor units.
    pub amount: i64,
    pub currency: CurrencyCode,
    pub receipt_email: &'a str,
}

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    api_base: String,
    webhook_secret: SecretString,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.api_base)
            .field("webhook_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, StripeError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Bearer {}", config.secret_key.expose_secret());
        let mut auth = HeaderValue::from_str(&auth_value)
            .map_err(|e| StripeError::Parse(format!("Invalid API key format: {e}")))?;
        auth.set_sensitive(true);
        headers.insert("Authorization", auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            webhook_secret: config.webhook_secret.clone(),
        })
    }

    /// Create a payment intent for an order.
    ///
    /// The order id doubles as the idempotency key, so retrying the same
    /// order never creates a second charge.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    #[instrument(skip(self, params), fields(order_id = %params.order_id, amount = params.amount))]
    pub async fn create_payment_intent(
        &self,
        params: &NewPaymentIntent<'_>,
    ) -> Result<PaymentIntent, StripeError> {
        let url = format!("{}/v1/payment_intents", self.api_base);
        let amount = params.amount.to_string();
        let order_id = params.order_id.to_string();

        let form = [
            ("amount", amount.as_str()),
            ("currency", params.currency.as_stripe_code()),
            ("receipt_email", params.receipt_email),
            ("automatic_payment_methods[enabled]", "true"),
            ("metadata[order_id]", order_id.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .header("Idempotency-Key", format!("order-{order_id}"))
            .form(&form)
            .send()
            .await?;

        let intent: PaymentIntent = Self::parse(response).await?;
        debug!(payment_intent = %intent.id, "Created payment intent");
        Ok(intent)
    }

    /// Fetch the current state of a payment intent.
    ///
    /// # Errors
    ///
    /// Returns `StripeError::Parse` for a malformed id, or an error if the
    /// API request fails.
    #[instrument(skip(self))]
    pub async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, StripeError> {
        if !is_payment_intent_id(id) {
            return Err(StripeError::Parse(format!("invalid payment intent id: {id}")));
        }

        let url = format!("{}/v1/payment_intents/{id}", self.api_base);
        let response = self.client.get(&url).send().await?;
        Self::parse(response).await
    }

    async fn parse<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or(body);
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| StripeError::Parse(e.to_string()))
    }

    /// Verify a webhook payload against its `Stripe-Signature` header and
    /// parse the event.
    ///
    /// # Errors
    ///
    /// Returns `StripeError::InvalidSignature` if verification fails, or
    /// `StripeError::Parse` if the verified payload is not an event.
    #[instrument(skip_all)]
    pub fn verify_webhook(&self, payload: &str, header: &str) -> Result<WebhookEvent, StripeError> {
        let now = chrono::Utc::now().timestamp();
        self.verify_webhook_at(payload, header, now)
    }

    fn verify_webhook_at(
        &self,
        payload: &str,
        header: &str,
        now: i64,
    ) -> Result<WebhookEvent, StripeError> {
        let mut timestamp: Option<&str> = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| StripeError::InvalidSignature("Missing timestamp".to_string()))?;
        let ts: i64 = timestamp
            .parse()
            .map_err(|_| StripeError::InvalidSignature("Invalid timestamp".to_string()))?;

        if (now - ts).abs() > WEBHOOK_TOLERANCE_SECS {
            return Err(StripeError::InvalidSignature(
                "Timestamp outside tolerance".to_string(),
            ));
        }

        let mut mac = Hmac::<Sha256>::new_from_slice(self.webhook_secret.expose_secret().as_bytes())
            .map_err(|e| StripeError::InvalidSignature(e.to_string()))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        if !signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate))
        {
            return Err(StripeError::InvalidSignature(
                "Signature mismatch".to_string(),
            ));
        }

        let event: WebhookEvent =
            serde_json::from_str(payload).map_err(|e| StripeError::Parse(e.to_string()))?;
        debug!(event_id = %event.id, event_type = %event.event_type, "Stripe webhook verified");
        Ok(event)
    }
}

/// Payment intent ids are `pi_` followed by alphanumerics.
fn is_payment_intent_id(id: &str) -> bool {
    id.strip_prefix("pi_").is_some_and(|rest| {
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;

    fn client() -> StripeClient {
        StripeClient::new(&StripeConfig {
            secret_key: SecretString::from("sk_test_abc123"),
            webhook_secret: SecretString::from(SECRET),
            publishable_key: None,
            currency: CurrencyCode::USD,
            api_base: "https://api.stripe.com/".to_string(),
        })
        .unwrap()
    }

    fn sign(timestamp: i64, payload: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).expect("valid key length");
        mac.update(format!("{timestamp}.{payload}").as_bytes());
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    const PAYLOAD: &str = r#"{
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": {"object": {
            "id": "pi_123",
            "client_secret": "pi_123_secret_456",
            "status": "succeeded",
            "amount": 2598,
            "metadata": {"order_id": "42"}
        }}
    }"#;

    #[test]
    fn test_api_base_trailing_slash_trimmed() {
        assert_eq!(client().api_base, "https://api.stripe.com");
    }

    #[test]
    fn test_webhook_signature_valid() {
        let header = sign(NOW, PAYLOAD);
        let event = client().verify_webhook_at(PAYLOAD, &header, NOW + 10).unwrap();

        assert_eq!(event.event_type, "payment_intent.succeeded");
        let intent = event.payment_intent().unwrap();
        assert_eq!(intent.id, "pi_123");
        assert_eq!(intent.status, PaymentStatus::Succeeded);
        assert_eq!(intent.order_id(), Some(OrderId::new(42)));
    }

    #[test]
    fn test_webhook_signature_accepts_any_v1() {
        let valid = sign(NOW, PAYLOAD);
        let v1 = valid.split_once(",v1=").unwrap().1;
        let header = format!("t={NOW},v1=deadbeef,v1={v1},v0=ignored");
        assert!(client().verify_webhook_at(PAYLOAD, &header, NOW).is_ok());
    }

    #[test]
    fn test_webhook_signature_tampered_payload() {
        let header = sign(NOW, PAYLOAD);
        let tampered = PAYLOAD.replace("2598", "1");
        let result = client().verify_webhook_at(&tampered, &header, NOW);
        assert!(matches!(result, Err(StripeError::InvalidSignature(_))));
    }

    #[test]
    fn test_webhook_signature_stale_timestamp() {
        let header = sign(NOW, PAYLOAD);
        let result = client().verify_webhook_at(PAYLOAD, &header, NOW + WEBHOOK_TOLERANCE_SECS + 1);
        assert!(matches!(result, Err(StripeError::InvalidSignature(_))));
    }

    #[test]
    fn test_webhook_signature_malformed_header() {
        let c = client();
        assert!(c.verify_webhook_at(PAYLOAD, "", NOW).is_err());
        assert!(c.verify_webhook_at(PAYLOAD, "v1=abc", NOW).is_err());
        assert!(c.verify_webhook_at(PAYLOAD, "t=soon,v1=abc", NOW).is_err());
    }

    #[test]
    fn test_payment_intent_to_attempt() {
        let intent: PaymentIntent = serde_json::from_value(serde_json::json!({
            "id": "pi_9",
            "client_secret": null,
            "status": "requires_payment_method",
            "amount": 1299,
            "last_payment_error": {"type": "card_error", "message": "Your card was declined."}
        }))
        .unwrap();

        let attempt = PaymentAttempt::from(intent);
        assert_eq!(attempt.status, PaymentStatus::RequiresPaymentMethod);
        assert_eq!(
            attempt.last_error,
            Some(PaymentFailure {
                kind: PaymentErrorKind::CardError,
                message: Some("Your card was declined.".to_string()),
            })
        );
        assert_eq!(attempt.redirect_url, None);
    }

    #[test]
    fn test_payment_intent_redirect() {
        let intent: PaymentIntent = serde_json::from_value(serde_json::json!({
            "id": "pi_9",
            "status": "requires_action",
            "amount": 1299,
            "next_action": {"type": "redirect_to_url", "redirect_to_url": {"url": "https://hooks.stripe.com/3ds"}}
        }))
        .unwrap();

        let attempt = PaymentAttempt::from(intent);
        assert_eq!(attempt.redirect_url.as_deref(), Some("https://hooks.stripe.com/3ds"));
    }

    #[test]
    fn test_is_payment_intent_id() {
        assert!(is_payment_intent_id("pi_3MtwBwLkdIwHu7ix28a3tqPa"));
        assert!(!is_payment_intent_id("pi_"));
        assert!(!is_payment_intent_id("cus_123"));
        assert!(!is_payment_intent_id("pi_../../v1/charges"));
    }
}

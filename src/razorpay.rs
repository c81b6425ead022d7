// ==================== RAZORPAY GATEWAY ADAPTER ====================
// Order creation plus HMAC-SHA256 authenticity checks for client-confirmed
// payments and webhook deliveries. Webhook verification MUST run over the
// raw request body bytes before any parsing.

use crate::utils::error::AppError;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::env;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const RAZORPAY_API_BASE: &str = "https://api.razorpay.com/v1";
const ORDER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: Option<String>,
}

impl RazorpayConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let key_id = env::var("RAZORPAY_KEY_ID").ok().filter(|v| !v.is_empty());
        let key_secret = env::var("RAZORPAY_KEY_SECRET").ok().filter(|v| !v.is_empty());

        match (key_id, key_secret) {
            (Some(key_id), Some(key_secret)) => Ok(Self {
                key_id,
                key_secret,
                webhook_secret: env::var("RAZORPAY_WEBHOOK_SECRET")
                    .ok()
                    .filter(|v| !v.is_empty()),
            }),
            _ => Err(AppError::ConfigError(
                "Razorpay configuration missing. Please set RAZORPAY_KEY_ID and RAZORPAY_KEY_SECRET".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, utoipa::ToSchema)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: i64, // minor units (paise)
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

pub struct RazorpayClient {
    config: RazorpayConfig,
    http: reqwest::Client,
}

impl RazorpayClient {
    pub fn new(config: RazorpayConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    pub fn from_env(http: reqwest::Client) -> Result<Self, AppError> {
        Ok(Self::new(RazorpayConfig::from_env()?, http))
    }

    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    /// Creates a payment order. Amount arrives in whole currency units and is
    /// converted to minor units before submission.
    pub async fn create_order(
        &self,
        plan_amount: i64,
        receipt: &str,
    ) -> Result<RazorpayOrder, AppError> {
        let body = serde_json::json!({
            "amount": plan_amount * 100, // Razorpay expects amount in paise
            "currency": "INR",
            "receipt": receipt,
            "payment_capture": 1,
        });

        let response = self
            .http
            .post(format!("{}/orders", RAZORPAY_API_BASE))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .timeout(ORDER_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout("Razorpay order creation timed out".to_string())
                } else {
                    AppError::GatewayError(format!("Failed to reach Razorpay: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            log::error!("❌ Razorpay order creation failed ({}): {}", status, detail);
            return Err(AppError::GatewayError(format!(
                "Razorpay order creation failed with status {}",
                status
            )));
        }

        response
            .json::<RazorpayOrder>()
            .await
            .map_err(|e| AppError::GatewayError(format!("Invalid Razorpay order response: {}", e)))
    }

    /// Checks a client-confirmed payment: HMAC-SHA256 over "orderId|paymentId"
    /// with the key secret. Returns false on mismatch, never an error.
    pub fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> bool {
        let text = format!("{}|{}", order_id, payment_id);
        let expected = hmac_sha256_hex(self.config.key_secret.as_bytes(), text.as_bytes());
        constant_time_eq(expected.as_bytes(), signature.as_bytes())
    }

    /// Checks a webhook delivery over the exact raw body bytes with the
    /// dedicated webhook secret. An unset secret also yields false.
    pub fn verify_webhook_signature(&self, raw_body: &[u8], signature: &str) -> bool {
        let secret = match &self.config.webhook_secret {
            Some(secret) => secret,
            None => {
                log::error!("❌ Razorpay webhook secret not configured");
                return false;
            }
        };
        let expected = hmac_sha256_hex(secret.as_bytes(), raw_body);
        constant_time_eq(expected.as_bytes(), signature.as_bytes())
    }
}

/// Gateway wiring mirrored at startup; stays None when credentials are
/// absent so the rest of the service keeps running
pub struct RazorpayState {
    client: Option<RazorpayClient>,
}

impl RazorpayState {
    pub fn from_env(http: reqwest::Client) -> Self {
        match RazorpayClient::from_env(http) {
            Ok(client) => Self {
                client: Some(client),
            },
            Err(e) => {
                log::warn!("⚠️  Razorpay not configured: {}", e);
                Self { client: None }
            }
        }
    }

    pub fn require(&self) -> Result<&RazorpayClient, AppError> {
        self.client.as_ref().ok_or_else(|| {
            AppError::ConfigError(
                "Razorpay is not configured. Please set up environment variables".to_string(),
            )
        })
    }
}

fn hmac_sha256_hex(secret: &[u8], data: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// ==================== RECEIPT TOKENS ====================

/// Receipt token carried on the gateway order. The webhook resolves buyers
/// through the subscription_orders mapping; this token is only parsed back
/// as a fallback for orders created before the mapping existed.
pub fn generate_receipt_id(user_id: &str, plan_amount: i64) -> String {
    let timestamp = chrono::Utc::now().timestamp_millis();
    format!("receipt_{}_{}_{}", user_id, plan_amount, timestamp)
}

/// Fallback decoder. Splits from the right so user ids containing the
/// delimiter (e.g. "user_2abc") survive.
pub fn parse_receipt_id(receipt: &str) -> Option<(String, i64)> {
    let rest = receipt.strip_prefix("receipt_")?;
    let mut parts = rest.rsplitn(3, '_');
    let _timestamp = parts.next()?;
    let plan_amount: i64 = parts.next()?.parse().ok()?;
    let user_id = parts.next()?;
    if user_id.is_empty() || plan_amount < 1 {
        return None;
    }
    Some((user_id.to_string(), plan_amount))
}

// ==================== WEBHOOK PAYLOAD ====================

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Deserialize, Default)]
pub struct WebhookPayload {
    #[serde(default)]
    pub payment: Option<WebhookEntity<PaymentEntity>>,
    #[serde(default)]
    pub order: Option<WebhookEntity<OrderEntity>>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEntity<T> {
    pub entity: T,
}

#[derive(Debug, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub created_at: i64, // Unix timestamp
}

#[derive(Debug, Deserialize)]
pub struct OrderEntity {
    pub id: String,
    #[serde(default)]
    pub receipt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> RazorpayClient {
        RazorpayClient::new(
            RazorpayConfig {
                key_id: "rzp_test_key".to_string(),
                key_secret: "test_key_secret".to_string(),
                webhook_secret: Some("test_webhook_secret".to_string()),
            },
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_payment_signature_roundtrip() {
        let client = test_client();
        let signature = hmac_sha256_hex(b"test_key_secret", b"order_123|pay_456");
        assert!(client.verify_payment_signature("order_123", "pay_456", &signature));
    }

    #[test]
    fn test_payment_signature_mismatch() {
        let client = test_client();
        let signature = hmac_sha256_hex(b"wrong_secret", b"order_123|pay_456");
        assert!(!client.verify_payment_signature("order_123", "pay_456", &signature));
        assert!(!client.verify_payment_signature("order_123", "pay_456", "garbage"));
    }

    #[test]
    fn test_webhook_signature_valid() {
        let client = test_client();
        let body = br#"{"event":"payment.captured","payload":{}}"#;
        let signature = hmac_sha256_hex(b"test_webhook_secret", body);
        assert!(client.verify_webhook_signature(body, &signature));
    }

    #[test]
    fn test_webhook_signature_rejects_tampered_body() {
        let client = test_client();
        let body = br#"{"event":"payment.captured","amount":100}"#;
        let signature = hmac_sha256_hex(b"test_webhook_secret", body);
        let tampered = br#"{"event":"payment.captured","amount":999}"#;
        assert!(!client.verify_webhook_signature(tampered, &signature));
    }

    #[test]
    fn test_webhook_signature_false_when_secret_unset() {
        let client = RazorpayClient::new(
            RazorpayConfig {
                key_id: "rzp_test_key".to_string(),
                key_secret: "test_key_secret".to_string(),
                webhook_secret: None,
            },
            reqwest::Client::new(),
        );
        let body = b"anything";
        let signature = hmac_sha256_hex(b"test_webhook_secret", body);
        assert!(!client.verify_webhook_signature(body, &signature));
    }

    #[test]
    fn test_receipt_roundtrip() {
        let receipt = generate_receipt_id("user_2NxIrF8z", 5);
        let (user_id, plan_amount) = parse_receipt_id(&receipt).expect("parse");
        assert_eq!(user_id, "user_2NxIrF8z");
        assert_eq!(plan_amount, 5);
    }

    #[test]
    fn test_receipt_parse_rejects_garbage() {
        assert!(parse_receipt_id("not_a_receipt").is_none());
        assert!(parse_receipt_id("receipt_user_abc_notanumber_123").is_none());
        assert!(parse_receipt_id("").is_none());
    }

    #[test]
    fn test_webhook_payload_deserializes() {
        let body = r#"{
            "event": "payment.captured",
            "payload": {
                "payment": {"entity": {"id": "pay_1", "amount": 500, "currency": "INR", "status": "captured", "created_at": 1700000000}},
                "order": {"entity": {"id": "order_1", "receipt": "receipt_user_2a_5_1700000000000"}}
            }
        }"#;
        let event: WebhookEvent = serde_json::from_str(body).expect("deserialize");
        assert_eq!(event.event, "payment.captured");
        let payment = event.payload.payment.expect("payment").entity;
        assert_eq!(payment.id, "pay_1");
        let order = event.payload.order.expect("order").entity;
        assert_eq!(order.receipt.as_deref(), Some("receipt_user_2a_5_1700000000000"));
    }
}

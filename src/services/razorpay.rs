use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;

use crate::config::Config;

const ORDERS_URL: &str = "https://api.razorpay.com/v1/orders";

#[derive(Debug, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

pub struct RazorpayService;

impl RazorpayService {
    fn key_id() -> Result<String, String> {
        Config::razorpay_key_id().ok_or_else(|| "RAZORPAY_KEY_ID not configured".to_string())
    }

    fn key_secret() -> Result<String, String> {
        Config::razorpay_key_secret().ok_or_else(|| "RAZORPAY_KEY_SECRET not configured".to_string())
    }

    pub fn public_key() -> Option<String> {
        Config::razorpay_key_id()
    }

    /// Creates an order for `amount` paise.
    pub async fn create_order(amount: i64, receipt: &str) -> Result<RazorpayOrder, String> {
        let client = Client::new();

        let res = client
            .post(ORDERS_URL)
            .basic_auth(Self::key_id()?, Some(Self::key_secret()?))
            .json(&json!({
                "amount": amount,
                "currency": "INR",
                "receipt": receipt,
                "payment_capture": 1
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !res.status().is_success() {
            return Err(res.text().await.unwrap_or_else(|_| "Razorpay error".to_string()));
        }

        res.json().await.map_err(|e| e.to_string())
    }

    pub fn verify_payment(order_id: &str, payment_id: &str, signature: &str) -> Result<bool, String> {
        let secret = Self::key_secret()?;
        Ok(verify_signature(&secret, order_id, payment_id, signature))
    }
}

/// Checks the checkout signature: hex HMAC-SHA256 of `order_id|payment_id`.
pub fn verify_signature(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let payload = format!("{}|{}", order_id, payment_id);
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload.as_bytes());

    match hex::decode(signature) {
        Ok(bytes) => mac.verify_slice(&bytes).is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, order_id: &str, payment_id: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn valid_signature_is_accepted() {
        let sig = sign("secret", "order_ABC", "pay_123");
        assert_eq!(sig.len(), 64);
        assert!(verify_signature("secret", "order_ABC", "pay_123", &sig));
    }

    #[test]
    fn wrong_secret_or_ids_are_rejected() {
        let sig = sign("secret", "order_ABC", "pay_123");
        assert!(!verify_signature("other", "order_ABC", "pay_123", &sig));
        assert!(!verify_signature("secret", "order_ABD", "pay_123", &sig));
        assert!(!verify_signature("secret", "order_ABC", "pay_124", &sig));
    }

    #[test]
    fn malformed_signature_is_rejected() {
        assert!(!verify_signature("secret", "order_ABC", "pay_123", "not-hex"));
        assert!(!verify_signature("secret", "order_ABC", "pay_123", ""));
    }
}

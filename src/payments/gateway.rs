//! Provider-agnostic view of the payment gateway.
//!
//! The gateway is consulted for four things: a bearer token, registration of
//! our IPN endpoint, order submission, and the authoritative status of an
//! order. Notification payloads are never trusted; they only tell us which
//! order to re-query.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Short-lived bearer token. Debug output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BillingAddress {
    pub phone_number: String,
    pub email_address: String,
    pub country_code: String,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
}

impl BillingAddress {
    pub fn new(full_name: &str, phone_number: &str, email: Option<&str>, country_code: &str) -> Self {
        let (first_name, middle_name, last_name) = split_full_name(full_name);
        Self {
            phone_number: phone_number.to_string(),
            email_address: email.unwrap_or_default().to_string(),
            country_code: country_code.to_string(),
            first_name,
            middle_name,
            last_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OrderRequest {
    /// Caller-chosen idempotency key for this submission.
    pub merchant_reference: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub callback_url: String,
    pub notification_channel_id: String,
    pub billing_address: BillingAddress,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SubmittedOrder {
    pub order_tracking_id: String,
    pub merchant_reference: String,
    pub redirect_url: String,
}

/// The gateway's authoritative view of one order.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct TransactionStatus {
    #[serde(default)]
    pub status_description: Option<String>,
    #[serde(default)]
    pub confirmation_code: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub created_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayVerdict {
    Completed,
    Failed,
    /// Anything else: pending, invalid, reversed, or no description at all.
    Pending,
}

impl TransactionStatus {
    pub fn verdict(&self) -> GatewayVerdict {
        match self.status_description.as_deref().map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("completed") => GatewayVerdict::Completed,
            Some(s) if s.eq_ignore_ascii_case("failed") => GatewayVerdict::Failed,
            _ => GatewayVerdict::Pending,
        }
    }

    /// When the gateway says the money moved. `None` if absent or unparseable.
    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_date.as_deref()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn get_access_token(&self) -> Result<AccessToken, GatewayError>;

    /// Returns the notification channel id to embed in submitted orders.
    async fn register_notification_endpoint(
        &self,
        token: &AccessToken,
        url: &str,
    ) -> Result<String, GatewayError>;

    async fn submit_order(
        &self,
        token: &AccessToken,
        order: &OrderRequest,
    ) -> Result<SubmittedOrder, GatewayError>;

    async fn get_transaction_status(
        &self,
        token: &AccessToken,
        order_tracking_id: &str,
    ) -> Result<TransactionStatus, GatewayError>;
}

/// Split a display name into first, middle and last parts.
pub fn split_full_name(full_name: &str) -> (String, String, String) {
    let parts: Vec<&str> = full_name.split_whitespace().collect();
    match parts.as_slice() {
        [] => (String::new(), String::new(), String::new()),
        [only] => (only.to_string(), String::new(), String::new()),
        [first, last] => (first.to_string(), String::new(), last.to_string()),
        [first, middle @ .., last] => {
            (first.to_string(), middle.join(" "), last.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(desc: &str) -> TransactionStatus {
        TransactionStatus {
            status_description: Some(desc.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn verdict_maps_only_final_descriptions() {
        assert_eq!(status("Completed").verdict(), GatewayVerdict::Completed);
        assert_eq!(status("COMPLETED").verdict(), GatewayVerdict::Completed);
        assert_eq!(status("Failed").verdict(), GatewayVerdict::Failed);
        assert_eq!(status("Invalid").verdict(), GatewayVerdict::Pending);
        assert_eq!(status("Reversed").verdict(), GatewayVerdict::Pending);
        assert_eq!(TransactionStatus::default().verdict(), GatewayVerdict::Pending);
    }

    #[test]
    fn names_split_into_three_parts() {
        assert_eq!(
            split_full_name("Amina Wanjiru Otieno Kamau"),
            ("Amina".into(), "Wanjiru Otieno".into(), "Kamau".into())
        );
        assert_eq!(split_full_name("Amina Kamau"), ("Amina".into(), "".into(), "Kamau".into()));
        assert_eq!(split_full_name("Amina"), ("Amina".into(), "".into(), "".into()));
        assert_eq!(split_full_name("   "), ("".into(), "".into(), "".into()));
    }

    #[test]
    fn paid_at_accepts_gateway_timestamps() {
        let mut s = status("Completed");
        s.created_date = Some("2024-03-01T10:15:30.123".to_string());
        assert!(s.paid_at().is_some());
        s.created_date = Some("2024-03-01T10:15:30+03:00".to_string());
        assert_eq!(s.paid_at().map(|d| d.to_rfc3339()), Some("2024-03-01T07:15:30+00:00".to_string()));
        s.created_date = Some("yesterday".to_string());
        assert!(s.paid_at().is_none());
    }

    #[test]
    fn status_response_parses_numeric_amount() {
        let parsed: TransactionStatus = serde_json::from_str(
            r#"{"status_description":"Completed","confirmation_code":"CNF-9","payment_method":"MpesaKE","amount":500.0,"currency":"KES","created_date":"2024-03-01T10:15:30.123"}"#,
        )
        .unwrap();
        assert_eq!(parsed.amount, Some(Decimal::from(500)));
        assert_eq!(parsed.confirmation_code.as_deref(), Some("CNF-9"));
    }
}

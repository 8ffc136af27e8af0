use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

use crate::{
    config::NotificationConfig,
    error::{AppError, Result},
    integrations::{Integration, PaymentEvent},
};

type HmacSha256 = Hmac<Sha256>;

/// POSTs every payment event as JSON to an operator-configured URL.
///
/// When a secret is configured the body is signed and the hex HMAC-SHA256 is
/// sent in `X-Webhook-Signature`.
pub struct WebhookIntegration {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl WebhookIntegration {
    pub fn new(config: &NotificationConfig) -> Option<Self> {
        let url = config.webhook_url.clone().filter(|u| !u.is_empty())?;
        if !url.starts_with("https://") {
            tracing::warn!("Payment webhook {} does not use HTTPS", url);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .ok()?;

        Some(Self {
            client,
            url,
            secret: config.webhook_secret.clone().filter(|s| !s.is_empty()),
        })
    }
}

pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[async_trait]
impl Integration for WebhookIntegration {
    fn name(&self) -> &str {
        "Webhook"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn health_check(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(AppError::Internal("Webhook URL not configured".to_string()));
        }
        Ok(())
    }

    async fn handle_event(&self, event: &PaymentEvent) -> Result<()> {
        let body = serde_json::to_vec(event)
            .map_err(|e| AppError::Internal(format!("Webhook payload: {}", e)))?;

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json");

        if let Some(secret) = &self.secret {
            request = request.header("X-Webhook-Signature", sign(secret.as_bytes(), &body));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::External(format!("Webhook delivery failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::External(format!(
                "Webhook returned HTTP {}",
                response.status().as_u16()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_hex_sha256() {
        let sig = sign(b"secret", b"{}");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(sig, sign(b"other", b"{}"));
    }

    #[test]
    fn disabled_without_url() {
        assert!(WebhookIntegration::new(&NotificationConfig::default()).is_none());
        let config = NotificationConfig {
            webhook_url: Some("https://hooks.example.org/payments".to_string()),
            webhook_secret: None,
        };
        assert!(WebhookIntegration::new(&config).is_some());
    }
}

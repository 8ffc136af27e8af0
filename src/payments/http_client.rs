use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use std::time::Duration;

use crate::{
    config::GatewayConfig,
    error::GatewayError,
    payments::gateway::{AccessToken, OrderRequest, PaymentGateway, SubmittedOrder, TransactionStatus},
};

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

#[derive(Deserialize)]
struct RegisterResponse {
    notification_channel_id: Option<String>,
}

#[derive(Deserialize)]
struct SubmitResponse {
    order_tracking_id: Option<String>,
    merchant_reference: Option<String>,
    redirect_url: Option<String>,
}

/// HTTP client for the payment gateway.
///
/// Stateless apart from the connection pool. Every request carries the
/// configured timeout and nothing is retried here.
pub struct HttpGatewayClient {
    http: Client,
    config: GatewayConfig,
}

impl HttpGatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> Result<String, GatewayError> {
        let base = self.config.base_url.trim_end_matches('/');
        if base.is_empty() {
            return Err(GatewayError::Configuration("gateway base URL not configured".to_string()));
        }
        Ok(format!("{}/{}", base, path))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, operation: &str) -> Result<T, GatewayError> {
        let response = request
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Gateway {} request failed: {}", operation, e);
                GatewayError::Transient(format!("{}: {}", operation, describe_send_error(&e)))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Gateway {} failed: {} - {}", operation, status, body);
            return Err(classify_status(operation, status));
        }

        response.json::<T>().await.map_err(|e| {
            tracing::error!("Gateway {} returned an unreadable body: {}", operation, e);
            GatewayError::Protocol(format!("{}: {}", operation, e))
        })
    }
}

fn describe_send_error(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "request timeout"
    } else if e.is_connect() {
        "connection failed"
    } else {
        "network error"
    }
}

fn classify_status(operation: &str, status: StatusCode) -> GatewayError {
    if status.is_server_error() {
        GatewayError::Transient(format!("{}: HTTP {}", operation, status.as_u16()))
    } else {
        GatewayError::Auth(format!("{}: HTTP {}", operation, status.as_u16()))
    }
}

fn required(value: Option<String>, operation: &str, field: &str) -> Result<String, GatewayError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GatewayError::Protocol(format!("{}: missing {}", operation, field)))
}

#[async_trait]
impl PaymentGateway for HttpGatewayClient {
    async fn get_access_token(&self) -> Result<AccessToken, GatewayError> {
        let (key, secret) = match (&self.config.consumer_key, &self.config.consumer_secret) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => (key, secret),
            _ => {
                tracing::error!("Gateway credentials not configured");
                return Err(GatewayError::Configuration("credentials not configured".to_string()));
            }
        };

        let request = self
            .http
            .post(self.endpoint("auth/token")?)
            .json(&json!({ "key": key, "secret": secret }));

        let response: TokenResponse = self.send(request, "auth/token").await?;
        required(response.token, "auth/token", "token").map(AccessToken::new)
    }

    async fn register_notification_endpoint(
        &self,
        token: &AccessToken,
        url: &str,
    ) -> Result<String, GatewayError> {
        let request = self
            .http
            .post(self.endpoint("urls/register")?)
            .bearer_auth(token.as_str())
            .json(&json!({
                "url": url,
                "notification_kind": self.config.notification_kind,
            }));

        let response: RegisterResponse = self.send(request, "urls/register").await?;
        required(response.notification_channel_id, "urls/register", "notification_channel_id")
    }

    async fn submit_order(
        &self,
        token: &AccessToken,
        order: &OrderRequest,
    ) -> Result<SubmittedOrder, GatewayError> {
        let request = self
            .http
            .post(self.endpoint("orders/submit")?)
            .bearer_auth(token.as_str())
            .json(order);

        let response: SubmitResponse = self.send(request, "orders/submit").await?;
        Ok(SubmittedOrder {
            order_tracking_id: required(response.order_tracking_id, "orders/submit", "order_tracking_id")?,
            merchant_reference: response
                .merchant_reference
                .unwrap_or_else(|| order.merchant_reference.clone()),
            redirect_url: required(response.redirect_url, "orders/submit", "redirect_url")?,
        })
    }

    async fn get_transaction_status(
        &self,
        token: &AccessToken,
        order_tracking_id: &str,
    ) -> Result<TransactionStatus, GatewayError> {
        let request = self
            .http
            .get(self.endpoint("transactions/status")?)
            .bearer_auth(token.as_str())
            .query(&[("order_tracking_id", order_tracking_id)]);

        self.send(request, "transactions/status").await
    }
}

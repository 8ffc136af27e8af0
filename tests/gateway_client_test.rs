use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use clubpay::{
    config::GatewayConfig,
    error::GatewayError,
    payments::{AccessToken, BillingAddress, GatewayVerdict, HttpGatewayClient, OrderRequest, PaymentGateway},
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// What the stand-in gateway was sent.
#[derive(Default)]
struct Received {
    token_bodies: Vec<Value>,
    bearer_tokens: Vec<String>,
    register_bodies: Vec<Value>,
    orders: Vec<Value>,
    status_queries: Vec<HashMap<String, String>>,
}

type Shared = Arc<Mutex<Received>>;

fn bearer(headers: &HeaderMap, received: &Shared) -> Result<(), StatusCode> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    received.lock().unwrap().bearer_tokens.push(value.clone());
    if value == "Bearer T" {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

async fn token(State(received): State<Shared>, Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    received.lock().unwrap().token_bodies.push(body.clone());
    if body == json!({ "key": "ck", "secret": "cs" }) {
        Ok(Json(json!({ "token": "T", "expiryDate": "2030-01-01T00:00:00Z" })))
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

async fn register(
    State(received): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    bearer(&headers, &received)?;
    received.lock().unwrap().register_bodies.push(body);
    Ok(Json(json!({ "notification_channel_id": "IPN-1" })))
}

async fn submit(
    State(received): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    bearer(&headers, &received)?;
    received.lock().unwrap().orders.push(body.clone());
    match body["merchant_reference"].as_str() {
        Some("NO-REDIRECT") => Ok(Json(json!({ "order_tracking_id": "OT-9" }))),
        Some("NO-TRACKING-ID") => Ok(Json(json!({ "redirect_url": "https://pay.test/x" }))),
        Some(reference) => Ok(Json(json!({
            "order_tracking_id": "OT-1",
            "merchant_reference": reference,
            "redirect_url": "https://pay.test/checkout/OT-1",
        }))),
        None => Err(StatusCode::BAD_REQUEST),
    }
}

async fn status(
    State(received): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    bearer(&headers, &received)?;
    received.lock().unwrap().status_queries.push(query.clone());
    match query.get("order_tracking_id").map(String::as_str) {
        Some("OT-1") => Ok(Json(json!({
            "status_description": "Completed",
            "confirmation_code": "CNF-9",
            "payment_method": "MpesaKE",
            "amount": 500.0,
            "currency": "KES",
            "created_date": "2024-03-01T10:15:30.123",
        }))),
        Some("OT-DOWN") => Err(StatusCode::INTERNAL_SERVER_ERROR),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn start_gateway() -> anyhow::Result<(SocketAddr, Shared)> {
    let received = Shared::default();
    let app = Router::new()
        .route("/api/auth/token", post(token))
        .route("/api/urls/register", post(register))
        .route("/api/orders/submit", post(submit))
        .route("/api/transactions/status", get(status))
        .with_state(received.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((addr, received))
}

fn client_for(base_url: String, secret: &str) -> anyhow::Result<HttpGatewayClient> {
    Ok(HttpGatewayClient::new(GatewayConfig {
        base_url,
        consumer_key: Some("ck".to_string()),
        consumer_secret: Some(secret.to_string()),
        timeout_secs: 5,
        ..GatewayConfig::default()
    })?)
}

fn order(merchant_reference: &str) -> OrderRequest {
    OrderRequest {
        merchant_reference: merchant_reference.to_string(),
        amount: dec!(500.00),
        currency: "KES".to_string(),
        description: "Event registration payment for Spring Hackathon".to_string(),
        callback_url: "https://clubs.test/payments/gateway/callback".to_string(),
        notification_channel_id: "IPN-1".to_string(),
        billing_address: BillingAddress::new("Amina Wanjiru Kamau", "0712345678", None, "KE"),
    }
}

#[tokio::test]
async fn test_full_checkout_exchange() -> anyhow::Result<()> {
    let (addr, received) = start_gateway().await?;
    let client = client_for(format!("http://{}/api/", addr), "cs")?;

    let token = client.get_access_token().await?;
    assert_eq!(token.as_str(), "T");

    let channel = client
        .register_notification_endpoint(&token, "https://clubs.test/payments/gateway/ipn")
        .await?;
    assert_eq!(channel, "IPN-1");

    let submitted = client.submit_order(&token, &order("PAYMENT_1_1700000000")).await?;
    assert_eq!(submitted.order_tracking_id, "OT-1");
    assert_eq!(submitted.merchant_reference, "PAYMENT_1_1700000000");
    assert_eq!(submitted.redirect_url, "https://pay.test/checkout/OT-1");

    let status = client.get_transaction_status(&token, "OT-1").await?;
    assert_eq!(status.verdict(), GatewayVerdict::Completed);
    assert_eq!(status.confirmation_code.as_deref(), Some("CNF-9"));
    assert_eq!(status.payment_method.as_deref(), Some("MpesaKE"));
    assert_eq!(status.amount, Some(dec!(500)));
    assert!(status.paid_at().is_some());

    let received = received.lock().unwrap();
    assert_eq!(received.token_bodies, vec![json!({ "key": "ck", "secret": "cs" })]);
    assert_eq!(received.bearer_tokens, vec!["Bearer T".to_string(); 3]);
    assert_eq!(
        received.register_bodies,
        vec![json!({ "url": "https://clubs.test/payments/gateway/ipn", "notification_kind": "GET" })]
    );
    assert_eq!(
        received.status_queries[0].get("order_tracking_id").map(String::as_str),
        Some("OT-1")
    );

    let sent = &received.orders[0];
    assert_eq!(sent["amount"].as_f64(), Some(500.0));
    assert_eq!(sent["currency"], "KES");
    assert_eq!(sent["notification_channel_id"], "IPN-1");
    assert_eq!(sent["callback_url"], "https://clubs.test/payments/gateway/callback");
    assert_eq!(sent["billing_address"]["first_name"], "Amina");
    assert_eq!(sent["billing_address"]["middle_name"], "Wanjiru");
    assert_eq!(sent["billing_address"]["last_name"], "Kamau");
    assert_eq!(sent["billing_address"]["phone_number"], "0712345678");
    Ok(())
}

#[tokio::test]
async fn test_rejected_credentials_are_auth_errors() -> anyhow::Result<()> {
    let (addr, _) = start_gateway().await?;
    let client = client_for(format!("http://{}/api", addr), "wrong")?;

    let err = client.get_access_token().await.unwrap_err();
    assert_eq!(err, GatewayError::Auth("auth/token: HTTP 401".to_string()));

    // A stale token is rejected the same way.
    let err = client
        .get_transaction_status(&AccessToken::new("expired"), "OT-1")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Auth(_)), "got {:?}", err);
    Ok(())
}

#[tokio::test]
async fn test_status_errors_are_classified() -> anyhow::Result<()> {
    let (addr, _) = start_gateway().await?;
    let client = client_for(format!("http://{}/api", addr), "cs")?;
    let token = client.get_access_token().await?;

    let err = client.get_transaction_status(&token, "OT-DOWN").await.unwrap_err();
    assert!(matches!(err, GatewayError::Transient(_)), "got {:?}", err);

    let err = client.get_transaction_status(&token, "OT-UNKNOWN").await.unwrap_err();
    assert!(matches!(err, GatewayError::Auth(_)), "got {:?}", err);
    Ok(())
}

#[tokio::test]
async fn test_incomplete_submit_response_is_a_protocol_error() -> anyhow::Result<()> {
    let (addr, _) = start_gateway().await?;
    let client = client_for(format!("http://{}/api", addr), "cs")?;
    let token = client.get_access_token().await?;

    for reference in ["NO-REDIRECT", "NO-TRACKING-ID"] {
        let err = client.submit_order(&token, &order(reference)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)), "{}: got {:?}", reference, err);
    }
    Ok(())
}

#[tokio::test]
async fn test_unreachable_gateway_is_transient() -> anyhow::Result<()> {
    // Bind then release a port so nothing is listening on it.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let client = client_for(format!("http://{}/api", addr), "cs")?;
    let err = client.get_access_token().await.unwrap_err();
    assert!(matches!(err, GatewayError::Transient(_)), "got {:?}", err);
    Ok(())
}

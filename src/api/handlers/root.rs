use axum::{http::StatusCode, Json, response::IntoResponse};
use serde_json::json;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Clubpay",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Payment initiation and gateway reconciliation for club memberships and events",
        "endpoints": {
            "health": "/health",
            "payments": "/payments",
            "admin": "/admin/payments"
        }
    }))
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use crate::{
    api::{
        handlers::payments::{PaymentDto, ReconciliationDto},
        state::AppState,
    },
    domain::PaymentStatus,
    error::Result,
    service::SweepReport,
};

pub async fn list_all(State(state): State<AppState>) -> Result<Json<Vec<PaymentDto>>> {
    let payments = state.service_context.payment_repo.list(None).await?;
    Ok(Json(payments.into_iter().map(Into::into).collect()))
}

pub async fn list_pending(State(state): State<AppState>) -> Result<Json<Vec<PaymentDto>>> {
    let payments = state
        .service_context
        .payment_repo
        .list(Some(PaymentStatus::Pending))
        .await?;
    Ok(Json(payments.into_iter().map(Into::into).collect()))
}

pub async fn mark_completed(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ReconciliationDto>> {
    let result = state
        .service_context
        .reconciliation_service
        .mark_completed(id)
        .await?;
    Ok(Json(result.into()))
}

pub async fn mark_failed(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ReconciliationDto>> {
    let result = state
        .service_context
        .reconciliation_service
        .mark_failed(id)
        .await?;
    Ok(Json(result.into()))
}

/// Runs the pending-expiry sweep now instead of waiting for the timer.
pub async fn expire_now(State(state): State<AppState>) -> Result<Json<SweepReport>> {
    let report = state.service_context.expiry_service.sweep(Utc::now()).await?;
    Ok(Json(report))
}

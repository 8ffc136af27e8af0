use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Redirect,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    api::state::AppState,
    config::ReturnPages,
    domain::{NotificationChannel, Payment, PaymentPurpose, PaymentStatus, ReconcileOutcome, Reconciliation},
    error::{AppError, Result},
    service::{InitiatePaymentRequest, InitiatedPayment},
};

#[derive(Debug, Serialize)]
pub struct PaymentDto {
    pub id: i64,
    pub amount: String,
    pub purpose: PaymentPurpose,
    pub related_id: i64,
    pub payer_id: i64,
    pub status: PaymentStatus,
    pub payment_method: Option<String>,
    pub receipt_number: Option<String>,
    pub payment_date: Option<String>,
    pub is_manual: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Payment> for PaymentDto {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            amount: payment.amount.to_string(),
            purpose: payment.purpose,
            related_id: payment.related_id,
            payer_id: payment.payer_id,
            status: payment.status,
            payment_method: payment.payment_method,
            receipt_number: payment.receipt_number,
            payment_date: payment.payment_date.map(|dt| dt.to_rfc3339()),
            is_manual: payment.is_manual,
            created_at: payment.created_at.to_rfc3339(),
            updated_at: payment.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReconciliationDto {
    pub outcome: &'static str,
    pub payment: PaymentDto,
}

impl From<Reconciliation> for ReconciliationDto {
    fn from(r: Reconciliation) -> Self {
        Self {
            outcome: outcome_label(r.outcome),
            payment: r.payment.into(),
        }
    }
}

pub fn outcome_label(outcome: ReconcileOutcome) -> &'static str {
    match outcome {
        ReconcileOutcome::Transitioned(_) => "transitioned",
        ReconcileOutcome::AlreadyTerminal(_) => "unchanged",
        ReconcileOutcome::StillPending => "pending",
    }
}

/// Query (or POST body) of both gateway notification channels.
#[derive(Debug, Default, Deserialize)]
pub struct NotificationParams {
    #[serde(
        default,
        rename = "orderTrackingId",
        alias = "OrderTrackingId",
        alias = "order_tracking_id"
    )]
    pub order_tracking_id: Option<String>,
}

impl NotificationParams {
    fn tracking_id(&self) -> Option<&str> {
        self.order_tracking_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct IpnAck {
    pub order_tracking_id: String,
    pub status: u16,
    pub outcome: &'static str,
}

pub async fn initiate(
    State(state): State<AppState>,
    Json(request): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<InitiatedPayment>)> {
    let initiated = state
        .service_context
        .payment_service
        .initiate(request)
        .await?;

    Ok((StatusCode::CREATED, Json(initiated)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PaymentDto>> {
    let payment = state
        .service_context
        .payment_repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

    Ok(Json(payment.into()))
}

pub async fn list_by_payer(
    State(state): State<AppState>,
    Path(payer_id): Path<i64>,
) -> Result<Json<Vec<PaymentDto>>> {
    let payments = state
        .service_context
        .payment_repo
        .find_by_payer(payer_id)
        .await?;

    Ok(Json(payments.into_iter().map(Into::into).collect()))
}

fn return_page(base: &str, payment_id: i64) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}payment_id={}", base, separator, payment_id)
}

fn page_for(pages: &ReturnPages, payment: &Payment) -> String {
    let base = match payment.status {
        PaymentStatus::Completed => &pages.success,
        PaymentStatus::Failed => &pages.failure,
        PaymentStatus::Pending => &pages.pending,
    };
    return_page(base, payment.id)
}

/// The payer's browser coming back from the hosted checkout. The query is
/// only a hint; the outcome comes from the gateway.
pub async fn gateway_callback(
    State(state): State<AppState>,
    Query(params): Query<NotificationParams>,
) -> Redirect {
    let pages = &state.settings.return_pages;

    let Some(order_tracking_id) = params.tracking_id() else {
        tracing::warn!("Payment callback without an order tracking id");
        return Redirect::to(&pages.history);
    };

    tracing::info!("Payment callback received for {}", order_tracking_id);

    match state
        .service_context
        .reconciliation_service
        .reconcile(order_tracking_id, NotificationChannel::Redirect)
        .await
    {
        Ok(result) => Redirect::to(&page_for(pages, &result.payment)),
        Err(AppError::NotFound(_)) => Redirect::to(&pages.history),
        Err(e) => {
            tracing::error!("Payment callback for {} could not be verified: {}", order_tracking_id, e);
            Redirect::to(&pages.pending)
        }
    }
}

/// Gateway push notification. Answers 200 whenever the notification was
/// processed, whatever the payment's resulting status.
pub async fn gateway_ipn(
    State(state): State<AppState>,
    Query(params): Query<NotificationParams>,
) -> Result<Json<IpnAck>> {
    process_ipn(&state, &params).await
}

/// POST variant; the tracking id may be in the query or a JSON body.
pub async fn gateway_ipn_post(
    State(state): State<AppState>,
    Query(params): Query<NotificationParams>,
    body: Option<Json<NotificationParams>>,
) -> Result<Json<IpnAck>> {
    if params.tracking_id().is_some() {
        return process_ipn(&state, &params).await;
    }
    let body = body.map(|Json(b)| b).unwrap_or_default();
    process_ipn(&state, &body).await
}

async fn process_ipn(state: &AppState, params: &NotificationParams) -> Result<Json<IpnAck>> {
    let order_tracking_id = params
        .tracking_id()
        .ok_or_else(|| AppError::BadRequest("Missing orderTrackingId".to_string()))?;

    tracing::info!("IPN received for {}", order_tracking_id);

    let result = state
        .service_context
        .reconciliation_service
        .reconcile(order_tracking_id, NotificationChannel::Ipn)
        .await?;

    Ok(Json(IpnAck {
        order_tracking_id: order_tracking_id.to_string(),
        status: 200,
        outcome: outcome_label(result.outcome),
    }))
}

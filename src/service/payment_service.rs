use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::{Validate, ValidationError};

use crate::{
    config::Settings,
    domain::*,
    error::{AppError, Result},
    payments::{BillingAddress, OrderRequest, PaymentGateway},
    repository::{CatalogRepository, PaymentRepository},
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InitiatePaymentRequest {
    /// "Membership" or "Event".
    pub purpose: String,
    pub related_id: i64,
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    pub payer_id: i64,
    #[validate(custom(function = "not_blank"))]
    pub phone_number: String,
    #[validate(custom(function = "not_blank"))]
    pub customer_name: String,
    #[validate(email)]
    pub email: Option<String>,
}

fn positive_amount(amount: &Decimal) -> std::result::Result<(), ValidationError> {
    if amount.is_sign_negative() || amount.is_zero() {
        return Err(ValidationError::new("amount_must_be_positive"));
    }
    Ok(())
}

fn not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("required"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InitiatedPayment {
    pub payment_id: i64,
    pub order_tracking_id: String,
    pub redirect_url: String,
}

/// Idempotency key sent with an order: the payment id plus the submission time.
pub fn merchant_reference(payment_id: i64, submitted_at: DateTime<Utc>) -> String {
    format!("PAYMENT_{}_{}", payment_id, submitted_at.timestamp())
}

/// Creates payments and opens their gateway checkout session.
pub struct PaymentService {
    payment_repo: Arc<dyn PaymentRepository>,
    catalog_repo: Arc<dyn CatalogRepository>,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
    country_code: String,
    callback_url: String,
    ipn_url: String,
}

impl PaymentService {
    pub fn new(
        payment_repo: Arc<dyn PaymentRepository>,
        catalog_repo: Arc<dyn CatalogRepository>,
        gateway: Arc<dyn PaymentGateway>,
        settings: &Settings,
    ) -> Self {
        Self {
            payment_repo,
            catalog_repo,
            gateway,
            currency: settings.gateway.currency.clone(),
            country_code: settings.gateway.country_code.clone(),
            callback_url: settings.server.callback_url(),
            ipn_url: settings.server.ipn_url(),
        }
    }

    /// Records a pending payment, then runs token, IPN registration and order
    /// submission against the gateway.
    ///
    /// The payment row is committed before the first gateway call. If any
    /// gateway step fails the payment stays `Pending` with no session; the
    /// expiry sweep fails it later and the caller starts over with a new
    /// payment.
    pub async fn initiate(&self, request: InitiatePaymentRequest) -> Result<InitiatedPayment> {
        request.validate()?;

        let purpose: PaymentPurpose = request.purpose.parse().map_err(AppError::Validation)?;
        let description = self.describe(purpose, request.related_id).await?;

        let payment = self
            .payment_repo
            .create(NewPayment {
                amount: request.amount,
                purpose,
                related_id: request.related_id,
                payer_id: request.payer_id,
            })
            .await?;

        tracing::info!(
            "Created payment {} ({:?} {}) for payer {}",
            payment.id,
            purpose,
            request.related_id,
            request.payer_id
        );

        match self.open_session(&payment, &request, description).await {
            Ok(initiated) => {
                tracing::info!(
                    "Payment {} initiated with order {}",
                    payment.id,
                    initiated.order_tracking_id
                );
                Ok(initiated)
            }
            Err(e) => {
                tracing::error!(
                    "Payment {} initiation failed, left pending without a gateway session: {}",
                    payment.id,
                    e
                );
                Err(e)
            }
        }
    }

    async fn describe(&self, purpose: PaymentPurpose, related_id: i64) -> Result<String> {
        match purpose {
            PaymentPurpose::Membership => {
                let club = self.catalog_repo.find_club(related_id).await?.ok_or_else(|| {
                    AppError::Validation(format!("Club {} not found", related_id))
                })?;
                Ok(format!("Membership payment for {}", club.name))
            }
            PaymentPurpose::Event => {
                let event = self.catalog_repo.find_event(related_id).await?.ok_or_else(|| {
                    AppError::Validation(format!("Event {} not found", related_id))
                })?;
                Ok(format!("Event registration payment for {}", event.title))
            }
        }
    }

    async fn open_session(
        &self,
        payment: &Payment,
        request: &InitiatePaymentRequest,
        description: String,
    ) -> Result<InitiatedPayment> {
        let token = self.gateway.get_access_token().await?;
        let notification_channel_id = self
            .gateway
            .register_notification_endpoint(&token, &self.ipn_url)
            .await?;

        let order = OrderRequest {
            merchant_reference: merchant_reference(payment.id, Utc::now()),
            amount: payment.amount,
            currency: self.currency.clone(),
            description,
            callback_url: self.callback_url.clone(),
            notification_channel_id,
            billing_address: BillingAddress::new(
                &request.customer_name,
                request.phone_number.trim(),
                request.email.as_deref(),
                &self.country_code,
            ),
        };

        let submitted = self.gateway.submit_order(&token, &order).await?;

        let interim = self
            .payment_repo
            .create_interim(NewInterimPayment {
                payment_id: payment.id,
                order_tracking_id: submitted.order_tracking_id,
                merchant_reference: submitted.merchant_reference,
                redirect_url: submitted.redirect_url,
            })
            .await?;

        Ok(InitiatedPayment {
            payment_id: payment.id,
            order_tracking_id: interim.order_tracking_id,
            redirect_url: interim.redirect_url,
        })
    }
}

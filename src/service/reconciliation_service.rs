use chrono::Utc;
use std::sync::Arc;

use crate::{
    domain::*,
    error::{AppError, Result},
    integrations::{IntegrationManager, PaymentEvent},
    payments::{GatewayVerdict, PaymentGateway},
    repository::PaymentRepository,
};

/// Settles pending payments.
///
/// The redirect callback and the IPN both land in [`reconcile`], which never
/// trusts what the caller says about the payment: it looks the order up,
/// asks the gateway, and applies the answer through the ledger's conditional
/// write. Duplicate, late and concurrent notifications are therefore no-ops.
///
/// [`reconcile`]: ReconciliationService::reconcile
pub struct ReconciliationService {
    payment_repo: Arc<dyn PaymentRepository>,
    gateway: Arc<dyn PaymentGateway>,
    integration_manager: Arc<IntegrationManager>,
}

impl ReconciliationService {
    pub fn new(
        payment_repo: Arc<dyn PaymentRepository>,
        gateway: Arc<dyn PaymentGateway>,
        integration_manager: Arc<IntegrationManager>,
    ) -> Self {
        Self {
            payment_repo,
            gateway,
            integration_manager,
        }
    }

    pub async fn reconcile(
        &self,
        order_tracking_id: &str,
        channel: NotificationChannel,
    ) -> Result<Reconciliation> {
        let interim = self
            .payment_repo
            .find_interim_by_tracking_id(order_tracking_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!(
                    "{} notification for unknown order {}",
                    channel,
                    order_tracking_id
                );
                AppError::NotFound("Payment record not found".to_string())
            })?;

        let payment = self.load_payment(interim.payment_id).await?;
        if payment.status.is_terminal() {
            tracing::debug!(
                "{} notification for order {}: payment {} already {:?}",
                channel,
                order_tracking_id,
                payment.id,
                payment.status
            );
            let status = payment.status;
            return Ok(Reconciliation {
                payment,
                outcome: ReconcileOutcome::AlreadyTerminal(status),
            });
        }

        let token = self.gateway.get_access_token().await?;
        let status = self
            .gateway
            .get_transaction_status(&token, order_tracking_id)
            .await?;

        tracing::info!(
            "{} notification for order {}: gateway reports {:?}",
            channel,
            order_tracking_id,
            status.status_description
        );

        let transition = match status.verdict() {
            GatewayVerdict::Completed => PaymentTransition::completed(
                status.confirmation_code.clone().filter(|c| !c.is_empty()),
                status
                    .payment_method
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Unknown".to_string()),
                status.paid_at().unwrap_or_else(Utc::now),
            ),
            GatewayVerdict::Failed => PaymentTransition::failed(),
            GatewayVerdict::Pending => {
                return Ok(Reconciliation {
                    payment,
                    outcome: ReconcileOutcome::StillPending,
                });
            }
        };

        self.apply(payment.id, transition, false).await
    }

    /// Operator override: completes a pending payment without asking the
    /// gateway.
    pub async fn mark_completed(&self, payment_id: i64) -> Result<Reconciliation> {
        self.load_payment(payment_id).await?;
        let transition = PaymentTransition::completed(
            Some(format!("MANUAL_{}", payment_id)),
            "Manual Override".to_string(),
            Utc::now(),
        )
        .manual();

        tracing::info!("Manually completing payment {}", payment_id);
        self.apply(payment_id, transition, false).await
    }

    /// Operator override: fails a pending payment without asking the gateway.
    pub async fn mark_failed(&self, payment_id: i64) -> Result<Reconciliation> {
        self.load_payment(payment_id).await?;

        tracing::info!("Manually failing payment {}", payment_id);
        self.apply(payment_id, PaymentTransition::failed().manual(), false)
            .await
    }

    /// Fails a payment that has waited too long. Used by the expiry sweep
    /// once the gateway has had its say.
    pub async fn expire(&self, payment_id: i64) -> Result<Reconciliation> {
        self.apply(payment_id, PaymentTransition::failed(), true).await
    }

    async fn apply(
        &self,
        payment_id: i64,
        transition: PaymentTransition,
        expired: bool,
    ) -> Result<Reconciliation> {
        let won = self
            .payment_repo
            .apply_transition(payment_id, &transition)
            .await?;
        let payment = self.load_payment(payment_id).await?;

        if !won {
            tracing::debug!(
                "Payment {} already {:?}, {:?} not applied",
                payment_id,
                payment.status,
                transition.status
            );
            let status = payment.status;
            return Ok(Reconciliation {
                payment,
                outcome: ReconcileOutcome::AlreadyTerminal(status),
            });
        }

        tracing::info!(
            "Payment {} moved to {:?}{}",
            payment_id,
            payment.status,
            if transition.is_manual { " (manual)" } else { "" }
        );

        let event = match (payment.status, expired) {
            (PaymentStatus::Completed, _) => PaymentEvent::PaymentCompleted(payment.clone()),
            (_, true) => PaymentEvent::PaymentExpired(payment.clone()),
            _ => PaymentEvent::PaymentFailed(payment.clone()),
        };
        self.integration_manager.dispatch(event);

        let status = payment.status;
        Ok(Reconciliation {
            payment,
            outcome: ReconcileOutcome::Transitioned(status),
        })
    }

    async fn load_payment(&self, payment_id: i64) -> Result<Payment> {
        self.payment_repo
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", payment_id)))
    }
}

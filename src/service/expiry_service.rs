use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::{
    config::ExpiryConfig,
    domain::{NotificationChannel, ReconcileOutcome},
    error::Result,
    repository::PaymentRepository,
    service::reconciliation_service::ReconciliationService,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Pending payments that never got a gateway session.
    pub orphans_failed: usize,
    /// Stale sessions the gateway had a final answer for.
    pub reconciled: usize,
    /// Stale sessions still pending at the gateway, failed locally.
    pub expired: usize,
    /// Payments left alone this round because the gateway could not be asked
    /// or the ledger write failed.
    pub skipped: usize,
}

/// Closes out payments that never received a terminal notification.
pub struct ExpiryService {
    payment_repo: Arc<dyn PaymentRepository>,
    reconciliation: Arc<ReconciliationService>,
    config: ExpiryConfig,
}

impl ExpiryService {
    pub fn new(
        payment_repo: Arc<dyn PaymentRepository>,
        reconciliation: Arc<ReconciliationService>,
        config: ExpiryConfig,
    ) -> Self {
        Self {
            payment_repo,
            reconciliation,
            config,
        }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        let orphan_cutoff = now - Duration::minutes(self.config.orphan_after_minutes);
        for payment in self.payment_repo.list_orphaned_pending(orphan_cutoff).await? {
            if self.expire(payment.id, &mut report).await {
                report.orphans_failed += 1;
            }
        }

        let stale_cutoff = now - Duration::hours(self.config.pending_after_hours);
        for session in self.payment_repo.list_stale_sessions(stale_cutoff).await? {
            let result = match self
                .reconciliation
                .reconcile(&session.order_tracking_id, NotificationChannel::Sweep)
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(
                        "Expiry sweep could not reconcile order {}: {}",
                        session.order_tracking_id,
                        e
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            match result.outcome {
                ReconcileOutcome::Transitioned(_) => report.reconciled += 1,
                ReconcileOutcome::AlreadyTerminal(_) => {}
                ReconcileOutcome::StillPending => {
                    if self.expire(session.payment_id, &mut report).await {
                        report.expired += 1;
                    }
                }
            }
        }

        if report != SweepReport::default() {
            tracing::info!("Expiry sweep: {:?}", report);
        }

        Ok(report)
    }

    /// Fails one payment. Returns whether this call moved it; errors are
    /// logged and counted as skipped so the rest of the sweep still runs.
    async fn expire(&self, payment_id: i64, report: &mut SweepReport) -> bool {
        match self.reconciliation.expire(payment_id).await {
            Ok(result) => matches!(result.outcome, ReconcileOutcome::Transitioned(_)),
            Err(e) => {
                tracing::warn!("Expiry sweep could not fail payment {}: {}", payment_id, e);
                report.skipped += 1;
                false
            }
        }
    }

    /// Runs [`sweep`](Self::sweep) on a fixed interval until the runtime stops.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let period = std::time::Duration::from_secs(self.config.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = self.sweep(Utc::now()).await {
                    tracing::error!("Expiry sweep failed: {}", e);
                }
            }
        })
    }
}

//! Best-effort side effects of payment transitions.
//!
//! Integrations run on background tasks after the ledger write has
//! committed. Their failures are logged and counted, never returned to the
//! caller, so a broken or slow hook cannot undo or hold up a reconciliation.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use crate::domain::Payment;
use crate::error::Result;

pub mod webhook;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payment", rename_all = "snake_case")]
pub enum PaymentEvent {
    PaymentCompleted(Payment),
    PaymentFailed(Payment),
    /// Failed by the pending-expiry sweep rather than by the gateway.
    PaymentExpired(Payment),
}

impl PaymentEvent {
    pub fn payment(&self) -> &Payment {
        match self {
            PaymentEvent::PaymentCompleted(p)
            | PaymentEvent::PaymentFailed(p)
            | PaymentEvent::PaymentExpired(p) => p,
        }
    }
}

#[async_trait]
pub trait Integration: Send + Sync {
    fn name(&self) -> &str;
    fn is_enabled(&self) -> bool;
    async fn health_check(&self) -> Result<()>;
    async fn handle_event(&self, event: &PaymentEvent) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct IntegrationManager {
    integrations: RwLock<Vec<Arc<dyn Integration>>>,
    in_flight: Mutex<JoinSet<DeliveryReport>>,
}

impl Default for IntegrationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegrationManager {
    pub fn new() -> Self {
        Self {
            integrations: RwLock::new(Vec::new()),
            in_flight: Mutex::new(JoinSet::new()),
        }
    }

    pub async fn register(&self, integration: Arc<dyn Integration>) {
        if integration.is_enabled() {
            tracing::info!("Registered integration: {}", integration.name());
            self.integrations.write().await.push(integration);
        }
    }

    /// Delivers `event` on a background task and returns immediately.
    pub fn dispatch(self: &Arc<Self>, event: PaymentEvent) {
        let manager = Arc::clone(self);
        let mut in_flight = self.lock_in_flight();
        while in_flight.try_join_next().is_some() {}

        in_flight.spawn(async move {
            let payment_id = event.payment().id;
            let report = manager.handle_event(event).await;
            if report.failed > 0 {
                tracing::warn!(
                    "{} integration(s) failed for payment {}; ledger unaffected",
                    report.failed,
                    payment_id
                );
            }
            report
        });
    }

    /// Waits for every dispatched delivery to finish.
    pub async fn drain(&self) -> DeliveryReport {
        let mut pending = std::mem::take(&mut *self.lock_in_flight());
        let mut total = DeliveryReport::default();

        while let Some(result) = pending.join_next().await {
            match result {
                Ok(report) => {
                    total.delivered += report.delivered;
                    total.failed += report.failed;
                }
                Err(e) => tracing::error!("Integration delivery task aborted: {}", e),
            }
        }

        total
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, JoinSet<DeliveryReport>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn handle_event(&self, event: PaymentEvent) -> DeliveryReport {
        let integrations = self.integrations.read().await;
        let mut report = DeliveryReport::default();

        for integration in integrations.iter() {
            if !integration.is_enabled() {
                continue;
            }

            match integration.handle_event(&event).await {
                Ok(_) => {
                    report.delivered += 1;
                    tracing::debug!(
                        "Integration {} handled event for payment {}",
                        integration.name(),
                        event.payment().id
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        "Integration {} failed to handle event for payment {}: {:?}",
                        integration.name(),
                        event.payment().id,
                        e
                    );
                }
            }
        }

        report
    }

    pub async fn health_check_all(&self) -> Vec<(String, Result<()>)> {
        let integrations = self.integrations.read().await;
        let mut results = Vec::new();

        for integration in integrations.iter() {
            let name = integration.name().to_string();
            let result = integration.health_check().await;
            results.push((name, result));
        }

        results
    }
}

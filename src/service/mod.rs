pub mod expiry_service;
pub mod payment_service;
pub mod reconciliation_service;

use std::sync::Arc;
use crate::config::Settings;
use crate::integrations::IntegrationManager;
use crate::payments::PaymentGateway;
use crate::repository::*;
use expiry_service::ExpiryService;
use payment_service::PaymentService;
use reconciliation_service::ReconciliationService;

pub use expiry_service::SweepReport;
pub use payment_service::{InitiatePaymentRequest, InitiatedPayment};

/// Everything the HTTP layer and background tasks need, wired once at
/// startup. Collaborators are injected so tests can swap the gateway.
pub struct ServiceContext {
    pub payment_repo: Arc<dyn PaymentRepository>,
    pub catalog_repo: Arc<dyn CatalogRepository>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub integration_manager: Arc<IntegrationManager>,
    pub payment_service: Arc<PaymentService>,
    pub reconciliation_service: Arc<ReconciliationService>,
    pub expiry_service: Arc<ExpiryService>,
}

impl ServiceContext {
    pub fn new(
        payment_repo: Arc<dyn PaymentRepository>,
        catalog_repo: Arc<dyn CatalogRepository>,
        gateway: Arc<dyn PaymentGateway>,
        integration_manager: Arc<IntegrationManager>,
        settings: &Settings,
    ) -> Self {
        let payment_service = Arc::new(PaymentService::new(
            payment_repo.clone(),
            catalog_repo.clone(),
            gateway.clone(),
            settings,
        ));
        let reconciliation_service = Arc::new(ReconciliationService::new(
            payment_repo.clone(),
            gateway.clone(),
            integration_manager.clone(),
        ));
        let expiry_service = Arc::new(ExpiryService::new(
            payment_repo.clone(),
            reconciliation_service.clone(),
            settings.expiry.clone(),
        ));

        Self {
            payment_repo,
            catalog_repo,
            gateway,
            integration_manager,
            payment_service,
            reconciliation_service,
            expiry_service,
        }
    }
}

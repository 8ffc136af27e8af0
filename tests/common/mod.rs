#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use clubpay::{
    config::Settings,
    error::{AppError, Result},
    integrations::{Integration, IntegrationManager, PaymentEvent},
    payments::FakeGateway,
    repository::{SqliteCatalogRepository, SqlitePaymentRepository},
    service::{InitiatePaymentRequest, ServiceContext},
};

pub const CLUB_ID: i64 = 1;
pub const EVENT_ID: i64 = 42;
pub const PAYER_ID: i64 = 7;

/// Single-connection in-memory database with migrations applied and one
/// club and one event to pay for.
pub async fn test_pool() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    sqlx::query("INSERT INTO clubs (id, name) VALUES (?, 'Chess Club')")
        .bind(CLUB_ID)
        .execute(&pool)
        .await?;
    sqlx::query("INSERT INTO events (id, title) VALUES (?, 'Spring Hackathon')")
        .bind(EVENT_ID)
        .execute(&pool)
        .await?;

    Ok(pool)
}

pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.server.base_url = "https://clubs.test".to_string();
    settings.admin.api_token = Some("operator-secret".to_string());
    settings
}

/// Collects every event it is handed.
#[derive(Default)]
pub struct RecordingIntegration {
    events: Mutex<Vec<String>>,
}

impl RecordingIntegration {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Integration for RecordingIntegration {
    fn name(&self) -> &str {
        "Recorder"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn handle_event(&self, event: &PaymentEvent) -> Result<()> {
        let label = match event {
            PaymentEvent::PaymentCompleted(p) => format!("completed:{}", p.id),
            PaymentEvent::PaymentFailed(p) => format!("failed:{}", p.id),
            PaymentEvent::PaymentExpired(p) => format!("expired:{}", p.id),
        };
        self.events.lock().unwrap().push(label);
        Ok(())
    }
}

/// Always fails, like a mail server that is down.
pub struct BrokenIntegration;

#[async_trait]
impl Integration for BrokenIntegration {
    fn name(&self) -> &str {
        "Broken"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn health_check(&self) -> Result<()> {
        Err(AppError::External("down".to_string()))
    }

    async fn handle_event(&self, _event: &PaymentEvent) -> Result<()> {
        Err(AppError::External("delivery failed".to_string()))
    }
}

/// Holds every delivery until `open` is called.
#[derive(Default)]
pub struct GatedIntegration {
    gate: Notify,
}

impl GatedIntegration {
    pub fn open(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl Integration for GatedIntegration {
    fn name(&self) -> &str {
        "Gated"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn handle_event(&self, _event: &PaymentEvent) -> Result<()> {
        self.gate.notified().await;
        Ok(())
    }
}

pub struct TestApp {
    pub pool: SqlitePool,
    pub gateway: Arc<FakeGateway>,
    pub recorder: Arc<RecordingIntegration>,
    pub context: Arc<ServiceContext>,
    pub settings: Settings,
}

pub async fn spawn_app(gateway: FakeGateway) -> anyhow::Result<TestApp> {
    spawn_app_with(gateway, Vec::new()).await
}

pub async fn spawn_app_with(
    gateway: FakeGateway,
    extra: Vec<Arc<dyn Integration>>,
) -> anyhow::Result<TestApp> {
    let pool = test_pool().await?;
    let settings = test_settings();
    let gateway = Arc::new(gateway);
    let recorder = Arc::new(RecordingIntegration::default());

    let integration_manager = Arc::new(IntegrationManager::new());
    for integration in extra {
        integration_manager.register(integration).await;
    }
    integration_manager.register(recorder.clone()).await;

    let context = Arc::new(ServiceContext::new(
        Arc::new(SqlitePaymentRepository::new(pool.clone())),
        Arc::new(SqliteCatalogRepository::new(pool.clone())),
        gateway.clone(),
        integration_manager,
        &settings,
    ));

    Ok(TestApp {
        pool,
        gateway,
        recorder,
        context,
        settings,
    })
}

impl TestApp {
    /// Events delivered so far, after waiting for in-flight deliveries.
    pub async fn events(&self) -> Vec<String> {
        self.context.integration_manager.drain().await;
        self.recorder.events()
    }
}

pub fn event_request(amount: i64) -> InitiatePaymentRequest {
    InitiatePaymentRequest {
        purpose: "Event".to_string(),
        related_id: EVENT_ID,
        amount: Decimal::new(amount, 0),
        payer_id: PAYER_ID,
        phone_number: "0712345678".to_string(),
        customer_name: "Amina Wanjiru Kamau".to_string(),
        email: Some("amina@example.org".to_string()),
    }
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> anyhow::Result<i64> {
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

use std::sync::Arc;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clubpay::{
    api,
    config::Settings,
    integrations::{webhook::WebhookIntegration, IntegrationManager},
    payments::HttpGatewayClient,
    repository::{self, SqliteCatalogRepository, SqlitePaymentRepository},
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clubpay=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!("Starting Clubpay server on {}:{}", settings.server.host, settings.server.port);

    for page in settings.return_pages.relative_pages() {
        tracing::warn!(
            "Return page {} is not an absolute URL; payers will be redirected relative to this service",
            page
        );
    }

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect_with(repository::connect_options(&settings.database.url)?)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    // Initialize repositories
    let payment_repo = Arc::new(SqlitePaymentRepository::new(db_pool.clone()));
    let catalog_repo = Arc::new(SqliteCatalogRepository::new(db_pool.clone()));

    // Gateway client. Missing credentials are reported per call, not here.
    let gateway = Arc::new(HttpGatewayClient::new(settings.gateway.clone())?);
    if settings.gateway.consumer_key.is_none() || settings.gateway.consumer_secret.is_none() {
        tracing::warn!("Gateway credentials not configured; payment initiation will fail");
    }

    // Initialize integration manager
    let integration_manager = Arc::new(IntegrationManager::new());

    if let Some(webhook) = WebhookIntegration::new(&settings.notifications) {
        integration_manager.register(Arc::new(webhook)).await;
    }

    // Check integration health
    let health_results = integration_manager.health_check_all().await;
    for (name, result) in health_results {
        match result {
            Ok(_) => tracing::info!("Integration {} is healthy", name),
            Err(e) => tracing::warn!("Integration {} health check failed: {:?}", name, e),
        }
    }

    // Create service context
    let service_context = Arc::new(ServiceContext::new(
        payment_repo,
        catalog_repo,
        gateway,
        integration_manager,
        &settings,
    ));

    if settings.expiry.enabled {
        tracing::info!(
            "Pending expiry sweep every {}s (sessions after {}h, orphans after {}m)",
            settings.expiry.sweep_interval_secs,
            settings.expiry.pending_after_hours,
            settings.expiry.orphan_after_minutes
        );
        let _sweeper = service_context.expiry_service.clone().spawn();
    } else {
        tracing::warn!("Pending expiry sweep disabled; stuck payments stay pending");
    }

    let integrations = service_context.integration_manager.clone();
    let app = api::create_app(service_context, Arc::new(settings.clone()));

    let listener = tokio::net::TcpListener::bind(
        format!("{}:{}", settings.server.host, settings.server.port)
    ).await?;

    tracing::info!("Server listening on http://{}:{}", settings.server.host, settings.server.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let event hooks for the last transitions go out before exiting.
    let report = integrations.drain().await;
    tracing::info!(
        "Shut down; {} integration deliveries flushed, {} failed",
        report.delivered,
        report.failed
    );

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

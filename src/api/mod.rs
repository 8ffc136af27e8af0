pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    trace::TraceLayer,
};
use std::sync::Arc;

use crate::{
    config::Settings,
    service::ServiceContext,
};
use state::AppState;

pub fn create_app(
    service_context: Arc<ServiceContext>,
    settings: Arc<Settings>,
) -> Router {
    let app_state = AppState::new(service_context, settings);

    Router::new()
        // Root and health endpoints
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))

        // Payer-facing and gateway-facing payment routes
        .nest("/payments", payment_routes())

        // Operator routes
        .nest("/admin/payments", admin_routes(app_state.clone()))

        .with_state(app_state)

        // Middleware
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/initiate", post(handlers::payments::initiate))
        // Both gateway channels are public: they only name an order and
        // the status is always re-queried.
        .route("/gateway/callback", get(handlers::payments::gateway_callback))
        .route(
            "/gateway/ipn",
            get(handlers::payments::gateway_ipn).post(handlers::payments::gateway_ipn_post),
        )
        .route("/payer/:payer_id", get(handlers::payments::list_by_payer))
        .route("/:id", get(handlers::payments::get))
}

fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::admin::list_all))
        .route("/pending", get(handlers::admin::list_pending))
        .route("/expire", post(handlers::admin::expire_now))
        .route("/:id/mark-completed", post(handlers::admin::mark_completed))
        .route("/:id/mark-failed", post(handlers::admin::mark_failed))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::admin::require_admin_token,
        ))
}

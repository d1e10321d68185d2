use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    api::handler::{
        approve_transaction, copy_to_clipboard, execute_transaction, get_board, get_session,
        health_check, list_history, list_pending, list_ready, propose_transaction,
        refresh_transactions, sign_in, sign_out, AppState,
    },
    config::Config,
    middleware::{create_cors_layer, rate_limit_middleware, RateLimitLayer},
};

pub async fn create_app(state: AppState, config: &Config) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let write_limit = RateLimitLayer::per_minute(config.write_rate_limit);

    // State-changing routes share one quota
    let writes = Router::new()
        .route("/transactions/propose", post(propose_transaction))
        .route("/transactions/:id/approve", post(approve_transaction))
        .route("/transactions/:id/execute", post(execute_transaction))
        .route_layer(middleware::from_fn_with_state(write_limit, rate_limit_middleware));

    let app = Router::new()
        // Public health check endpoint
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                // Views
                .route("/transactions", get(list_history))
                .route("/transactions/pending", get(list_pending))
                .route("/transactions/ready", get(list_ready))
                .route("/transactions/refresh", post(refresh_transactions))
                .route("/board", get(get_board))
                // Wallet
                .route("/session", get(get_session).post(sign_in).delete(sign_out))
                .route("/clipboard", post(copy_to_clipboard))
                .merge(writes),
        )
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout(),
        ))
        .layer(create_cors_layer(&config.allowed_origins()))
        // Add request tracing
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(
    app: Router,
    bind_address: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

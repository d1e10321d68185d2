mod api;
mod bootstrap;
mod config;
mod error;
mod ledger;
mod middleware;
mod reconcile;
mod server;
mod wallet;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,multisig_client=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    dotenv::dotenv().ok();

    init_tracing();

    info!("🚀 Starting multi-sig wallet client");

    let config = config::Config::from_env()?;

    let state = bootstrap::initialize_app_state(&config).await?;
    let board = state.board.clone();

    // Create HTTP server
    let app = server::create_app(state, &config).await;

    // Run the Server
    server::run_server(app, &config.bind_address).await?;

    board.shutdown();
    info!("👋 Server stopped");

    Ok(())
}

use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    api::handler::AppState,
    config::Config,
    error::AppResult,
    ledger::{LedgerGateway, StacksGateway},
    reconcile::TransactionBoard,
    wallet::{IdentityProvider, MemoryClipboard, TransactionSigner, WalletBridgeSigner, WalletSession},
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    // Wallet session, optionally restored from a known address
    let session = match &config.wallet_address {
        Some(address) => match WalletSession::restore(config.network, address) {
            Ok(session) => session,
            Err(e) => {
                warn!("⚠️  WALLET_ADDRESS ignored: {}", e);
                WalletSession::new(config.network)
            }
        },
        None => WalletSession::new(config.network),
    };
    let identity: Arc<dyn IdentityProvider> = Arc::new(session);
    info!("✅ Wallet session ready on {}", config.network);

    let signer: Arc<dyn TransactionSigner> = Arc::new(WalletBridgeSigner::new(
        config.wallet_bridge_url.clone(),
        identity.clone(),
        config.request_timeout(),
    )?);
    info!("✅ Wallet bridge signer at {}", config.wallet_bridge_url);

    let gateway: Arc<dyn LedgerGateway> = Arc::new(StacksGateway::new(
        config.contract(),
        signer,
        config.request_timeout(),
    )?);
    info!(
        "🔗 Ledger gateway for {}.{} via {}",
        config.contract_address, config.contract_name, config.stacks_api_url
    );

    let board = TransactionBoard::new(
        gateway,
        identity,
        Arc::new(MemoryClipboard::new()),
        config.board_settings(),
    );

    // First load; a failed batch is reported on the board, not fatal
    let report = board.refresh().await;
    info!(
        "📥 Initial fetch: {} transaction(s), {} failed read(s)",
        report.resolved, report.failed
    );

    info!("✅ Application state initialized");

    Ok(AppState {
        board,
        network: config.network,
    })
}

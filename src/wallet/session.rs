use parking_lot::RwLock;
use tracing::info;

use crate::error::ValidationError;
use crate::ledger::models::{Network, Principal};
use crate::wallet::WalletVerifier;

/// Source of the acting user's identity
pub trait IdentityProvider: Send + Sync {
    fn is_signed_in(&self) -> bool;

    fn current_identity(&self) -> Option<Principal>;

    fn begin_sign_in(&self, address: &str) -> Result<Principal, ValidationError>;

    fn sign_out(&self);
}

/// In-memory wallet session, lives for the whole process
pub struct WalletSession {
    network: Network,
    identity: RwLock<Option<Principal>>,
}

impl WalletSession {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            identity: RwLock::new(None),
        }
    }

    /// Session restored from a previously connected address
    pub fn restore(network: Network, address: &str) -> Result<Self, ValidationError> {
        let session = Self::new(network);
        session.begin_sign_in(address)?;
        Ok(session)
    }
}

impl IdentityProvider for WalletSession {
    fn is_signed_in(&self) -> bool {
        self.identity.read().is_some()
    }

    fn current_identity(&self) -> Option<Principal> {
        self.identity.read().clone()
    }

    fn begin_sign_in(&self, address: &str) -> Result<Principal, ValidationError> {
        let principal = WalletVerifier::validate_address(address, self.network)?;
        *self.identity.write() = Some(principal.clone());
        info!("🔑 Wallet connected: {}", principal.shortened(8, 8));
        Ok(principal)
    }

    fn sign_out(&self) {
        if self.identity.write().take().is_some() {
            info!("🔒 Wallet disconnected");
        }
    }
}

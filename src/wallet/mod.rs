pub mod clipboard;
pub mod session;
pub mod signer;
pub mod verifier;

pub use clipboard::{Clipboard, MemoryClipboard};
pub use session::{IdentityProvider, WalletSession};
pub use signer::{TransactionSigner, WalletBridgeSigner};
pub use verifier::WalletVerifier;

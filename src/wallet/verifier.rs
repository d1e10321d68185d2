use crate::error::ValidationError;
use crate::ledger::clarity::parse_address;
use crate::ledger::models::{Network, Principal};

pub struct WalletVerifier;

impl WalletVerifier {
    /// Accept only a checksummed single-sig address on `network`
    pub fn validate_address(address: &str, network: Network) -> Result<Principal, ValidationError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ValidationError::InvalidAddress("address is empty".to_string()));
        }

        let (version, _) = parse_address(address)
            .map_err(|e| ValidationError::InvalidAddress(e.to_string()))?;

        if version != network.address_version() {
            return Err(ValidationError::InvalidAddress(format!(
                "{} is not a {} address",
                address, network
            )));
        }

        Ok(Principal::new(address))
    }
}

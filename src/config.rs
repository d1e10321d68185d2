use config::{ConfigError, Environment};
use serde::Deserialize;
use std::time::Duration;

use crate::ledger::clarity::parse_address;
use crate::ledger::models::{Network, ScanRange};
use crate::ledger::ContractRef;
use crate::reconcile::BoardSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub bind_address: String,
    pub stacks_api_url: String,
    pub contract_address: String,
    pub contract_name: String,
    pub network: Network,
    pub wallet_bridge_url: String,
    /// Restores a wallet session at startup
    pub wallet_address: Option<String>,
    pub scan_start: u64,
    pub scan_end: u64,
    pub approval_settle_secs: u64,
    pub execute_settle_secs: u64,
    pub request_timeout_secs: u64,
    /// Comma-separated
    pub allowed_origins: String,
    /// Write requests per minute
    pub write_rate_limit: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Environment::default())
    }

    fn load(env: Environment) -> Result<Self, ConfigError> {
        let config: Config = config::Config::builder()
            .set_default("bind_address", "0.0.0.0:8080")?
            .set_default("stacks_api_url", "https://api.testnet.hiro.so")?
            .set_default("contract_address", "ST126KB63EGE5P99FTYEWH0Z195CP1YXMEZ5BDNNA")?
            .set_default("contract_name", "multi-sig-wallet")?
            .set_default("network", "testnet")?
            .set_default("wallet_bridge_url", "http://127.0.0.1:5173/bridge")?
            .set_default("scan_start", 1_i64)?
            .set_default("scan_end", 10_i64)?
            .set_default("approval_settle_secs", 10_i64)?
            .set_default("execute_settle_secs", 2_i64)?
            .set_default("request_timeout_secs", 30_i64)?
            .set_default("allowed_origins", "http://localhost:3000")?
            .set_default("write_rate_limit", 20_i64)?
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::Message(message));

        if self.scan_range().is_none() {
            return invalid(format!(
                "Scan range {}..={} must start at 1 or above and not be inverted",
                self.scan_start, self.scan_end
            ));
        }
        if self.request_timeout_secs == 0 {
            return invalid("Request timeout must be positive".to_string());
        }
        if self.write_rate_limit == 0 {
            return invalid("Write rate limit must be positive".to_string());
        }
        if self.contract_name.is_empty() {
            return invalid("Contract name must not be empty".to_string());
        }
        if let Err(e) = parse_address(&self.contract_address) {
            return invalid(format!("Contract address: {}", e));
        }
        if self.allowed_origins().is_empty() {
            return invalid("At least one allowed origin must be configured".to_string());
        }

        Ok(())
    }

    pub fn scan_range(&self) -> Option<ScanRange> {
        ScanRange::new(self.scan_start, self.scan_end)
    }

    pub fn board_settings(&self) -> BoardSettings {
        BoardSettings {
            range: self.scan_range().unwrap_or_default(),
            approval_settle: Duration::from_secs(self.approval_settle_secs),
            execute_settle: Duration::from_secs(self.execute_settle_secs),
        }
    }

    pub fn contract(&self) -> ContractRef {
        ContractRef {
            api_url: self.stacks_api_url.clone(),
            address: self.contract_address.clone(),
            name: self.contract_name.clone(),
            network: self.network,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }
}

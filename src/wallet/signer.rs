use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::error::SubmissionError;
use crate::ledger::{ContractCall, TxId};
use crate::wallet::session::IdentityProvider;

/// Signs a contract call with the user's wallet and broadcasts it
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign_and_broadcast(&self, call: ContractCall) -> Result<TxId, SubmissionError>;
}

#[derive(Serialize)]
struct BridgeRequest<'a> {
    sender: &'a str,
    #[serde(flatten)]
    call: &'a ContractCall,
}

#[derive(Deserialize)]
struct BridgeResponse {
    txid: String,
}

/// Hands calls to an external wallet bridge over HTTP
pub struct WalletBridgeSigner {
    client: reqwest::Client,
    bridge_url: String,
    identity: Arc<dyn IdentityProvider>,
}

impl WalletBridgeSigner {
    pub fn new(
        bridge_url: impl Into<String>,
        identity: Arc<dyn IdentityProvider>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            bridge_url: bridge_url.into(),
            identity,
        })
    }
}

/// 4xx means the wallet or the user declined; anything else non-2xx is a broadcast failure
fn classify(function: &str, status: StatusCode, body: &str) -> Result<TxId, SubmissionError> {
    if status.is_success() {
        return serde_json::from_str::<BridgeResponse>(body)
            .map(|r| r.txid)
            .map_err(|e| SubmissionError::Broadcast {
                function: function.to_string(),
                reason: format!("unreadable bridge reply: {}", e),
            });
    }

    let reason = if body.is_empty() {
        status.to_string()
    } else {
        body.to_string()
    };

    if status.is_client_error() {
        Err(SubmissionError::Rejected {
            function: function.to_string(),
            reason,
        })
    } else {
        Err(SubmissionError::Broadcast {
            function: function.to_string(),
            reason,
        })
    }
}

#[async_trait]
impl TransactionSigner for WalletBridgeSigner {
    async fn sign_and_broadcast(&self, call: ContractCall) -> Result<TxId, SubmissionError> {
        let sender = self
            .identity
            .current_identity()
            .ok_or(SubmissionError::NotSignedIn)?;

        info!(
            "✍️ Requesting signature for {} from {}",
            call.function_name,
            sender.shortened(8, 8)
        );

        let request = BridgeRequest {
            sender: sender.as_str(),
            call: &call,
        };

        let response = self
            .client
            .post(&self.bridge_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Wallet bridge unreachable: {}", e);
                SubmissionError::Broadcast {
                    function: call.function_name.clone(),
                    reason: e.to_string(),
                }
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify(&call.function_name, status, &body)
    }
}

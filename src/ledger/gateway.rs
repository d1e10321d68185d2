use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{ReadError, SubmissionError};
use crate::ledger::clarity::ClarityValue;
use crate::ledger::models::*;
use crate::wallet::TransactionSigner;

/// Ledger-assigned id of a broadcast write
pub type TxId = String;

pub const FN_PROPOSE: &str = "propose-transaction";
pub const FN_APPROVE: &str = "approve-transaction";
pub const FN_EXECUTE: &str = "execute-transaction";
pub const FN_GET_TRANSACTION: &str = "get-transaction";

/// Typed bridge to the multi-sig contract.
///
/// Each call is one round trip. No retries and no deduplication happen
/// here; callers own both.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn propose(
        &self,
        id: TransactionId,
        to: &Principal,
        amount: Amount,
    ) -> Result<TxId, SubmissionError>;

    async fn approve(&self, id: TransactionId) -> Result<TxId, SubmissionError>;

    async fn execute(&self, id: TransactionId) -> Result<TxId, SubmissionError>;

    /// `Ok(None)` when the ledger holds no record for `id`
    async fn fetch_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, ReadError>;
}

/// Where the contract lives
#[derive(Debug, Clone)]
pub struct ContractRef {
    pub api_url: String,
    pub address: String,
    pub name: String,
    pub network: Network,
}

/// A contract call handed to the wallet for signing and broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractCall {
    pub contract_address: String,
    pub contract_name: String,
    pub function_name: String,
    /// Hex-encoded Clarity values
    pub function_args: Vec<String>,
    pub network: Network,
}

#[derive(Serialize)]
struct CallReadRequest<'a> {
    sender: &'a str,
    arguments: Vec<String>,
}

#[derive(Deserialize)]
struct CallReadResponse {
    okay: bool,
    result: Option<String>,
    cause: Option<String>,
}

/// Gateway over the Stacks node API and an injected signer
pub struct StacksGateway {
    client: reqwest::Client,
    contract: ContractRef,
    signer: Arc<dyn TransactionSigner>,
}

impl StacksGateway {
    pub fn new(
        contract: ContractRef,
        signer: Arc<dyn TransactionSigner>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            contract,
            signer,
        })
    }

    fn call(&self, function: &str, args: Vec<ClarityValue>) -> ContractCall {
        ContractCall {
            contract_address: self.contract.address.clone(),
            contract_name: self.contract.name.clone(),
            function_name: function.to_string(),
            function_args: args.iter().map(ClarityValue::to_hex).collect(),
            network: self.contract.network,
        }
    }

    async fn submit(&self, call: ContractCall) -> Result<TxId, SubmissionError> {
        let function = call.function_name.clone();
        match self.signer.sign_and_broadcast(call).await {
            Ok(txid) => {
                info!("📤 {} broadcast: {}", function, txid);
                Ok(txid)
            }
            Err(e) => {
                warn!("❌ {} not submitted: {}", function, e);
                Err(e)
            }
        }
    }
}

fn id_arg(id: TransactionId) -> ClarityValue {
    ClarityValue::UInt(u128::from(id.get()))
}

#[async_trait]
impl LedgerGateway for StacksGateway {
    #[instrument(skip(self, to), fields(to = %to, amount = %amount))]
    async fn propose(
        &self,
        id: TransactionId,
        to: &Principal,
        amount: Amount,
    ) -> Result<TxId, SubmissionError> {
        let call = self.call(
            FN_PROPOSE,
            vec![
                id_arg(id),
                ClarityValue::StringAscii(to.as_str().to_string()),
                ClarityValue::UInt(amount.units()),
            ],
        );
        self.submit(call).await
    }

    #[instrument(skip(self))]
    async fn approve(&self, id: TransactionId) -> Result<TxId, SubmissionError> {
        let call = self.call(FN_APPROVE, vec![id_arg(id)]);
        self.submit(call).await
    }

    #[instrument(skip(self))]
    async fn execute(&self, id: TransactionId) -> Result<TxId, SubmissionError> {
        let call = self.call(FN_EXECUTE, vec![id_arg(id)]);
        self.submit(call).await
    }

    #[instrument(skip(self))]
    async fn fetch_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, ReadError> {
        let url = format!(
            "{}/v2/contracts/call-read/{}/{}/{}",
            self.contract.api_url.trim_end_matches('/'),
            self.contract.address,
            self.contract.name,
            FN_GET_TRANSACTION
        );
        let request = CallReadRequest {
            sender: &self.contract.address,
            arguments: vec![id_arg(id).to_hex()],
        };

        let transport = |message: String| ReadError::Transport { id, message };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(transport(format!("node returned {}: {}", status, error_text)));
        }

        let reply: CallReadResponse = response.json().await.map_err(|e| ReadError::Decode {
            id,
            message: format!("unreadable call-read reply: {}", e),
        })?;

        if !reply.okay {
            return Err(ReadError::Rejected {
                id,
                cause: reply.cause.unwrap_or_else(|| "unspecified".to_string()),
            });
        }

        let result = reply.result.ok_or_else(|| ReadError::Decode {
            id,
            message: "call-read reply carries no result".to_string(),
        })?;
        let value = ClarityValue::from_hex(&result).map_err(|e| ReadError::Decode {
            id,
            message: e.to_string(),
        })?;

        let tx = decode_transaction(id, value)?;
        debug!("get-transaction {} -> {}", id, if tx.is_some() { "record" } else { "none" });
        Ok(tx)
    }
}

/// Map a `get-transaction` result onto a snapshot.
///
/// Accepts `none`, `(some tuple)` and either wrapped in `(ok ..)`.
pub fn decode_transaction(
    id: TransactionId,
    value: ClarityValue,
) -> Result<Option<Transaction>, ReadError> {
    match value {
        ClarityValue::ResponseOk(inner) => decode_transaction(id, *inner),
        ClarityValue::ResponseErr(inner) => Err(ReadError::Rejected {
            id,
            cause: inner.to_string(),
        }),
        ClarityValue::OptionalNone => Ok(None),
        ClarityValue::OptionalSome(inner) => decode_transaction(id, *inner),
        ClarityValue::Tuple(fields) => record_from_tuple(id, fields)?
            .into_transaction(id)
            .map(Some),
        other => Err(ReadError::Decode {
            id,
            message: format!("expected a transaction tuple, got {}", other),
        }),
    }
}

fn record_from_tuple(
    id: TransactionId,
    mut fields: BTreeMap<String, ClarityValue>,
) -> Result<LedgerRecord, ReadError> {
    let wrong_type = |field: &str, value: &ClarityValue| ReadError::Decode {
        id,
        message: format!("field `{}` has unexpected value {}", field, value),
    };

    let mut record = LedgerRecord::default();

    if let Some(value) = fields.remove("sender") {
        let principal = party(&value).ok_or_else(|| wrong_type("sender", &value))?;
        record.sender = Some(principal);
    }
    if let Some(value) = fields.remove("to") {
        record.to = match &value {
            ClarityValue::OptionalNone => None,
            ClarityValue::OptionalSome(inner) => {
                Some(party(inner).ok_or_else(|| wrong_type("to", &value))?)
            }
            _ => Some(party(&value).ok_or_else(|| wrong_type("to", &value))?),
        };
    }
    for (field, slot) in [("amount", &mut record.amount), ("approvals", &mut record.approvals)] {
        if let Some(value) = fields.remove(field) {
            match value {
                ClarityValue::UInt(n) => *slot = Some(n),
                other => return Err(wrong_type(field, &other)),
            }
        }
    }
    for (field, slot) in [
        ("sender_approved", &mut record.sender_approved),
        ("receiver_approved", &mut record.receiver_approved),
    ] {
        if let Some(value) = fields.remove(field) {
            match value {
                ClarityValue::Bool(b) => *slot = Some(b),
                other => return Err(wrong_type(field, &other)),
            }
        }
    }

    Ok(record)
}

/// Principals and recipient strings both end up as plain identifiers
fn party(value: &ClarityValue) -> Option<Principal> {
    match value {
        ClarityValue::StringAscii(s) | ClarityValue::StringUtf8(s) => Some(Principal::new(s.clone())),
        other => other.as_principal_string().map(Principal::new),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> TransactionId {
        TransactionId::new(n).unwrap()
    }

    fn tuple(entries: Vec<(&str, ClarityValue)>) -> ClarityValue {
        ClarityValue::Tuple(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    #[test]
    fn test_decode_none_is_absent() {
        assert_eq!(decode_transaction(id(7), ClarityValue::OptionalNone).unwrap(), None);
        let wrapped = ClarityValue::ResponseOk(Box::new(ClarityValue::OptionalNone));
        assert_eq!(decode_transaction(id(7), wrapped).unwrap(), None);
    }

    #[test]
    fn test_decode_full_record() {
        let value = ClarityValue::OptionalSome(Box::new(tuple(vec![
            ("sender", ClarityValue::principal(mock::SENDER).unwrap()),
            ("to", ClarityValue::StringAscii("tb1qrecipient".to_string())),
            ("amount", ClarityValue::UInt(1_000)),
            ("approvals", ClarityValue::UInt(2)),
            ("sender_approved", ClarityValue::Bool(true)),
            ("receiver_approved", ClarityValue::Bool(true)),
        ])));

        // Go through the wire form once, as the node would send it
        let value = ClarityValue::from_hex(&value.to_hex()).unwrap();
        let tx = decode_transaction(id(5), value).unwrap().unwrap();

        assert_eq!(tx.sender.as_str(), mock::SENDER);
        assert_eq!(tx.to, Some(Principal::new("tb1qrecipient")));
        assert_eq!(tx.amount.units(), 1_000);
        assert!(tx.is_execution_eligible());
        assert!(tx.flags_agree_with_count());
    }

    #[test]
    fn test_decode_missing_flags_and_recipient() {
        let value = ClarityValue::OptionalSome(Box::new(tuple(vec![
            ("sender", ClarityValue::principal(mock::SENDER).unwrap()),
            ("amount", ClarityValue::UInt(10)),
            ("approvals", ClarityValue::UInt(1)),
        ])));

        let tx = decode_transaction(id(4), value).unwrap().unwrap();
        assert_eq!(tx.to, None);
        assert_eq!(tx.approval_count, 1);
        assert!(!tx.sender_approved && !tx.receiver_approved);
    }

    #[test]
    fn test_decode_wrong_types() {
        let value = ClarityValue::OptionalSome(Box::new(tuple(vec![
            ("sender", ClarityValue::principal(mock::SENDER).unwrap()),
            ("amount", ClarityValue::StringAscii("ten".to_string())),
            ("approvals", ClarityValue::UInt(0)),
        ])));
        assert!(matches!(
            decode_transaction(id(2), value),
            Err(ReadError::Decode { .. })
        ));

        assert!(matches!(
            decode_transaction(id(2), ClarityValue::UInt(3)),
            Err(ReadError::Decode { .. })
        ));

        let err = ClarityValue::ResponseErr(Box::new(ClarityValue::UInt(404)));
        assert!(matches!(
            decode_transaction(id(2), err),
            Err(ReadError::Rejected { .. })
        ));
    }

    #[test]
    fn test_read_argument_encoding() {
        assert_eq!(
            id_arg(id(3)).to_hex(),
            "0x0100000000000000000000000000000003"
        );
    }
}

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

use crate::error::{ReadError, ValidationError};

/// Approvals required before a transaction can be executed
pub const QUORUM: u32 = 2;

/// Decimal places of the coin
pub const COIN_DECIMALS: u32 = 8;

/// Smallest currency units per whole coin
pub const UNITS_PER_COIN: u64 = 10u64.pow(COIN_DECIMALS);

/// Stacks network the contract lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }

    /// c32check version byte of a single-sig standard principal
    pub fn address_version(&self) -> u8 {
        match self {
            Network::Mainnet => 22,
            Network::Testnet => 26,
        }
    }
}

/// Ledger-assigned transaction identifier (always positive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TransactionId(NonZeroU64);

impl TransactionId {
    pub fn new(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    pub fn get(&self) -> u64 {
        self.0.get()
    }

    /// Parse user input: a base-10 integer of at least 1
    pub fn parse_input(input: &str) -> Result<Self, ValidationError> {
        input
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(Self::new)
            .ok_or(ValidationError::InvalidId)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address-like identifier of a party. Compared by exact string match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `head...tail` form used in compact listings
    pub fn shortened(&self, head: usize, tail: usize) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= head + tail {
            return self.0.clone();
        }
        let start: String = chars[..head].iter().collect();
        let end: String = chars[chars.len() - tail..].iter().collect();
        format!("{}...{}", start, end)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Amount in the ledger's smallest unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u128);

impl Amount {
    pub fn from_units(units: u128) -> Self {
        Self(units)
    }

    pub fn units(&self) -> u128 {
        self.0
    }

    /// Convert a decimal coin amount typed by a user into smallest units.
    /// Accepts plain `digits[.digits]` only. Digits past the eighth decimal
    /// are dropped before parsing, so the result is an exact floor. It must
    /// be positive.
    pub fn from_decimal_input(input: &str) -> Result<Self, ValidationError> {
        let input = input.trim();
        let (whole, fraction) = input.split_once('.').unwrap_or((input, ""));

        let is_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !is_digits(whole) || !is_digits(fraction) {
            return Err(ValidationError::InvalidAmount);
        }

        let whole = if whole.is_empty() { "0" } else { whole };
        let fraction = &fraction[..fraction.len().min(COIN_DECIMALS as usize)];
        let normalized = if fraction.is_empty() {
            whole.to_string()
        } else {
            format!("{}.{}", whole, fraction)
        };

        let units = Decimal::from_str_exact(&normalized)
            .map_err(|_| ValidationError::InvalidAmount)?
            .checked_mul(Decimal::from(UNITS_PER_COIN))
            .ok_or(ValidationError::InvalidAmount)?;

        if units <= Decimal::ZERO {
            return Err(ValidationError::InvalidAmount);
        }

        units
            .to_u128()
            .map(Self)
            .ok_or(ValidationError::InvalidAmount)
    }

    pub fn to_coins(&self) -> Option<Decimal> {
        i128::try_from(self.0)
            .ok()
            .and_then(|units| Decimal::try_from_i128_with_scale(units, COIN_DECIMALS).ok())
    }

    /// Whole-coin rendering with 8 decimals, e.g. `0.00000001`
    pub fn to_coin_string(&self) -> String {
        self.to_coins()
            .map(|coins| coins.to_string())
            .unwrap_or_else(|| format!("{} units", self.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

/// Snapshot of one transaction as the ledger reported it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub sender: Principal,
    /// Absent when the ledger record carries no recipient
    pub to: Option<Principal>,
    pub amount: Amount,
    /// Authoritative for quorum gating
    pub approval_count: u32,
    /// Per-party flags, for display only
    pub sender_approved: bool,
    pub receiver_approved: bool,
}

impl Transaction {
    pub fn has_recipient(&self) -> bool {
        self.to.is_some()
    }

    pub fn is_execution_eligible(&self) -> bool {
        self.approval_count >= QUORUM
    }

    /// Whether the per-party flags add up to the stored approval count
    pub fn flags_agree_with_count(&self) -> bool {
        self.approval_count == u32::from(self.sender_approved) + u32::from(self.receiver_approved)
    }
}

/// Raw `get-transaction` record. Every field is optional on the wire;
/// `into_transaction` applies the default-fill rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerRecord {
    pub sender: Option<Principal>,
    pub to: Option<Principal>,
    pub amount: Option<u128>,
    pub approvals: Option<u128>,
    pub sender_approved: Option<bool>,
    pub receiver_approved: Option<bool>,
}

impl LedgerRecord {
    pub fn into_transaction(self, id: TransactionId) -> Result<Transaction, ReadError> {
        let missing = |field: &str| ReadError::Decode {
            id,
            message: format!("missing field `{}`", field),
        };

        let sender = self.sender.ok_or_else(|| missing("sender"))?;
        let amount = self.amount.ok_or_else(|| missing("amount"))?;
        let approvals = self.approvals.ok_or_else(|| missing("approvals"))?;
        let approval_count = u32::try_from(approvals).map_err(|_| ReadError::Decode {
            id,
            message: format!("approval count {} out of range", approvals),
        })?;

        Ok(Transaction {
            id,
            sender,
            to: self.to,
            amount: Amount::from_units(amount),
            approval_count,
            sender_approved: self.sender_approved.unwrap_or(false),
            receiver_approved: self.receiver_approved.unwrap_or(false),
        })
    }
}

/// Fixed window of ids scanned to assemble "all known transactions"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    start: TransactionId,
    end: TransactionId,
}

impl ScanRange {
    pub fn new(start: u64, end: u64) -> Option<Self> {
        let start = TransactionId::new(start)?;
        let end = TransactionId::new(end)?;
        (start <= end).then_some(Self { start, end })
    }

    pub fn contains(&self, id: TransactionId) -> bool {
        self.start <= id && id <= self.end
    }

    pub fn ids(&self) -> impl Iterator<Item = TransactionId> {
        (self.start.get()..=self.end.get()).filter_map(TransactionId::new)
    }

    pub fn len(&self) -> usize {
        (self.end.get() - self.start.get() + 1) as usize
    }
}

impl Default for ScanRange {
    fn default() -> Self {
        Self {
            start: TransactionId(NonZeroU64::MIN),
            end: TransactionId(NonZeroU64::MIN.saturating_add(9)),
        }
    }
}

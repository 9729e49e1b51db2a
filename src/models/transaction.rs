//! Transaction models - settled swaps as reported by the explorer API

use serde::{Deserialize, Deserializer, Serialize};

/// Settlement status reported by the explorer
///
/// Only `Success` is terminal for the monitor; anything else is dropped
/// before it reaches the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Success,
    Pending,
    Processing,
    Refunded,
    Failed,
    IncompleteDeposit,
    KnownDepositTx,
    #[serde(other)]
    Unknown,
}

impl Default for TransactionStatus {
    fn default() -> Self {
        TransactionStatus::Unknown
    }
}

/// Fee-schedule entry attached to a transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppFee {
    #[serde(default, deserialize_with = "null_as_default")]
    pub recipient: String,
    /// Fee in basis points
    #[serde(default, deserialize_with = "null_as_default")]
    pub fee: u32,
}

/// A settled swap. Immutable once observed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Transaction {
    #[serde(deserialize_with = "null_as_default")]
    pub deposit_address: String,
    #[serde(deserialize_with = "null_as_default")]
    pub deposit_memo: String,
    #[serde(deserialize_with = "null_as_default")]
    pub recipient: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: TransactionStatus,
    #[serde(deserialize_with = "null_as_default")]
    pub amount_in_formatted: String,
    #[serde(deserialize_with = "null_as_default")]
    pub amount_out_formatted: String,
    #[serde(deserialize_with = "null_as_default")]
    pub amount_in_usd: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub amount_out_usd: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub origin_asset: String,
    #[serde(deserialize_with = "null_as_default")]
    pub destination_asset: String,
    #[serde(deserialize_with = "null_as_default")]
    pub senders: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub near_tx_hashes: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub origin_chain_tx_hashes: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub destination_chain_tx_hashes: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub app_fees: Vec<AppFee>,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: String,
    /// Unix seconds; 0 when unknown
    #[serde(deserialize_with = "null_as_default")]
    pub created_at_timestamp: i64,
}

impl Transaction {
    /// Pagination and dedup key of this transaction
    pub fn cursor(&self) -> Cursor {
        Cursor {
            deposit_address: self.deposit_address.clone(),
            deposit_memo: self.deposit_memo.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TransactionStatus::Success
    }

    /// Every recorded chain hash (NEAR, origin, destination)
    pub fn all_tx_hashes(&self) -> impl Iterator<Item = &str> {
        self.near_tx_hashes
            .iter()
            .chain(self.origin_chain_tx_hashes.iter())
            .chain(self.destination_chain_tx_hashes.iter())
            .map(String::as_str)
    }

    pub fn first_sender(&self) -> Option<&str> {
        first_non_empty(&self.senders)
    }

    pub fn first_near_hash(&self) -> Option<&str> {
        first_non_empty(&self.near_tx_hashes)
    }

    pub fn first_origin_hash(&self) -> Option<&str> {
        first_non_empty(&self.origin_chain_tx_hashes)
    }

    pub fn first_destination_hash(&self) -> Option<&str> {
        first_non_empty(&self.destination_chain_tx_hashes)
    }
}

/// Explicit `null` decodes like a missing field
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn first_non_empty(values: &[String]) -> Option<&str> {
    values.first().map(String::as_str).filter(|s| !s.is_empty())
}

/// Pagination position: the last processed (deposit address, deposit memo)
///
/// The zero value (both empty) requests the oldest page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor {
    pub deposit_address: String,
    pub deposit_memo: String,
}

impl Cursor {
    pub fn new(deposit_address: impl Into<String>, deposit_memo: impl Into<String>) -> Self {
        Self {
            deposit_address: deposit_address.into(),
            deposit_memo: deposit_memo.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deposit_address.is_empty()
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "<start>")
        } else if self.deposit_memo.is_empty() {
            write!(f, "{}", self.deposit_address)
        } else {
            write!(f, "{}/{}", self.deposit_address, self.deposit_memo)
        }
    }
}

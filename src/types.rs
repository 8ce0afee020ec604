//! Common types for the relay coordinator
//!
//! Protocol variant and execution role tags, ledger quotes and transaction
//! status, and the indexer's transfer records.

use std::fmt;

use alloy::primitives::{Address, TxHash, B256, U256};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Route Tags
// ============================================================================

/// Bridge protocol variant deployed on a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    /// lnv2, margin held on the target chain
    Default,
    /// lnv2, margin held on the source chain
    Opposite,
    /// lnv3, nonce-addressed transfers
    Lnv3,
}

impl ProtocolVariant {
    /// Configuration spelling of the variant
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVariant::Default => "default",
            ProtocolVariant::Opposite => "opposite",
            ProtocolVariant::Lnv3 => "lnv3",
        }
    }

    /// Name the indexer uses for this bridge variant
    pub fn indexer_name(&self) -> &'static str {
        match self {
            ProtocolVariant::Default => "lnv2-default",
            ProtocolVariant::Opposite => "lnv2-opposite",
            ProtocolVariant::Lnv3 => "lnv3",
        }
    }

    /// lnv2 transfers are chained through `previousTransferId`
    pub fn uses_previous_transfer_id(&self) -> bool {
        !matches!(self, ProtocolVariant::Lnv3)
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configured multisig role of a route; absent means direct submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafeRole {
    /// Propose and sign only
    Signer,
    /// Propose, sign, and execute once enough approvals exist
    Executor,
}

impl SafeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafeRole::Signer => "signer",
            SafeRole::Executor => "executor",
        }
    }
}

// ============================================================================
// Ledger Types
// ============================================================================

/// Gas price quote used for a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasQuote {
    /// Pre-1559 pricing (also used for fixed overrides)
    Legacy { gas_price: u128 },
    /// EIP-1559 pricing
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
}

impl GasQuote {
    /// Upper bound on the per-gas price paid
    pub fn price_per_gas(&self) -> u128 {
        match self {
            GasQuote::Legacy { gas_price } => *gas_price,
            GasQuote::Eip1559 {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
        }
    }

    /// Native-asset cost (wei) of spending `gas_units` at this quote
    pub fn cost(&self, gas_units: u64) -> U256 {
        U256::from(self.price_per_gas()) * U256::from(gas_units)
    }
}

/// Ledger view of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxStatus {
    /// Whether the transaction is in a block
    pub included: bool,
    /// Blocks on top of (and including) the inclusion block; 0 when pending
    pub confirmations: u64,
    pub gas_price: Option<u128>,
    pub nonce: Option<u64>,
}

impl TxStatus {
    pub fn pending() -> Self {
        Self {
            included: false,
            confirmations: 0,
            gas_price: None,
            nonce: None,
        }
    }

    pub fn included(confirmations: u64) -> Self {
        Self {
            included: true,
            confirmations,
            gas_price: None,
            nonce: None,
        }
    }
}

// ============================================================================
// Indexer Types
// ============================================================================

/// Transfer record supplied by the indexer
///
/// Untrusted: every field is re-validated against ledger state before a
/// relay is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    /// `"{prefix}-...-{transferId}"`; the last segment is the claimed id
    pub id: String,
    /// Amount locked on the source chain (base units)
    #[serde(default)]
    pub send_amount: String,
    /// Amount to deliver on the target chain (base units)
    pub recv_amount: String,
    /// Source-side lock timestamp (lnv2 id input)
    #[serde(default)]
    pub start_time: String,
    /// Source-side nonce (lnv3 id input)
    #[serde(default)]
    pub message_nonce: String,
    pub recipient: Address,
    /// Source-chain transaction that created the lock
    pub request_tx_hash: TxHash,
}

impl TransferRecord {
    /// Transfer id claimed by the indexer
    pub fn claimed_transfer_id(&self) -> Result<B256> {
        let last = self
            .id
            .rsplit('-')
            .next()
            .ok_or_else(|| eyre!("Empty record id"))?;
        last.parse::<B256>()
            .map_err(|e| eyre!("Invalid transfer id in record {}: {}", self.id, e))
    }

    pub fn send_amount(&self) -> Result<U256> {
        parse_uint("sendAmount", &self.send_amount)
    }

    pub fn recv_amount(&self) -> Result<U256> {
        parse_uint("recvAmount", &self.recv_amount)
    }

    pub fn start_time(&self) -> Result<U256> {
        parse_uint("startTime", &self.start_time)
    }

    pub fn message_nonce(&self) -> Result<U256> {
        parse_uint("messageNonce", &self.message_nonce)
    }
}

fn parse_uint(field: &str, value: &str) -> Result<U256> {
    if value.is_empty() {
        return Err(eyre!("Record field {} is missing", field));
    }
    value
        .parse::<U256>()
        .map_err(|e| eyre!("Record field {} is not an integer ({}): {}", field, value, e))
}

/// A candidate transfer as returned by the indexer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayCandidate {
    pub record: TransferRecord,
    /// lnv2 only: id of the provider's previous transfer (zero when first)
    pub last_transfer_id: B256,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> TransferRecord {
        TransferRecord {
            id: id.to_string(),
            send_amount: "1000".to_string(),
            recv_amount: "990".to_string(),
            start_time: "1700000000".to_string(),
            message_nonce: "7".to_string(),
            recipient: Address::repeat_byte(0x11),
            request_tx_hash: TxHash::repeat_byte(0x22),
        }
    }

    #[test]
    fn test_variant_names() {
        assert_eq!(ProtocolVariant::Default.as_str(), "default");
        assert_eq!(ProtocolVariant::Opposite.indexer_name(), "lnv2-opposite");
        assert_eq!(ProtocolVariant::Lnv3.indexer_name(), "lnv3");
        assert!(ProtocolVariant::Opposite.uses_previous_transfer_id());
        assert!(!ProtocolVariant::Lnv3.uses_previous_transfer_id());
    }

    #[test]
    fn test_variant_deserialize() {
        let v: ProtocolVariant = serde_json::from_str("\"opposite\"").unwrap();
        assert_eq!(v, ProtocolVariant::Opposite);
        let r: SafeRole = serde_json::from_str("\"executor\"").unwrap();
        assert_eq!(r, SafeRole::Executor);
    }

    #[test]
    fn test_gas_quote_cost() {
        let quote = GasQuote::Legacy {
            gas_price: 5_000_000_000,
        };
        assert_eq!(quote.cost(200_000), U256::from(1_000_000_000_000_000u64));

        let quote = GasQuote::Eip1559 {
            max_fee_per_gas: 10,
            max_priority_fee_per_gas: 1,
        };
        assert_eq!(quote.price_per_gas(), 10);
    }

    #[test]
    fn test_claimed_transfer_id() {
        let id = B256::repeat_byte(0xab);
        let rec = record(&format!("lnv2-opposite-1-2-{}", id));
        assert_eq!(rec.claimed_transfer_id().unwrap(), id);

        let bad = record("lnv3-1-2-nothex");
        assert!(bad.claimed_transfer_id().is_err());
    }

    #[test]
    fn test_record_amounts() {
        let rec = record("x-0x00");
        assert_eq!(rec.recv_amount().unwrap(), U256::from(990));
        assert_eq!(rec.message_nonce().unwrap(), U256::from(7));

        let mut missing = rec.clone();
        missing.start_time = String::new();
        assert!(missing.start_time().is_err());
    }

    #[test]
    fn test_record_deserialize_camel_case() {
        let json = r#"{
            "id": "lnv3-1-2-0x0000000000000000000000000000000000000000000000000000000000000001",
            "sendAmount": "100",
            "recvAmount": "99",
            "startTime": "5",
            "messageNonce": "3",
            "recipient": "0x1111111111111111111111111111111111111111",
            "requestTxHash": "0x2222222222222222222222222222222222222222222222222222222222222222"
        }"#;
        let rec: TransferRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.send_amount().unwrap(), U256::from(100));
        assert_eq!(rec.recipient, Address::repeat_byte(0x11));
    }
}

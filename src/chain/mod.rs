//! Ledger endpoints
//!
//! [`ChainClient`] is the seam between the relay logic and a chain's RPC:
//! gas quotes, transaction status, read-only calls (also used as dry-runs)
//! and signed submissions. [`ChainEndpoint`] holds the per-chain settings and
//! the mutable coordination state shared by every route touching that chain.

use std::fmt;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use eyre::Result;
use tokio::sync::Mutex;

use crate::permit::ExclusionFlag;
use crate::types::{GasQuote, TxStatus};

pub mod evm;

pub use evm::AlloyChainClient;

/// A contract call, used identically for dry-run and submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    /// Explicit gas limit; estimated by the client when absent
    pub gas_limit: Option<u64>,
}

impl CallRequest {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            value: U256::ZERO,
            gas_limit: None,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: Option<u64>) -> Self {
        self.gas_limit = gas_limit;
        self
    }
}

/// RPC access to a single chain with a single signing identity
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> u64;

    /// Address transactions are signed by
    fn sender(&self) -> Address;

    /// Current gas price, restricted to legacy pricing when `legacy_only`
    async fn gas_quote(&self, legacy_only: bool) -> Result<GasQuote>;

    /// Status of a submitted transaction; `None` when the node does not know it
    async fn tx_status(&self, hash: TxHash) -> Result<Option<TxStatus>>;

    /// Execute without committing (eth_call from the sender)
    async fn call(&self, request: &CallRequest) -> Result<Bytes>;

    /// Sign and broadcast with a fresh pending nonce
    async fn send(&self, request: &CallRequest, gas: &GasQuote) -> Result<TxHash>;
}

/// In-memory view of a chain's outstanding transaction
#[derive(Debug, Default)]
pub struct PendingSlot {
    pub cached: Option<TxHash>,
    /// Consecutive status queries that failed or found nothing
    pub misses: u32,
}

impl PendingSlot {
    pub fn clear(&mut self) {
        self.cached = None;
        self.misses = 0;
    }
}

/// Per-chain settings and coordination state
pub struct ChainEndpoint {
    pub name: String,
    pub chain_id: u64,
    /// Native asset symbol
    pub native: String,
    /// Fixed gas price override (wei)
    pub fixed_gas_price: Option<u128>,
    /// Chain does not support EIP-1559 pricing
    pub legacy_fee_model: bool,
    /// Held while a fee update is being prepared and submitted from this chain
    pub fee_adjusting: ExclusionFlag,
    /// Last fee-update transaction submitted from this chain, until final
    pub fee_update: Mutex<PendingSlot>,
    /// Outstanding relay transaction on this chain as destination
    pub relay_slot: Mutex<PendingSlot>,
}

impl ChainEndpoint {
    pub fn new(name: impl Into<String>, chain_id: u64, native: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain_id,
            native: native.into(),
            fixed_gas_price: None,
            legacy_fee_model: false,
            fee_adjusting: ExclusionFlag::new(),
            fee_update: Mutex::new(PendingSlot::default()),
            relay_slot: Mutex::new(PendingSlot::default()),
        }
    }

    pub fn with_fixed_gas_price(mut self, wei: Option<u128>) -> Self {
        self.fixed_gas_price = wei;
        self
    }

    pub fn with_legacy_fee_model(mut self, legacy: bool) -> Self {
        self.legacy_fee_model = legacy;
        self
    }

    /// Gas price policy: fixed override when configured, else queried
    pub async fn gas_quote(&self, client: &dyn ChainClient) -> Result<GasQuote> {
        match self.fixed_gas_price {
            Some(gas_price) => Ok(GasQuote::Legacy { gas_price }),
            None => client.gas_quote(self.legacy_fee_model).await,
        }
    }
}

impl fmt::Debug for ChainEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainEndpoint")
            .field("name", &self.name)
            .field("chain_id", &self.chain_id)
            .field("native", &self.native)
            .field("fixed_gas_price", &self.fixed_gas_price)
            .field("legacy_fee_model", &self.legacy_fee_model)
            .finish()
    }
}

/// Convert a gwei amount (possibly fractional) into wei
pub fn gwei_to_wei(gwei: f64) -> Option<u128> {
    if !gwei.is_finite() || gwei < 0.0 {
        return None;
    }
    let wei = (gwei * 1e9).round();
    if wei > u128::MAX as f64 {
        return None;
    }
    Some(wei as u128)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedQuote;

    #[async_trait]
    impl ChainClient for FixedQuote {
        fn chain_id(&self) -> u64 {
            1
        }
        fn sender(&self) -> Address {
            Address::ZERO
        }
        async fn gas_quote(&self, legacy_only: bool) -> Result<GasQuote> {
            if legacy_only {
                Ok(GasQuote::Legacy { gas_price: 7 })
            } else {
                Ok(GasQuote::Eip1559 {
                    max_fee_per_gas: 9,
                    max_priority_fee_per_gas: 1,
                })
            }
        }
        async fn tx_status(&self, _hash: TxHash) -> Result<Option<TxStatus>> {
            Ok(None)
        }
        async fn call(&self, _request: &CallRequest) -> Result<Bytes> {
            Ok(Bytes::new())
        }
        async fn send(&self, _request: &CallRequest, _gas: &GasQuote) -> Result<TxHash> {
            Ok(TxHash::ZERO)
        }
    }

    #[test]
    fn test_gwei_to_wei() {
        assert_eq!(gwei_to_wei(1.0), Some(1_000_000_000));
        assert_eq!(gwei_to_wei(0.5), Some(500_000_000));
        assert_eq!(gwei_to_wei(-1.0), None);
        assert_eq!(gwei_to_wei(f64::NAN), None);
    }

    #[tokio::test]
    async fn test_gas_quote_policy() {
        let fixed = ChainEndpoint::new("a", 1, "ETH").with_fixed_gas_price(Some(3));
        assert_eq!(
            fixed.gas_quote(&FixedQuote).await.unwrap(),
            GasQuote::Legacy { gas_price: 3 }
        );

        let legacy = ChainEndpoint::new("b", 1, "ETH").with_legacy_fee_model(true);
        assert_eq!(legacy.gas_quote(&FixedQuote).await.unwrap().price_per_gas(), 7);

        let modern = ChainEndpoint::new("c", 1, "ETH");
        assert_eq!(modern.gas_quote(&FixedQuote).await.unwrap().price_per_gas(), 9);
    }

    #[test]
    fn test_call_request_builder() {
        let req = CallRequest::new(Address::repeat_byte(1), vec![1u8, 2, 3])
            .with_value(U256::from(5))
            .with_gas_limit(Some(21_000));
        assert_eq!(req.data.len(), 3);
        assert_eq!(req.value, U256::from(5));
        assert_eq!(req.gas_limit, Some(21_000));
    }
}

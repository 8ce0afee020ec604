//! Alloy-backed ledger client
//!
//! One HTTP provider per route side, with the route's signing key attached
//! as a wallet filler. Nonce, chain id, gas limit and pricing are filled in
//! explicitly so the submitted transaction matches the dry-run exactly.

use alloy::consensus::Transaction as _;
use alloy::network::{Ethereum, EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::fillers::{FillProvider, JoinFill, WalletFiller};
use alloy::providers::{Identity, Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::{eyre, Result};
use tracing::{debug, info};

use super::{CallRequest, ChainClient};
use crate::types::{GasQuote, TxStatus};

type WalletProvider = FillProvider<
    JoinFill<Identity, WalletFiller<EthereumWallet>>,
    RootProvider<Http<Client>>,
    Http<Client>,
    Ethereum,
>;

/// Ledger client for one chain and one signing key
pub struct AlloyChainClient {
    chain_name: String,
    chain_id: u64,
    address: Address,
    provider: WalletProvider,
}

impl AlloyChainClient {
    pub fn new(chain_name: &str, rpc_url: &str, chain_id: u64, signer: PrivateKeySigner) -> Result<Self> {
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new().wallet(wallet).on_http(
            rpc_url
                .parse()
                .map_err(|e| eyre!("Invalid RPC URL for {}: {}", chain_name, e))?,
        );

        info!(
            chain = %chain_name,
            chain_id = chain_id,
            address = %address,
            "Ledger client initialized"
        );

        Ok(Self {
            chain_name: chain_name.to_string(),
            chain_id,
            address,
            provider,
        })
    }

    fn base_request(&self, request: &CallRequest) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(self.address)
            .with_to(request.to)
            .with_input(request.data.clone())
            .with_value(request.value)
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn sender(&self) -> Address {
        self.address
    }

    async fn gas_quote(&self, legacy_only: bool) -> Result<GasQuote> {
        if legacy_only {
            let gas_price = self
                .provider
                .get_gas_price()
                .await
                .map_err(|e| eyre!("Failed to get gas price on {}: {}", self.chain_name, e))?;
            return Ok(GasQuote::Legacy { gas_price });
        }

        let estimate = self
            .provider
            .estimate_eip1559_fees(None)
            .await
            .map_err(|e| eyre!("Failed to estimate fees on {}: {}", self.chain_name, e))?;
        Ok(GasQuote::Eip1559 {
            max_fee_per_gas: estimate.max_fee_per_gas,
            max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
        })
    }

    async fn tx_status(&self, hash: TxHash) -> Result<Option<TxStatus>> {
        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(|e| eyre!("Failed to query tx {} on {}: {}", hash, self.chain_name, e))?;

        let Some(tx) = tx else {
            return Ok(None);
        };

        let mut status = match tx.block_number {
            Some(block) => {
                let head = self.provider.get_block_number().await.map_err(|e| {
                    eyre!("Failed to get block number on {}: {}", self.chain_name, e)
                })?;
                TxStatus::included(head.saturating_sub(block) + 1)
            }
            None => TxStatus::pending(),
        };
        status.gas_price = tx.gas_price().or(Some(tx.max_fee_per_gas()));
        status.nonce = Some(tx.nonce());
        Ok(Some(status))
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes> {
        let tx = self.base_request(request);
        self.provider
            .call(&tx)
            .await
            .map_err(|e| eyre!("eth_call to {} failed: {}", request.to, e))
    }

    async fn send(&self, request: &CallRequest, gas: &GasQuote) -> Result<TxHash> {
        let nonce = self
            .provider
            .get_transaction_count(self.address)
            .pending()
            .await
            .map_err(|e| eyre!("Failed to get nonce on {}: {}", self.chain_name, e))?;

        let mut tx = self
            .base_request(request)
            .with_chain_id(self.chain_id)
            .with_nonce(nonce);

        let gas_limit = match request.gas_limit {
            Some(limit) => limit,
            None => self
                .provider
                .estimate_gas(&tx)
                .await
                .map_err(|e| eyre!("Failed to estimate gas on {}: {}", self.chain_name, e))?,
        };
        tx.set_gas_limit(gas_limit);

        match *gas {
            GasQuote::Legacy { gas_price } => tx.set_gas_price(gas_price),
            GasQuote::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                tx.set_max_fee_per_gas(max_fee_per_gas);
                tx.set_max_priority_fee_per_gas(max_priority_fee_per_gas);
            }
        }

        debug!(
            chain = %self.chain_name,
            to = %request.to,
            nonce = nonce,
            gas_limit = gas_limit,
            gas_price = gas.price_per_gas(),
            "Submitting transaction"
        );

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| eyre!("Failed to send tx on {}: {}", self.chain_name, e))?;

        Ok(*pending.tx_hash())
    }
}

//! Safe transaction service client
//!
//! Proposes relay calls to a Safe multisig through its transaction service:
//! the SafeTx is hashed per EIP-712 against the Safe's current nonce, signed
//! with the route key, and either created or confirmed on the service. The
//! proposal is ready once approvals reach the Safe's on-chain threshold.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use alloy::sol_types::{eip712_domain, SolCall, SolStruct};
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{MultisigService, Proposal};
use crate::chain::{CallRequest, ChainClient};
use crate::contracts::{Safe, SafeTx};

/// Transaction as returned by the service
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTransaction {
    pub safe_tx_hash: B256,
    #[serde(default)]
    pub confirmations: Vec<ServiceConfirmation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceConfirmation {
    pub owner: Address,
    pub signature: Bytes,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProposeRequest {
    to: Address,
    value: String,
    data: Bytes,
    operation: u8,
    safe_tx_gas: String,
    base_gas: String,
    gas_price: String,
    gas_token: Address,
    refund_receiver: Address,
    nonce: u64,
    contract_transaction_hash: B256,
    sender: Address,
    signature: Bytes,
    origin: String,
}

#[derive(Debug, Serialize)]
struct ConfirmRequest {
    signature: Bytes,
}

/// [`MultisigService`] backed by a Safe wallet and its transaction service
pub struct SafeProposer {
    http: reqwest::Client,
    service_url: String,
    safe: Address,
    chain: Arc<dyn ChainClient>,
    signer: PrivateKeySigner,
}

impl SafeProposer {
    /// `chain` is the ledger the Safe lives on (the route's destination)
    pub fn new(
        service_url: &str,
        safe: Address,
        chain: Arc<dyn ChainClient>,
        signer: PrivateKeySigner,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            service_url: service_url.trim_end_matches('/').to_string(),
            safe,
            chain,
            signer,
        }
    }

    async fn read_u256(&self, data: Vec<u8>, what: &str) -> Result<U256> {
        let raw = self
            .chain
            .call(&CallRequest::new(self.safe, data))
            .await
            .wrap_err_with(|| format!("Failed to read Safe {}", what))?;
        let word: [u8; 32] = raw
            .get(..32)
            .and_then(|w| w.try_into().ok())
            .ok_or_else(|| eyre!("Safe {} returned {} bytes", what, raw.len()))?;
        Ok(U256::from_be_bytes(word))
    }

    /// EIP-712 hash of `call` at the given Safe nonce
    pub fn safe_tx_hash(&self, call: &CallRequest, nonce: U256) -> B256 {
        let tx = SafeTx {
            to: call.to,
            value: call.value,
            data: call.data.clone(),
            operation: 0,
            safeTxGas: U256::ZERO,
            baseGas: U256::ZERO,
            gasPrice: U256::ZERO,
            gasToken: Address::ZERO,
            refundReceiver: Address::ZERO,
            nonce,
        };
        let domain = eip712_domain! {
            chain_id: self.chain.chain_id(),
            verifying_contract: self.safe,
        };
        tx.eip712_signing_hash(&domain)
    }

    async fn fetch(&self, safe_tx_hash: B256) -> Result<Option<ServiceTransaction>> {
        let url = format!("{}/api/v1/multisig-transactions/{}/", self.service_url, safe_tx_hash);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| eyre!("Safe service request failed: {}", e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| eyre!("Safe service lookup failed: {}", e))?;
        let tx = response
            .json::<ServiceTransaction>()
            .await
            .map_err(|e| eyre!("Invalid Safe service response: {}", e))?;
        Ok(Some(tx))
    }

    async fn create(&self, call: &CallRequest, nonce: U256, hash: B256, signature: Bytes) -> Result<()> {
        let url = format!("{}/api/v1/safes/{}/multisig-transactions/", self.service_url, self.safe);
        let body = ProposeRequest {
            to: call.to,
            value: call.value.to_string(),
            data: call.data.clone(),
            operation: 0,
            safe_tx_gas: "0".to_string(),
            base_gas: "0".to_string(),
            gas_price: "0".to_string(),
            gas_token: Address::ZERO,
            refund_receiver: Address::ZERO,
            nonce: nonce.saturating_to::<u64>(),
            contract_transaction_hash: hash,
            sender: self.signer.address(),
            signature,
            origin: "lnbridge-relayer".to_string(),
        };
        self.http
            .post(&url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| eyre!("Failed to propose Safe transaction: {}", e))?;
        Ok(())
    }

    async fn confirm(&self, hash: B256, signature: Bytes) -> Result<()> {
        let url = format!(
            "{}/api/v1/multisig-transactions/{}/confirmations/",
            self.service_url, hash
        );
        self.http
            .post(&url)
            .json(&ConfirmRequest { signature })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| eyre!("Failed to confirm Safe transaction: {}", e))?;
        Ok(())
    }
}

#[async_trait]
impl MultisigService for SafeProposer {
    fn address(&self) -> Address {
        self.safe
    }

    async fn propose(&self, call: &CallRequest) -> Result<Proposal> {
        let nonce = self.read_u256(Safe::nonceCall {}.abi_encode(), "nonce").await?;
        let threshold = self
            .read_u256(Safe::getThresholdCall {}.abi_encode(), "threshold")
            .await?
            .saturating_to::<usize>();

        let hash = self.safe_tx_hash(call, nonce);
        let signature = self
            .signer
            .sign_hash(&hash)
            .await
            .map_err(|e| eyre!("Failed to sign Safe transaction: {}", e))?;
        let own = ServiceConfirmation {
            owner: self.signer.address(),
            signature: Bytes::from(signature.as_bytes().to_vec()),
        };

        let mut confirmations = match self.fetch(hash).await? {
            None => {
                self.create(call, nonce, hash, own.signature.clone()).await?;
                info!(safe = %self.safe, safe_tx_hash = %hash, nonce = %nonce, "Safe transaction proposed");
                vec![own]
            }
            Some(existing) => {
                let mut confirmations = existing.confirmations;
                if !confirmations.iter().any(|c| c.owner == own.owner) {
                    self.confirm(hash, own.signature.clone()).await?;
                    info!(safe = %self.safe, safe_tx_hash = %hash, "Safe transaction confirmed");
                    confirmations.push(own);
                } else {
                    debug!(safe = %self.safe, safe_tx_hash = %hash, "Already confirmed by this owner");
                }
                confirmations
            }
        };

        let ready = threshold > 0 && confirmations.len() >= threshold;
        Ok(Proposal {
            safe_tx_hash: hash,
            ready,
            signatures: pack_signatures(&mut confirmations),
        })
    }
}

/// Concatenate signatures sorted by owner address, as the Safe expects
pub fn pack_signatures(confirmations: &mut [ServiceConfirmation]) -> Bytes {
    confirmations.sort_by_key(|c| c.owner);
    let mut packed = Vec::with_capacity(confirmations.len() * 65);
    for confirmation in confirmations.iter() {
        packed.extend_from_slice(&confirmation.signature);
    }
    Bytes::from(packed)
}

//! Hash computation for transfer ids and provider keys
//!
//! Mirrors the bridge contracts' `abi.encodePacked` layouts so that a
//! transfer id claimed by the indexer can be recomputed locally.

use alloy::primitives::{Address, B256, U256};
use tiny_keccak::{Hasher, Keccak};

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Packed-encoding buffer
///
/// Each push appends the value at its Solidity width, without padding.
#[derive(Debug, Default)]
struct Packed(Vec<u8>);

impl Packed {
    fn uint256(mut self, value: U256) -> Self {
        self.0.extend_from_slice(&value.to_be_bytes::<32>());
        self
    }

    /// uint112: low 14 bytes of the big-endian word
    fn uint112(mut self, value: U256) -> Self {
        let word = value.to_be_bytes::<32>();
        self.0.extend_from_slice(&word[32 - 14..]);
        self
    }

    fn address(mut self, value: Address) -> Self {
        self.0.extend_from_slice(value.as_slice());
        self
    }

    fn bytes32(mut self, value: B256) -> Self {
        self.0.extend_from_slice(value.as_slice());
        self
    }

    fn hash(self) -> B256 {
        B256::from(keccak256(&self.0))
    }
}

/// lnv2 transfer id
///
/// keccak256(abi.encodePacked(sourceChainId, targetChainId, previousTransferId,
/// provider, sourceToken, targetToken, receiver, timestamp, uint112(amount)))
#[allow(clippy::too_many_arguments)]
pub fn lnv2_transfer_id(
    source_chain_id: u64,
    target_chain_id: u64,
    previous_transfer_id: B256,
    provider: Address,
    source_token: Address,
    target_token: Address,
    receiver: Address,
    timestamp: U256,
    amount: U256,
) -> B256 {
    Packed::default()
        .uint256(U256::from(source_chain_id))
        .uint256(U256::from(target_chain_id))
        .bytes32(previous_transfer_id)
        .address(provider)
        .address(source_token)
        .address(target_token)
        .address(receiver)
        .uint256(timestamp)
        .uint112(amount)
        .hash()
}

/// lnv3 transfer id
///
/// keccak256(abi.encodePacked(sourceChainId, targetChainId, provider,
/// sourceToken, targetToken, receiver, uint112(sourceAmount),
/// uint112(targetAmount), nonce))
#[allow(clippy::too_many_arguments)]
pub fn lnv3_transfer_id(
    source_chain_id: u64,
    target_chain_id: u64,
    provider: Address,
    source_token: Address,
    target_token: Address,
    receiver: Address,
    source_amount: U256,
    target_amount: U256,
    nonce: U256,
) -> B256 {
    Packed::default()
        .uint256(U256::from(source_chain_id))
        .uint256(U256::from(target_chain_id))
        .address(provider)
        .address(source_token)
        .address(target_token)
        .address(receiver)
        .uint112(source_amount)
        .uint112(target_amount)
        .uint256(nonce)
        .hash()
}

/// Key of a provider's fee configuration on the source bridge
///
/// keccak256(abi.encodePacked(remoteChainId, provider, sourceToken, targetToken))
pub fn provider_key(
    remote_chain_id: u64,
    provider: Address,
    source_token: Address,
    target_token: Address,
) -> B256 {
    Packed::default()
        .uint256(U256::from(remote_chain_id))
        .address(provider)
        .address(source_token)
        .address(target_token)
        .hash()
}

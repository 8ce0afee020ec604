//! Bridge contract bindings
//!
//! [`BridgeBinding`] is the one place protocol layouts live. The decision
//! engine asks it for transfer ids, ledger reads, and ready-to-send call
//! requests; it never touches a variant's ABI directly.

use alloy::primitives::aliases::U112;
use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolCall;
use eyre::{eyre, Result, WrapErr};

use crate::chain::{CallRequest, ChainClient};
use crate::contracts::{
    LnDefaultBridge, LnOppositeBridge, LnV2TransferParameter, Lnv3Bridge, Lnv3TransferParameter,
    LNV3_STATUS_LOCKED,
};
use crate::hash::{lnv2_transfer_id, lnv3_transfer_id, provider_key};
use crate::types::{ProtocolVariant, RelayCandidate};

/// Bridge contract addresses of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeAddresses {
    pub source: Address,
    pub target: Address,
}

/// Protocol-specific binding of a route's bridge contracts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeBinding {
    Default(BridgeAddresses),
    Opposite(BridgeAddresses),
    Lnv3(BridgeAddresses),
}

/// Fixed identity of a relay: chains, provider and token pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferContext {
    pub source_chain_id: u64,
    pub target_chain_id: u64,
    pub provider: Address,
    pub source_token: Address,
    pub target_token: Address,
}

/// Source-side lock as seen on the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Missing,
    /// Slashed or withdrawn
    Closed,
    Active,
}

/// Provider's current fee configuration on the source bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderFee {
    pub base_fee: U256,
    pub liquidity_fee_rate: u16,
    /// Margin (opposite) or transfer limit (lnv3); zero for default
    pub margin: U256,
}

/// Relay ready to dry-run and submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayCall {
    pub transfer_id: B256,
    pub request: CallRequest,
}

impl BridgeBinding {
    pub fn new(variant: ProtocolVariant, source: Address, target: Address) -> Self {
        let addresses = BridgeAddresses { source, target };
        match variant {
            ProtocolVariant::Default => BridgeBinding::Default(addresses),
            ProtocolVariant::Opposite => BridgeBinding::Opposite(addresses),
            ProtocolVariant::Lnv3 => BridgeBinding::Lnv3(addresses),
        }
    }

    pub fn variant(&self) -> ProtocolVariant {
        match self {
            BridgeBinding::Default(_) => ProtocolVariant::Default,
            BridgeBinding::Opposite(_) => ProtocolVariant::Opposite,
            BridgeBinding::Lnv3(_) => ProtocolVariant::Lnv3,
        }
    }

    pub fn addresses(&self) -> BridgeAddresses {
        match self {
            BridgeBinding::Default(a) | BridgeBinding::Opposite(a) | BridgeBinding::Lnv3(a) => *a,
        }
    }

    // ========================================================================
    // Transfer Ids
    // ========================================================================

    /// Recompute the transfer id from the candidate's fields
    pub fn transfer_id(&self, ctx: &TransferContext, candidate: &RelayCandidate) -> Result<B256> {
        let record = &candidate.record;
        match self {
            BridgeBinding::Default(_) | BridgeBinding::Opposite(_) => Ok(lnv2_transfer_id(
                ctx.source_chain_id,
                ctx.target_chain_id,
                candidate.last_transfer_id,
                ctx.provider,
                ctx.source_token,
                ctx.target_token,
                record.recipient,
                record.start_time()?,
                record.recv_amount()?,
            )),
            BridgeBinding::Lnv3(_) => Ok(lnv3_transfer_id(
                ctx.source_chain_id,
                ctx.target_chain_id,
                ctx.provider,
                ctx.source_token,
                ctx.target_token,
                record.recipient,
                record.send_amount()?,
                record.recv_amount()?,
                record.message_nonce()?,
            )),
        }
    }

    // ========================================================================
    // Ledger Reads
    // ========================================================================

    /// Read the lock backing `transfer_id` on the source bridge
    pub async fn lock_state(&self, source: &dyn ChainClient, transfer_id: B256) -> Result<LockState> {
        let to = self.addresses().source;
        match self {
            BridgeBinding::Default(_) => {
                let call = LnDefaultBridge::lockInfosCall { transferId: transfer_id };
                let raw = source.call(&CallRequest::new(to, call.abi_encode())).await?;
                let info = LnDefaultBridge::lockInfosCall::abi_decode_returns(&raw, true)
                    .map_err(|e| eyre!("Failed to decode lockInfos: {}", e))?;
                Ok(lnv2_lock_state(info.timestamp, info.hasSlashed))
            }
            BridgeBinding::Opposite(_) => {
                let call = LnOppositeBridge::lockInfosCall { transferId: transfer_id };
                let raw = source.call(&CallRequest::new(to, call.abi_encode())).await?;
                let info = LnOppositeBridge::lockInfosCall::abi_decode_returns(&raw, true)
                    .map_err(|e| eyre!("Failed to decode lockInfos: {}", e))?;
                Ok(lnv2_lock_state(info.timestamp, info.hasSlashed))
            }
            BridgeBinding::Lnv3(_) => {
                let call = Lnv3Bridge::lockInfosCall { transferId: transfer_id };
                let raw = source.call(&CallRequest::new(to, call.abi_encode())).await?;
                let info = Lnv3Bridge::lockInfosCall::abi_decode_returns(&raw, true)
                    .map_err(|e| eyre!("Failed to decode lockInfos: {}", e))?;
                Ok(if info.timestamp == 0 {
                    LockState::Missing
                } else if info.status == LNV3_STATUS_LOCKED {
                    LockState::Active
                } else {
                    LockState::Closed
                })
            }
        }
    }

    /// Whether the target bridge already recorded a fill for `transfer_id`
    pub async fn is_filled(&self, target: &dyn ChainClient, transfer_id: B256) -> Result<bool> {
        let to = self.addresses().target;
        match self {
            BridgeBinding::Default(_) => {
                let call = LnDefaultBridge::fillTransfersCall { transferId: transfer_id };
                let raw = target.call(&CallRequest::new(to, call.abi_encode())).await?;
                let fill = LnDefaultBridge::fillTransfersCall::abi_decode_returns(&raw, true)
                    .map_err(|e| eyre!("Failed to decode fillTransfers: {}", e))?;
                Ok(fill.timestamp != 0)
            }
            BridgeBinding::Opposite(_) => {
                let call = LnOppositeBridge::fillTransfersCall { transferId: transfer_id };
                let raw = target.call(&CallRequest::new(to, call.abi_encode())).await?;
                let fill = LnOppositeBridge::fillTransfersCall::abi_decode_returns(&raw, true)
                    .map_err(|e| eyre!("Failed to decode fillTransfers: {}", e))?;
                Ok(fill._0 != B256::ZERO)
            }
            BridgeBinding::Lnv3(_) => {
                let call = Lnv3Bridge::fillTransfersCall { transferId: transfer_id };
                let raw = target.call(&CallRequest::new(to, call.abi_encode())).await?;
                let fill = Lnv3Bridge::fillTransfersCall::abi_decode_returns(&raw, true)
                    .map_err(|e| eyre!("Failed to decode fillTransfers: {}", e))?;
                Ok(fill.timestamp != 0)
            }
        }
    }

    /// Read the provider's fee configuration from the source bridge
    pub async fn provider_fee(&self, source: &dyn ChainClient, ctx: &TransferContext) -> Result<ProviderFee> {
        let to = self.addresses().source;
        let key = provider_key(ctx.target_chain_id, ctx.provider, ctx.source_token, ctx.target_token);
        match self {
            BridgeBinding::Default(_) => {
                let call = LnDefaultBridge::srcProvidersCall { providerKey: key };
                let raw = source.call(&CallRequest::new(to, call.abi_encode())).await?;
                let info = LnDefaultBridge::srcProvidersCall::abi_decode_returns(&raw, true)
                    .map_err(|e| eyre!("Failed to decode srcProviders: {}", e))?;
                Ok(ProviderFee {
                    base_fee: U256::from(info.config.baseFee),
                    liquidity_fee_rate: u16::from(info.config.liquidityFeeRate),
                    margin: U256::ZERO,
                })
            }
            BridgeBinding::Opposite(_) => {
                let call = LnOppositeBridge::srcProvidersCall { providerKey: key };
                let raw = source.call(&CallRequest::new(to, call.abi_encode())).await?;
                let info = LnOppositeBridge::srcProvidersCall::abi_decode_returns(&raw, true)
                    .map_err(|e| eyre!("Failed to decode srcProviders: {}", e))?;
                Ok(ProviderFee {
                    base_fee: U256::from(info.config.baseFee),
                    liquidity_fee_rate: info.config.liquidityFeeRate,
                    margin: U256::from(info.config.margin),
                })
            }
            BridgeBinding::Lnv3(_) => {
                let call = Lnv3Bridge::srcProvidersCall { providerKey: key };
                let raw = source.call(&CallRequest::new(to, call.abi_encode())).await?;
                let info = Lnv3Bridge::srcProvidersCall::abi_decode_returns(&raw, true)
                    .map_err(|e| eyre!("Failed to decode srcProviders: {}", e))?;
                Ok(ProviderFee {
                    base_fee: U256::from(info.baseFee),
                    liquidity_fee_rate: info.liquidityFeeRate,
                    margin: U256::from(info.transferLimit),
                })
            }
        }
    }

    // ========================================================================
    // Call Builders
    // ========================================================================

    /// Fee-update call on the source bridge; everything but the base fee is kept
    pub fn update_fee_call(
        &self,
        ctx: &TransferContext,
        current: &ProviderFee,
        new_base_fee: U256,
    ) -> Result<CallRequest> {
        let to = self.addresses().source;
        let remote = U256::from(ctx.target_chain_id);
        let base_fee = to_u112(new_base_fee, "baseFee")?;
        let data = match self {
            BridgeBinding::Default(_) => LnDefaultBridge::setProviderFeeCall {
                remoteChainId: remote,
                sourceToken: ctx.source_token,
                targetToken: ctx.target_token,
                baseFee: base_fee,
                liquidityFeeRate: u8::try_from(current.liquidity_fee_rate)
                    .wrap_err("liquidityFeeRate out of range")?,
            }
            .abi_encode(),
            BridgeBinding::Opposite(_) => LnOppositeBridge::updateProviderFeeAndMarginCall {
                remoteChainId: remote,
                sourceToken: ctx.source_token,
                targetToken: ctx.target_token,
                margin: to_u112(current.margin, "margin")?,
                baseFee: base_fee,
                liquidityFeeRate: current.liquidity_fee_rate,
            }
            .abi_encode(),
            BridgeBinding::Lnv3(_) => Lnv3Bridge::registerLnProviderCall {
                remoteChainId: remote,
                sourceToken: ctx.source_token,
                targetToken: ctx.target_token,
                baseFee: base_fee,
                liquidityFeeRate: current.liquidity_fee_rate,
                transferLimit: to_u112(current.margin, "transferLimit")?,
            }
            .abi_encode(),
        };
        Ok(CallRequest::new(to, data))
    }

    /// Relay call on the target bridge for a candidate whose id was verified
    ///
    /// Value-bearing when the target token is the native asset.
    pub fn relay_call(
        &self,
        ctx: &TransferContext,
        candidate: &RelayCandidate,
        transfer_id: B256,
        gas_limit: Option<u64>,
    ) -> Result<RelayCall> {
        let to = self.addresses().target;
        let record = &candidate.record;
        let remote = U256::from(ctx.source_chain_id);
        let native_target = ctx.target_token == Address::ZERO;

        let (data, amount) = match self {
            BridgeBinding::Default(_) | BridgeBinding::Opposite(_) => {
                let amount = record.recv_amount()?;
                let params = LnV2TransferParameter {
                    previousTransferId: candidate.last_transfer_id,
                    provider: ctx.provider,
                    sourceToken: ctx.source_token,
                    targetToken: ctx.target_token,
                    amount: to_u112(amount, "amount")?,
                    timestamp: record.start_time()?,
                    receiver: record.recipient,
                };
                // both lnv2 variants share the relay selector
                let data = LnOppositeBridge::transferAndReleaseMarginCall {
                    params,
                    remoteChainId: remote,
                    expectedTransferId: transfer_id,
                }
                .abi_encode();
                (data, amount)
            }
            BridgeBinding::Lnv3(_) => {
                let amount = record.recv_amount()?;
                let params = Lnv3TransferParameter {
                    remoteChainId: remote,
                    provider: ctx.provider,
                    sourceToken: ctx.source_token,
                    targetToken: ctx.target_token,
                    sourceAmount: to_u112(record.send_amount()?, "sourceAmount")?,
                    targetAmount: to_u112(amount, "targetAmount")?,
                    receiver: record.recipient,
                    nonce: record.message_nonce()?,
                };
                let data = Lnv3Bridge::relayCall {
                    params,
                    expectedTransferId: transfer_id,
                    relayBySelf: true,
                }
                .abi_encode();
                (data, amount)
            }
        };

        let value = if native_target { amount } else { U256::ZERO };
        Ok(RelayCall {
            transfer_id,
            request: CallRequest::new(to, data)
                .with_value(value)
                .with_gas_limit(gas_limit),
        })
    }
}

fn lnv2_lock_state(timestamp: u32, slashed: bool) -> LockState {
    if timestamp == 0 {
        LockState::Missing
    } else if slashed {
        LockState::Closed
    } else {
        LockState::Active
    }
}

fn to_u112(value: U256, field: &str) -> Result<U112> {
    U112::checked_from_uint(value).ok_or_else(|| eyre!("{} {} does not fit in uint112", field, value))
}

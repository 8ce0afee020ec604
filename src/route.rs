//! Bridge routes and the route registry
//!
//! Routes are built once at startup from configuration and live for the
//! process lifetime. Chain endpoints are shared between every route that
//! touches the same chain, so per-chain coordination state (fee-update
//! exclusion, the destination transaction slot) is shared too.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use eyre::{Result, WrapErr};
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::bridge::{BridgeBinding, TransferContext};
use crate::chain::{gwei_to_wei, AlloyChainClient, ChainClient, ChainEndpoint};
use crate::config::{parse_address, BridgeConfig, ChainConfig, Config, ConfigError};
use crate::execution::{ExecutionPath, MultisigService, SafeProposer};
use crate::fee::{to_fixed18, FeeBand};
use crate::secret::KeyDecryptor;

/// One end of a route: the chain and a client signing with the route key
#[derive(Clone)]
pub struct RouteSide {
    pub chain: Arc<ChainEndpoint>,
    pub client: Arc<dyn ChainClient>,
}

/// A provider's token pair on a route
#[derive(Debug)]
pub struct ProviderBinding {
    /// Provider (and fee receiver) identity on chain
    pub provider: Address,
    pub source_token: Address,
    pub target_token: Address,
    /// Source-token units per native unit, 18-decimal fixed point
    pub swap_rate: U256,
    pub(crate) source_decimals: OnceCell<u8>,
}

impl ProviderBinding {
    pub fn new(provider: Address, source_token: Address, target_token: Address, swap_rate: U256) -> Self {
        Self {
            provider,
            source_token,
            target_token,
            swap_rate,
            source_decimals: OnceCell::new(),
        }
    }
}

/// Route economics, all in native-asset wei
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Economics {
    pub band: FeeBand,
    /// Relays whose estimated cost exceeds this are not attempted
    pub fee_limit: U256,
}

/// A configured (source, destination, variant, providers) unit of relay work
pub struct BridgeRoute {
    /// `"{source}->{target}[{variant}]"`
    pub label: String,
    pub source: RouteSide,
    pub target: RouteSide,
    pub binding: BridgeBinding,
    pub execution: ExecutionPath,
    pub economics: Economics,
    /// Minimum source confirmations before a lock is trusted
    pub reorg_threshold: u64,
    pub relay_gas_limit: Option<u64>,
    /// Gas units used to price a relay when no limit is configured
    pub cost_gas_units: u64,
    pub providers: Vec<ProviderBinding>,
}

impl BridgeRoute {
    pub fn transfer_context(&self, provider: &ProviderBinding) -> TransferContext {
        TransferContext {
            source_chain_id: self.source.chain.chain_id,
            target_chain_id: self.target.chain.chain_id,
            provider: provider.provider,
            source_token: provider.source_token,
            target_token: provider.target_token,
        }
    }

    /// Gas units a relay is priced at
    pub fn relay_gas_units(&self) -> u64 {
        self.relay_gas_limit.unwrap_or(self.cost_gas_units)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Build every route the configuration describes
///
/// A route referencing an unknown chain is dropped with an error log and
/// the remaining routes are returned. A key that cannot be decrypted fails
/// the whole build: there is no degraded mode without signing keys.
pub fn build_routes(config: &Config, decryptor: &KeyDecryptor) -> Result<Vec<BridgeRoute>> {
    let chains = chain_endpoints(&config.chains)?;
    let mut routes = Vec::with_capacity(config.bridges.len());

    for bridge in &config.bridges {
        let signer = decryptor
            .signer(&bridge.encrypted_private_key)
            .wrap_err_with(|| format!("Failed to decrypt key for route {}", bridge.label()))?;

        match build_route(config, bridge, &chains, signer) {
            Ok(route) => {
                info!(
                    route = %route.label,
                    execution = route.execution.as_str(),
                    providers = route.providers.len(),
                    "Route configured"
                );
                routes.push(route);
            }
            Err(e) => {
                error!(route = %bridge.label(), error = %e, "Dropping misconfigured route");
            }
        }
    }
    Ok(routes)
}

type ChainTable = HashMap<String, (ChainConfig, Arc<ChainEndpoint>)>;

fn chain_endpoints(chains: &[ChainConfig]) -> Result<ChainTable> {
    let mut table = HashMap::with_capacity(chains.len());
    for chain in chains {
        let fixed = match chain.fixed_gas_price {
            Some(gwei) => Some(gwei_to_wei(gwei).ok_or_else(|| ConfigError::InvalidGasPrice {
                chain: chain.name.clone(),
            })?),
            None => None,
        };
        let endpoint = ChainEndpoint::new(&chain.name, chain.chain_id, &chain.native)
            .with_fixed_gas_price(fixed)
            .with_legacy_fee_model(chain.not_support_1559);
        table.insert(chain.name.clone(), (chain.clone(), Arc::new(endpoint)));
    }
    Ok(table)
}

fn build_route(
    config: &Config,
    bridge: &BridgeConfig,
    chains: &ChainTable,
    signer: PrivateKeySigner,
) -> Result<BridgeRoute> {
    let label = bridge.label();
    let (source_cfg, source_chain) = chains
        .get(&bridge.from_chain)
        .ok_or_else(|| ConfigError::UnknownChain {
            route: label.clone(),
            chain: bridge.from_chain.clone(),
        })?;
    let (target_cfg, target_chain) = chains
        .get(&bridge.to_chain)
        .ok_or_else(|| ConfigError::UnknownChain {
            route: label.clone(),
            chain: bridge.to_chain.clone(),
        })?;

    let source = side(source_cfg, source_chain, signer.clone())?;
    let target = side(target_cfg, target_chain, signer.clone())?;

    let multisig: Option<Arc<dyn MultisigService>> =
        match (&bridge.safe_wallet_role, &bridge.safe_wallet_address, &bridge.safe_wallet_url) {
            (Some(_), Some(address), Some(url)) => {
                let safe = parse_address(&label, "safeWalletAddress", address)?;
                Some(Arc::new(SafeProposer::new(url, safe, target.client.clone(), signer.clone())))
            }
            _ => None,
        };
    let execution = ExecutionPath::from_role(bridge.safe_wallet_role, multisig);
    let relayer = execution.relayer_address(signer.address());

    let binding = BridgeBinding::new(
        bridge.bridge_type,
        parse_address(&label, "sourceBridgeAddress", &bridge.source_bridge_address)?,
        parse_address(&label, "targetBridgeAddress", &bridge.target_bridge_address)?,
    );

    let providers = bridge
        .providers
        .iter()
        .map(|p| {
            Ok(ProviderBinding::new(
                relayer,
                parse_address(&label, "fromAddress", &p.from_address)?,
                parse_address(&label, "toAddress", &p.to_address)?,
                to_fixed18(p.swap_rate)?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    let economics = Economics {
        band: FeeBand {
            min_profit: to_fixed18(bridge.min_profit)?,
            max_profit: to_fixed18(bridge.max_profit)?,
        },
        fee_limit: to_fixed18(bridge.fee_limit)?,
    };

    Ok(BridgeRoute {
        label,
        source,
        target,
        binding,
        execution,
        economics,
        reorg_threshold: bridge.reorg_threshold,
        relay_gas_limit: config.relay_gas_limit,
        cost_gas_units: config.cost_gas_units,
        providers,
    })
}

fn side(cfg: &ChainConfig, chain: &Arc<ChainEndpoint>, signer: PrivateKeySigner) -> Result<RouteSide> {
    let client = AlloyChainClient::new(&cfg.name, &cfg.rpc, cfg.chain_id, signer)?;
    Ok(RouteSide {
        chain: chain.clone(),
        client: Arc::new(client),
    })
}

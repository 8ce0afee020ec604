use std::collections::HashSet;
use std::env;
use std::fmt;

use alloy::primitives::Address;
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use thiserror::Error;

use crate::types::{ProtocolVariant, SafeRole};

pub const CONFIG_PATH_ENV: &str = "LP_BRIDGE_PATH";
pub const STORE_PATH_ENV: &str = "LP_BRIDGE_STORE_PATH";

/// Problems found while validating the configuration
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("bridge {route}: invalid {field} address {value}")]
    InvalidAddress {
        route: String,
        field: &'static str,
        value: String,
    },

    #[error("bridge {route}: minProfit {min} exceeds maxProfit {max}")]
    ProfitBand { route: String, min: f64, max: f64 },

    #[error("bridge {route}: {field} must be a non-negative number")]
    NegativeAmount { route: String, field: &'static str },

    #[error("bridge {route}: safeWalletRole {role} requires safeWalletAddress and safeWalletUrl")]
    IncompleteMultisig { route: String, role: &'static str },

    #[error("bridge {route}: chain {chain} is not configured")]
    UnknownChain { route: String, chain: String },

    #[error("chain {0} is configured twice")]
    DuplicateChain(String),

    #[error("schedule.{0} must be non-zero")]
    ZeroCadence(&'static str),

    #[error("chain {chain}: fixedGasPrice must be a non-negative number")]
    InvalidGasPrice { chain: String },
}

/// Relayer configuration file (camelCase JSON)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Indexer GraphQL endpoint
    pub indexer: String,
    /// Gas limit for relay submissions; estimated per call when absent
    #[serde(default)]
    pub relay_gas_limit: Option<u64>,
    /// Gas units assumed when pricing a relay without a configured limit
    #[serde(default = "default_cost_gas_units")]
    pub cost_gas_units: u64,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub chains: Vec<ChainConfig>,
    pub bridges: Vec<BridgeConfig>,
}

/// Poll cadence and tracking thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Ticks between heartbeats
    #[serde(default = "default_heartbeat_every")]
    pub heartbeat_every: u32,
    /// Ticks between scheduled fee adjustments
    #[serde(default = "default_fee_adjust_every")]
    pub fee_adjust_every: u32,
    /// Consecutive failed status queries before a tx is presumed lost
    #[serde(default = "default_max_status_misses")]
    pub max_status_misses: u32,
    #[serde(default = "default_finality_confirmations")]
    pub finality_confirmations: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            heartbeat_every: default_heartbeat_every(),
            fee_adjust_every: default_fee_adjust_every(),
            max_status_misses: default_max_status_misses(),
            finality_confirmations: default_finality_confirmations(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub name: String,
    pub rpc: String,
    pub native: String,
    pub chain_id: u64,
    /// Fixed gas price in gwei
    #[serde(default)]
    pub fixed_gas_price: Option<f64>,
    #[serde(default)]
    pub not_support_1559: bool,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    pub from_chain: String,
    pub to_chain: String,
    pub source_bridge_address: String,
    pub target_bridge_address: String,
    pub encrypted_private_key: String,
    #[serde(default)]
    pub safe_wallet_address: Option<String>,
    #[serde(default)]
    pub safe_wallet_url: Option<String>,
    #[serde(default)]
    pub safe_wallet_role: Option<SafeRole>,
    /// Native-asset units
    pub min_profit: f64,
    pub max_profit: f64,
    pub fee_limit: f64,
    pub reorg_threshold: u64,
    pub bridge_type: ProtocolVariant,
    pub providers: Vec<ProviderConfig>,
}

/// Custom Debug that redacts the encrypted key
impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("from_chain", &self.from_chain)
            .field("to_chain", &self.to_chain)
            .field("source_bridge_address", &self.source_bridge_address)
            .field("target_bridge_address", &self.target_bridge_address)
            .field("encrypted_private_key", &"<redacted>")
            .field("safe_wallet_address", &self.safe_wallet_address)
            .field("safe_wallet_url", &self.safe_wallet_url)
            .field("safe_wallet_role", &self.safe_wallet_role)
            .field("min_profit", &self.min_profit)
            .field("max_profit", &self.max_profit)
            .field("fee_limit", &self.fee_limit)
            .field("reorg_threshold", &self.reorg_threshold)
            .field("bridge_type", &self.bridge_type)
            .field("providers", &self.providers)
            .finish()
    }
}

impl BridgeConfig {
    /// Log label of the route
    pub fn label(&self) -> String {
        format!("{}->{}[{}]", self.from_chain, self.to_chain, self.bridge_type)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Source token (zero address for the native asset)
    pub from_address: String,
    /// Destination token (zero address for the native asset)
    pub to_address: String,
    /// Fee-token units per native gas unit
    pub swap_rate: f64,
}

/// Default functions
fn default_cost_gas_units() -> u64 {
    200_000
}

fn default_api_port() -> u16 {
    9090
}

fn default_interval_ms() -> u64 {
    10_000
}

fn default_heartbeat_every() -> u32 {
    6
}

fn default_fee_adjust_every() -> u32 {
    30
}

fn default_max_status_misses() -> u32 {
    180
}

fn default_finality_confirmations() -> u64 {
    3
}

impl Config {
    /// Load from the file named by `LP_BRIDGE_PATH`
    /// Loads .env file if present, then applies `LP_BRIDGE__*` overrides
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let path = env::var(CONFIG_PATH_ENV)
            .map_err(|_| eyre!("{} environment variable is required", CONFIG_PATH_ENV))?;
        Self::load_from_file(&path)
    }

    pub fn load_from_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read configuration from {}", path))?;
        let mut config: Config = serde_json::from_str(&raw)
            .wrap_err_with(|| format!("Invalid configuration in {}", path))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LP_BRIDGE__<KEY>` overrides for the top-level scalar settings
    fn apply_env_overrides(&mut self) -> Result<()> {
        let env = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("LP_BRIDGE")
                    .prefix_separator("__")
                    .try_parsing(true),
            )
            .build()
            .wrap_err("Failed to read LP_BRIDGE__ overrides")?;

        if let Ok(indexer) = env.get_string("indexer") {
            self.indexer = indexer;
        }
        if let Ok(limit) = env.get::<u64>("relaygaslimit") {
            self.relay_gas_limit = Some(limit);
        }
        if let Ok(units) = env.get::<u64>("costgasunits") {
            self.cost_gas_units = units;
        }
        if let Ok(port) = env.get::<u16>("apiport") {
            self.api_port = port;
        }
        Ok(())
    }

    /// Parse from a JSON string (no environment overrides)
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw).wrap_err("Invalid configuration JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Store location from `LP_BRIDGE_STORE_PATH`
    pub fn store_path() -> Result<String> {
        env::var(STORE_PATH_ENV)
            .map_err(|_| eyre!("{} environment variable is required", STORE_PATH_ENV))
    }

    /// Validate configuration values
    ///
    /// Routes whose chains are missing are not rejected here; the registry
    /// drops them with an error log.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let schedule = &self.schedule;
        if schedule.interval_ms == 0 {
            return Err(ConfigError::ZeroCadence("intervalMs"));
        }
        if schedule.heartbeat_every == 0 {
            return Err(ConfigError::ZeroCadence("heartbeatEvery"));
        }
        if schedule.fee_adjust_every == 0 {
            return Err(ConfigError::ZeroCadence("feeAdjustEvery"));
        }
        if schedule.max_status_misses == 0 {
            return Err(ConfigError::ZeroCadence("maxStatusMisses"));
        }

        let mut names = HashSet::new();
        for chain in &self.chains {
            if !names.insert(chain.name.as_str()) {
                return Err(ConfigError::DuplicateChain(chain.name.clone()));
            }
            if let Some(gwei) = chain.fixed_gas_price {
                if !gwei.is_finite() || gwei < 0.0 {
                    return Err(ConfigError::InvalidGasPrice {
                        chain: chain.name.clone(),
                    });
                }
            }
        }

        for bridge in &self.bridges {
            bridge.validate()?;
        }
        Ok(())
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let route = self.label();

        parse_address(&route, "sourceBridgeAddress", &self.source_bridge_address)?;
        parse_address(&route, "targetBridgeAddress", &self.target_bridge_address)?;
        for provider in &self.providers {
            parse_address(&route, "fromAddress", &provider.from_address)?;
            parse_address(&route, "toAddress", &provider.to_address)?;
            if !provider.swap_rate.is_finite() || provider.swap_rate < 0.0 {
                return Err(ConfigError::NegativeAmount {
                    route,
                    field: "swapRate",
                });
            }
        }

        for (field, value) in [
            ("minProfit", self.min_profit),
            ("maxProfit", self.max_profit),
            ("feeLimit", self.fee_limit),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::NegativeAmount { route, field });
            }
        }
        if self.min_profit > self.max_profit {
            return Err(ConfigError::ProfitBand {
                route,
                min: self.min_profit,
                max: self.max_profit,
            });
        }

        if let Some(role) = self.safe_wallet_role {
            match (&self.safe_wallet_address, &self.safe_wallet_url) {
                (Some(address), Some(_)) => {
                    parse_address(&route, "safeWalletAddress", address)?;
                }
                _ => {
                    return Err(ConfigError::IncompleteMultisig {
                        route,
                        role: role.as_str(),
                    })
                }
            }
        }
        Ok(())
    }
}

pub fn parse_address(route: &str, field: &'static str, value: &str) -> Result<Address, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidAddress {
        route: route.to_string(),
        field,
        value: value.to_string(),
    })
}

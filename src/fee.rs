//! Fee adjustment controller
//!
//! Keeps a provider's quoted base fee such that
//! `profit = baseFee - cost` stays within `[minProfit, maxProfit]`.
//! Profit bounds and cost are measured in the native gas asset (wei) and
//! converted into the source token's base units through the provider's
//! swap rate:
//!
//! ```text
//! tokenAmount = wei * swapRate * 10^decimals / 10^18
//! ```
//!
//! When the profit leaves the band the fee is moved to the band midpoint.
//! At most one adjustment per source chain runs at a time, and a submitted
//! update blocks further adjustments on that chain until it settles.

use alloy::primitives::utils::parse_ether;
use alloy::primitives::{TxHash, U256};
use alloy::sol_types::SolCall;
use eyre::{eyre, Result, WrapErr};
use tracing::{debug, info, warn};

use crate::chain::CallRequest;
use crate::contracts::ERC20;
use crate::metrics;
use crate::route::{BridgeRoute, ProviderBinding};
use crate::tracker::PendingTracker;

/// 10^18 as U256
const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Convert a non-negative decimal into 18-decimal fixed point
pub fn to_fixed18(value: f64) -> Result<U256> {
    if !value.is_finite() || value < 0.0 {
        return Err(eyre!("{} is not a non-negative amount", value));
    }
    parse_ether(&format!("{:.18}", value)).map_err(|e| eyre!("Invalid amount {}: {}", value, e))
}

/// Native-asset profit band (wei)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBand {
    pub min_profit: U256,
    pub max_profit: U256,
}

impl FeeBand {
    pub fn midpoint(&self) -> U256 {
        (self.min_profit + self.max_profit) / U256::from(2)
    }
}

/// Convert a native-asset amount into source-token base units
///
/// `swap_rate` is 18-decimal fixed point (tokens per native unit). Fails
/// when `10^decimals` does not fit in 256 bits.
pub fn native_to_token(wei: U256, swap_rate: U256, decimals: u8) -> Result<U256> {
    let scale = U256::from(10)
        .checked_pow(U256::from(decimals))
        .ok_or_else(|| eyre!("Token decimals {} out of range", decimals))?;
    Ok(wei.saturating_mul(swap_rate).saturating_mul(scale) / WAD / WAD)
}

/// Pure fee decision: `None` when in band, else the new base fee
pub fn target_base_fee(
    base_fee: U256,
    cost: U256,
    min_profit: U256,
    max_profit: U256,
    midpoint: U256,
) -> Option<U256> {
    let in_band = base_fee >= cost.saturating_add(min_profit) && base_fee <= cost.saturating_add(max_profit);
    if in_band {
        None
    } else {
        Some(cost.saturating_add(midpoint))
    }
}

/// Outcome of one adjustment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustOutcome {
    /// Another adjustment, or an unsettled update, is in flight for the chain
    Skipped,
    InBand,
    /// The update call would revert; nothing submitted
    DryRunFailed,
    Updated(TxHash),
}

impl AdjustOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustOutcome::Skipped => "skipped",
            AdjustOutcome::InBand => "in_band",
            AdjustOutcome::DryRunFailed => "dry_run_failed",
            AdjustOutcome::Updated(_) => "updated",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeeController {
    tracker: PendingTracker,
}

impl FeeController {
    pub fn new(tracker: PendingTracker) -> Self {
        Self { tracker }
    }

    /// Re-tune `provider`'s base fee on the route's source bridge for a
    /// relay costing `observed_cost` wei on the destination chain
    pub async fn adjust_fee(
        &self,
        route: &BridgeRoute,
        provider: &ProviderBinding,
        observed_cost: U256,
    ) -> Result<AdjustOutcome> {
        let outcome = self.run(route, provider, observed_cost).await;
        let label = match &outcome {
            Ok(outcome) => outcome.as_str(),
            Err(_) => "error",
        };
        metrics::FEE_UPDATES
            .with_label_values(&[route.source.chain.name.as_str(), label])
            .inc();
        outcome
    }

    async fn run(
        &self,
        route: &BridgeRoute,
        provider: &ProviderBinding,
        observed_cost: U256,
    ) -> Result<AdjustOutcome> {
        let chain = &route.source.chain;
        let client = route.source.client.as_ref();

        let Some(_adjusting) = chain.fee_adjusting.try_acquire() else {
            debug!(route = %route.label, chain = %chain.name, "Fee adjustment already running, skipping");
            return Ok(AdjustOutcome::Skipped);
        };

        {
            let mut slot = chain.fee_update.lock().await;
            if self.tracker.fee_update_in_flight(&chain.name, &mut slot, client).await {
                debug!(route = %route.label, chain = %chain.name, "Previous fee update unsettled, skipping");
                return Ok(AdjustOutcome::Skipped);
            }
        }

        let ctx = route.transfer_context(provider);
        let current = route
            .binding
            .provider_fee(client, &ctx)
            .await
            .wrap_err("Failed to read provider fee")?;

        let decimals = self.source_decimals(route, provider).await?;
        let band = route.economics.band;
        let cost = native_to_token(observed_cost, provider.swap_rate, decimals)?;
        let min_profit = native_to_token(band.min_profit, provider.swap_rate, decimals)?;
        let max_profit = native_to_token(band.max_profit, provider.swap_rate, decimals)?;
        let midpoint = native_to_token(band.midpoint(), provider.swap_rate, decimals)?;

        let Some(new_base_fee) =
            target_base_fee(current.base_fee, cost, min_profit, max_profit, midpoint)
        else {
            debug!(
                route = %route.label,
                base_fee = %current.base_fee,
                cost = %cost,
                "Provider fee within profit band"
            );
            return Ok(AdjustOutcome::InBand);
        };

        let call = route
            .binding
            .update_fee_call(&ctx, &current, new_base_fee)?;

        if let Err(e) = client.call(&call).await {
            warn!(
                route = %route.label,
                new_base_fee = %new_base_fee,
                error = %e,
                "Fee update dry-run failed, keeping current fee"
            );
            return Ok(AdjustOutcome::DryRunFailed);
        }

        let gas = chain.gas_quote(client).await?;
        let hash = client
            .send(&call, &gas)
            .await
            .wrap_err("Failed to submit fee update")?;

        chain.fee_update.lock().await.cached = Some(hash);

        info!(
            route = %route.label,
            tx_hash = %hash,
            old_base_fee = %current.base_fee,
            new_base_fee = %new_base_fee,
            cost = %cost,
            "Provider fee updated"
        );
        Ok(AdjustOutcome::Updated(hash))
    }

    async fn source_decimals(&self, route: &BridgeRoute, provider: &ProviderBinding) -> Result<u8> {
        if provider.source_token.is_zero() {
            return Ok(18);
        }
        let client = route.source.client.as_ref();
        provider
            .source_decimals
            .get_or_try_init(|| async {
                let call = CallRequest::new(provider.source_token, ERC20::decimalsCall {}.abi_encode());
                let raw = client.call(&call).await?;
                let decoded = ERC20::decimalsCall::abi_decode_returns(&raw, true)
                    .map_err(|e| eyre!("Failed to decode decimals: {}", e))?;
                Ok::<u8, eyre::Report>(decoded._0)
            })
            .await
            .copied()
            .wrap_err_with(|| format!("Failed to read decimals of {}", provider.source_token))
    }
}

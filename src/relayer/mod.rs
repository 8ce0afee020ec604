//! Relay decision engine
//!
//! One [`RouteRelayer`] per route. Each tick:
//!
//! 1. heartbeat to the indexer every `heartbeat_every` ticks (best effort)
//! 2. stop if the destination chain has an outstanding relay
//! 3. re-tune provider fees every `fee_adjust_every` ticks
//! 4. per provider: fetch a candidate, re-validate it, execute it
//!
//! At most one relay action happens per tick. A tick that would overlap a
//! running one is dropped.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use alloy::primitives::U256;
use eyre::{Result, WrapErr};
use tracing::{debug, info, warn};

use crate::bridge::RelayCall;
use crate::chain::PendingSlot;
use crate::config::ScheduleConfig;
use crate::execution::{ExecutionOutcome, ExecutionPath};
use crate::fee::FeeController;
use crate::indexer::{Heartbeat, Indexer, RelayQuery};
use crate::metrics;
use crate::permit::ExclusionFlag;
use crate::route::{BridgeRoute, ProviderBinding};
use crate::store::PendingStore;
use crate::tracker::PendingTracker;

pub mod service;
pub mod validate;

pub use service::RelayService;
pub use validate::{validate, DiscardReason, ValidatedRelay, Validation};

/// Tick counters for the periodic duties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub heartbeat_every: u32,
    pub fee_adjust_every: u32,
}

impl Cadence {
    pub fn new(heartbeat_every: u32, fee_adjust_every: u32) -> Self {
        Self {
            heartbeat_every: heartbeat_every.max(1),
            fee_adjust_every: fee_adjust_every.max(1),
        }
    }
}

impl From<&ScheduleConfig> for Cadence {
    fn from(schedule: &ScheduleConfig) -> Self {
        Self::new(schedule.heartbeat_every, schedule.fee_adjust_every)
    }
}

/// What a tick ended with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Previous tick of this route still running
    Overlapped,
    /// Destination chain has an outstanding relay transaction
    Blocked,
    /// No provider had a relayable candidate
    Idle,
    /// A relay was submitted or proposed
    Acted(ExecutionOutcome),
}

/// Shared collaborators of every route
#[derive(Clone)]
pub struct RelayContext {
    pub indexer: Arc<dyn Indexer>,
    pub store: Arc<dyn PendingStore>,
    pub tracker: PendingTracker,
    pub cadence: Cadence,
}

pub struct RouteRelayer {
    route: BridgeRoute,
    indexer: Arc<dyn Indexer>,
    store: Arc<dyn PendingStore>,
    tracker: PendingTracker,
    fees: FeeController,
    cadence: Cadence,
    in_progress: ExclusionFlag,
    heartbeat_ticks: AtomicU32,
    fee_ticks: AtomicU32,
}

impl RouteRelayer {
    pub fn new(route: BridgeRoute, ctx: &RelayContext) -> Self {
        Self {
            route,
            indexer: ctx.indexer.clone(),
            store: ctx.store.clone(),
            tracker: ctx.tracker,
            fees: FeeController::new(ctx.tracker),
            cadence: ctx.cadence,
            in_progress: ExclusionFlag::new(),
            // first tick sends a heartbeat and re-tunes fees
            heartbeat_ticks: AtomicU32::new(ctx.cadence.heartbeat_every),
            fee_ticks: AtomicU32::new(ctx.cadence.fee_adjust_every),
        }
    }

    pub fn route(&self) -> &BridgeRoute {
        &self.route
    }

    /// Run one tick unless one is already running
    pub async fn tick(&self) -> Result<TickOutcome> {
        let Some(_permit) = self.in_progress.try_acquire() else {
            debug!(route = %self.route.label, "Previous tick still running, skipping");
            metrics::TICKS_SKIPPED
                .with_label_values(&[self.route.label.as_str()])
                .inc();
            return Ok(TickOutcome::Overlapped);
        };
        self.run_tick().await
    }

    async fn run_tick(&self) -> Result<TickOutcome> {
        let route = &self.route;

        if advance(&self.heartbeat_ticks, self.cadence.heartbeat_every) {
            self.send_heartbeats().await;
        }

        // serializes check-then-submit with other routes into the same chain
        let mut slot = route.target.chain.relay_slot.lock().await;

        if self.destination_blocked(&mut slot).await? {
            debug!(
                route = %route.label,
                chain = %route.target.chain.name,
                "Outstanding relay on destination, ending tick"
            );
            return Ok(TickOutcome::Blocked);
        }

        if advance(&self.fee_ticks, self.cadence.fee_adjust_every) {
            self.adjust_fees().await;
        }

        for provider in &route.providers {
            let prepared = match self.prepare(provider).await {
                Ok(Some(prepared)) => prepared,
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        route = %route.label,
                        token = %provider.source_token,
                        error = %e,
                        "Candidate check failed"
                    );
                    continue;
                }
            };
            // errors from here on may follow a broadcast, so they end the tick
            if let Some(outcome) = self.execute(provider, prepared, &mut slot).await? {
                return Ok(TickOutcome::Acted(outcome));
            }
        }
        Ok(TickOutcome::Idle)
    }

    /// Every role tracks the destination's outstanding relay to finality, so
    /// a record left behind by another role or a crash is eventually cleared
    async fn destination_blocked(&self, slot: &mut PendingSlot) -> Result<bool> {
        let chain = &self.route.target.chain;
        self.tracker
            .check_pending(
                &chain.name,
                slot,
                self.store.as_ref(),
                self.route.target.client.as_ref(),
            )
            .await
    }

    async fn send_heartbeats(&self) {
        let route = &self.route;
        for provider in &route.providers {
            let beat = Heartbeat {
                from_chain_id: route.source.chain.chain_id,
                to_chain_id: route.target.chain.chain_id,
                provider: provider.provider,
                token: provider.source_token,
                variant: route.binding.variant(),
            };
            match self.indexer.heartbeat(&beat).await {
                Ok(()) => debug!(route = %route.label, token = %provider.source_token, "Heartbeat sent"),
                Err(e) => warn!(route = %route.label, error = %e, "Heartbeat failed"),
            }
        }
    }

    async fn adjust_fees(&self) {
        let route = &self.route;
        let cost = match self.current_relay_cost().await {
            Ok(cost) => cost,
            Err(e) => {
                warn!(route = %route.label, error = %e, "Cannot price relay, skipping fee adjustment");
                return;
            }
        };
        for provider in &route.providers {
            self.adjust_fee_logged(provider, cost).await;
        }
    }

    async fn adjust_fee_logged(&self, provider: &ProviderBinding, cost: U256) {
        if let Err(e) = self.fees.adjust_fee(&self.route, provider, cost).await {
            warn!(
                route = %self.route.label,
                token = %provider.source_token,
                error = %e,
                "Fee adjustment failed"
            );
        }
    }

    async fn current_relay_cost(&self) -> Result<U256> {
        let target = &self.route.target;
        let gas = target.chain.gas_quote(target.client.as_ref()).await?;
        Ok(gas.cost(self.route.relay_gas_units()))
    }

    /// Fetch and re-validate the provider's candidate
    async fn prepare(&self, provider: &ProviderBinding) -> Result<Option<PreparedRelay>> {
        let route = &self.route;
        let query = RelayQuery {
            from_chain: route.source.chain.name.clone(),
            to_chain: route.target.chain.name.clone(),
            provider: provider.provider,
            token: provider.source_token,
            variant: route.binding.variant(),
        };
        let Some(candidate) = self
            .indexer
            .needs_relay(&query)
            .await
            .wrap_err("Indexer query failed")?
        else {
            return Ok(None);
        };
        info!(route = %route.label, id = %candidate.record.id, "Candidate needs relay");

        let valid = match validate(route, provider, &candidate).await? {
            Validation::Valid(valid) => valid,
            Validation::Discarded(reason) => {
                reason.record(&route.label);
                return Ok(None);
            }
        };

        let ctx = route.transfer_context(provider);
        let relay = route
            .binding
            .relay_call(&ctx, &candidate, valid.transfer_id, route.relay_gas_limit)?;
        Ok(Some(PreparedRelay { valid, relay }))
    }

    /// Hand a validated relay to the route's execution path
    ///
    /// `None` when the dry-run reverted and nothing was sent.
    async fn execute(
        &self,
        provider: &ProviderBinding,
        prepared: PreparedRelay,
        slot: &mut PendingSlot,
    ) -> Result<Option<ExecutionOutcome>> {
        let route = &self.route;
        let PreparedRelay { valid, relay } = prepared;

        let outcome = route
            .execution
            .execute(route.target.client.as_ref(), &relay.request, &valid.gas)
            .await?;

        match &outcome {
            ExecutionOutcome::DryRunFailed => {
                DiscardReason::DryRunFailed.record(&route.label);
                warn!(route = %route.label, transfer_id = %valid.transfer_id, "Relay dry-run failed");
                return Ok(None);
            }
            ExecutionOutcome::Proposed { safe_tx_hash, ready } => {
                metrics::MULTISIG_PROPOSALS
                    .with_label_values(&[route.label.as_str(), if *ready { "true" } else { "false" }])
                    .inc();
                info!(
                    route = %route.label,
                    transfer_id = %valid.transfer_id,
                    safe_tx_hash = %safe_tx_hash,
                    ready = *ready,
                    "Relay proposed to multisig"
                );
            }
            ExecutionOutcome::Submitted(hash) => {
                self.tracker
                    .record(&route.target.chain.name, slot, self.store.as_ref(), *hash)
                    .await?;
                metrics::RELAYS_SUBMITTED
                    .with_label_values(&[route.label.as_str()])
                    .inc();
                info!(
                    route = %route.label,
                    transfer_id = %valid.transfer_id,
                    tx_hash = %hash,
                    cost = %valid.cost,
                    native = %route.target.chain.native,
                    "Relay submitted"
                );
                if matches!(route.execution, ExecutionPath::Direct) {
                    self.adjust_fee_logged(provider, valid.cost).await;
                }
            }
        }
        Ok(Some(outcome))
    }
}

struct PreparedRelay {
    valid: ValidatedRelay,
    relay: RelayCall,
}

/// Advance a tick counter; true (and reset) once it reaches `every`
fn advance(counter: &AtomicU32, every: u32) -> bool {
    let ticks = counter.load(Ordering::Relaxed).saturating_add(1);
    if ticks >= every {
        counter.store(0, Ordering::Relaxed);
        true
    } else {
        counter.store(ticks, Ordering::Relaxed);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_clock_fires_first_tick() {
        let counter = AtomicU32::new(3);
        let fired: Vec<bool> = (0..7).map(|_| advance(&counter, 3)).collect();
        assert_eq!(fired, vec![true, false, false, true, false, false, true]);
    }

    #[test]
    fn test_fee_clock_fires_every_n() {
        let counter = AtomicU32::new(0);
        let fired: Vec<usize> = (1..=90).filter(|_| advance(&counter, 30)).collect();
        assert_eq!(fired, vec![30, 60, 90]);
    }

    #[test]
    fn test_cadence_never_zero() {
        let cadence = Cadence::new(0, 0);
        assert_eq!(cadence.heartbeat_every, 1);
        assert_eq!(cadence.fee_adjust_every, 1);
    }
}

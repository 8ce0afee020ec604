//! Pending-transaction tracker
//!
//! Each destination chain carries at most one outstanding relay transaction.
//! Its hash lives in the persisted store (so restarts resume tracking) and in
//! the chain's in-memory [`PendingSlot`]. Every check walks the lifecycle:
//!
//! ```text
//! NONE -> SUBMITTED -> INCLUDED(confirmations < K) -> FINAL -> NONE
//!            \-> LOST (N consecutive status misses) -> NONE
//! ```
//!
//! The same walk, without the store, tracks in-flight fee updates.

use alloy::primitives::TxHash;
use eyre::{Result, WrapErr};
use tracing::{debug, error, info, warn};

use crate::chain::{ChainClient, PendingSlot};
use crate::metrics;
use crate::store::PendingStore;

/// Confirmations after which a transaction is treated as irreversible
pub const DEFAULT_FINALITY_CONFIRMATIONS: u64 = 3;

/// Consecutive failed status queries before a transaction is presumed lost
pub const DEFAULT_MAX_STATUS_MISSES: u32 = 180;

/// Result of polling a tracked hash once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Still outstanding (pending, shallow, or status unknown)
    Blocked,
    /// Included with enough confirmations
    Final,
    /// Status queries failed too many times in a row
    Lost,
}

#[derive(Debug, Clone, Copy)]
pub struct PendingTracker {
    finality_confirmations: u64,
    max_misses: u32,
}

impl Default for PendingTracker {
    fn default() -> Self {
        Self::new(DEFAULT_FINALITY_CONFIRMATIONS, DEFAULT_MAX_STATUS_MISSES)
    }
}

impl PendingTracker {
    pub fn new(finality_confirmations: u64, max_misses: u32) -> Self {
        Self {
            finality_confirmations,
            max_misses: max_misses.max(1),
        }
    }

    pub fn finality_confirmations(&self) -> u64 {
        self.finality_confirmations
    }

    /// Poll `hash` once and update the slot's miss counter
    pub async fn observe(
        &self,
        chain: &str,
        hash: TxHash,
        slot: &mut PendingSlot,
        client: &dyn ChainClient,
    ) -> Observation {
        let status = match client.tx_status(hash).await {
            Ok(Some(status)) => status,
            outcome => {
                slot.misses += 1;
                match outcome {
                    Err(e) => debug!(chain = %chain, tx_hash = %hash, misses = slot.misses, error = %e, "Status query failed"),
                    _ => debug!(chain = %chain, tx_hash = %hash, misses = slot.misses, "Transaction not found"),
                }
                if slot.misses >= self.max_misses {
                    return Observation::Lost;
                }
                return Observation::Blocked;
            }
        };

        slot.misses = 0;

        if !status.included {
            debug!(
                chain = %chain,
                tx_hash = %hash,
                nonce = ?status.nonce,
                gas_price = ?status.gas_price,
                "Transaction not yet included"
            );
            return Observation::Blocked;
        }

        if status.confirmations < self.finality_confirmations {
            debug!(
                chain = %chain,
                tx_hash = %hash,
                confirmations = status.confirmations,
                required = self.finality_confirmations,
                "Transaction awaiting finality"
            );
            return Observation::Blocked;
        }

        Observation::Final
    }

    /// Whether a relay transaction is still outstanding on `chain`
    ///
    /// Clears the slot and the persisted record once the transaction is
    /// final or presumed lost.
    pub async fn check_pending(
        &self,
        chain: &str,
        slot: &mut PendingSlot,
        store: &dyn PendingStore,
        client: &dyn ChainClient,
    ) -> Result<bool> {
        if slot.cached.is_none() {
            slot.cached = store
                .get(chain)
                .await
                .wrap_err_with(|| format!("Failed to load pending tx for {}", chain))?;
        }

        let Some(hash) = slot.cached else {
            metrics::PENDING_BLOCKED.with_label_values(&[chain]).set(0.0);
            return Ok(false);
        };

        let blocked = match self.observe(chain, hash, slot, client).await {
            Observation::Blocked => true,
            Observation::Final => {
                info!(chain = %chain, tx_hash = %hash, "Relay transaction finalized");
                self.clear(chain, slot, store).await?;
                false
            }
            Observation::Lost => {
                warn!(
                    chain = %chain,
                    tx_hash = %hash,
                    misses = slot.misses,
                    "Relay transaction presumed lost (replaced or reorganized), releasing slot"
                );
                self.clear(chain, slot, store).await?;
                false
            }
        };

        metrics::PENDING_BLOCKED
            .with_label_values(&[chain])
            .set(if blocked { 1.0 } else { 0.0 });
        Ok(blocked)
    }

    /// Record a freshly submitted relay
    ///
    /// The hash is cached before it is persisted: once broadcast, the
    /// destination stays blocked in this process even if the store fails.
    pub async fn record(
        &self,
        chain: &str,
        slot: &mut PendingSlot,
        store: &dyn PendingStore,
        hash: TxHash,
    ) -> Result<()> {
        slot.cached = Some(hash);
        slot.misses = 0;
        metrics::PENDING_BLOCKED.with_label_values(&[chain]).set(1.0);

        if let Err(e) = store.set(chain, hash).await {
            error!(chain = %chain, tx_hash = %hash, error = %e, "Failed to persist pending tx");
            return Err(e).wrap_err_with(|| format!("Failed to persist pending tx for {}", chain));
        }
        Ok(())
    }

    /// Whether the last fee update submitted from `chain` is still outstanding
    pub async fn fee_update_in_flight(
        &self,
        chain: &str,
        slot: &mut PendingSlot,
        client: &dyn ChainClient,
    ) -> bool {
        let Some(hash) = slot.cached else {
            return false;
        };
        match self.observe(chain, hash, slot, client).await {
            Observation::Blocked => true,
            Observation::Final | Observation::Lost => {
                debug!(chain = %chain, tx_hash = %hash, "Fee update settled");
                slot.clear();
                false
            }
        }
    }

    async fn clear(
        &self,
        chain: &str,
        slot: &mut PendingSlot,
        store: &dyn PendingStore,
    ) -> Result<()> {
        store
            .delete(chain)
            .await
            .wrap_err_with(|| format!("Failed to delete pending tx for {}", chain))?;
        slot.clear();
        Ok(())
    }
}

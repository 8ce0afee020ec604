//! Candidate re-validation
//!
//! Indexer records are advisory. Before a relay is built every candidate is
//! checked against both ledgers in this order:
//!
//! 1. recomputed transfer id equals the claimed id
//! 2. no fill recorded on the destination bridge
//! 3. source lock exists and is neither slashed nor withdrawn
//! 4. source transaction has at least `reorg_threshold` confirmations
//! 5. relay cost at the current destination gas price is within `fee_limit`
//!
//! The first failing check discards the candidate.

use alloy::primitives::{B256, U256};
use eyre::{Result, WrapErr};
use tracing::{debug, info};

use crate::bridge::LockState;
use crate::metrics;
use crate::route::{BridgeRoute, ProviderBinding};
use crate::types::{GasQuote, RelayCandidate};

/// Why a candidate was not relayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Record fields cannot be parsed
    Malformed,
    IdMismatch,
    AlreadyFilled,
    LockMissing,
    LockClosed,
    /// Source transaction not found or not yet included
    SourceTxUnknown,
    BelowReorgThreshold,
    OverFeeLimit,
    DryRunFailed,
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscardReason::Malformed => "malformed",
            DiscardReason::IdMismatch => "id_mismatch",
            DiscardReason::AlreadyFilled => "already_filled",
            DiscardReason::LockMissing => "lock_missing",
            DiscardReason::LockClosed => "lock_closed",
            DiscardReason::SourceTxUnknown => "source_tx_unknown",
            DiscardReason::BelowReorgThreshold => "below_reorg_threshold",
            DiscardReason::OverFeeLimit => "over_fee_limit",
            DiscardReason::DryRunFailed => "dry_run_failed",
        }
    }

    /// Count the discard against the route
    pub fn record(&self, route: &str) {
        metrics::CANDIDATES_DISCARDED
            .with_label_values(&[route, self.as_str()])
            .inc();
    }
}

/// A candidate that passed every ledger check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedRelay {
    pub transfer_id: B256,
    /// Destination gas quote the cost was estimated with; reused for submission
    pub gas: GasQuote,
    /// Estimated relay cost in destination native wei
    pub cost: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Valid(ValidatedRelay),
    Discarded(DiscardReason),
}

/// Run every check for `candidate` on `route`
///
/// Ledger query failures are errors, not discards; either way nothing is
/// submitted.
pub async fn validate(
    route: &BridgeRoute,
    provider: &ProviderBinding,
    candidate: &RelayCandidate,
) -> Result<Validation> {
    let record = &candidate.record;
    let ctx = route.transfer_context(provider);

    let (claimed, computed) = match (
        record.claimed_transfer_id(),
        route.binding.transfer_id(&ctx, candidate),
    ) {
        (Ok(claimed), Ok(computed)) => (claimed, computed),
        (Err(e), _) | (_, Err(e)) => {
            debug!(route = %route.label, id = %record.id, error = %e, "Unparseable candidate");
            return Ok(Validation::Discarded(DiscardReason::Malformed));
        }
    };
    if claimed != computed {
        info!(
            route = %route.label,
            id = %record.id,
            claimed = %claimed,
            computed = %computed,
            "Transfer id mismatch, discarding candidate"
        );
        return Ok(Validation::Discarded(DiscardReason::IdMismatch));
    }

    let filled = route
        .binding
        .is_filled(route.target.client.as_ref(), computed)
        .await
        .wrap_err("Failed to read fill status")?;
    if filled {
        debug!(route = %route.label, transfer_id = %computed, "Transfer already filled");
        return Ok(Validation::Discarded(DiscardReason::AlreadyFilled));
    }

    let lock = route
        .binding
        .lock_state(route.source.client.as_ref(), computed)
        .await
        .wrap_err("Failed to read source lock")?;
    match lock {
        LockState::Active => {}
        LockState::Missing => {
            info!(route = %route.label, transfer_id = %computed, "Source lock not found");
            return Ok(Validation::Discarded(DiscardReason::LockMissing));
        }
        LockState::Closed => {
            info!(route = %route.label, transfer_id = %computed, "Source lock slashed or withdrawn");
            return Ok(Validation::Discarded(DiscardReason::LockClosed));
        }
    }

    let status = route
        .source
        .client
        .tx_status(record.request_tx_hash)
        .await
        .wrap_err("Failed to read source transaction")?;
    let confirmations = match status {
        Some(status) if status.included => status.confirmations,
        _ => {
            debug!(route = %route.label, tx_hash = %record.request_tx_hash, "Source transaction not included");
            return Ok(Validation::Discarded(DiscardReason::SourceTxUnknown));
        }
    };
    if confirmations < route.reorg_threshold {
        debug!(
            route = %route.label,
            transfer_id = %computed,
            confirmations,
            required = route.reorg_threshold,
            "Source transaction below reorg threshold"
        );
        return Ok(Validation::Discarded(DiscardReason::BelowReorgThreshold));
    }

    let gas = route
        .target
        .chain
        .gas_quote(route.target.client.as_ref())
        .await
        .wrap_err("Failed to quote destination gas")?;
    let cost = gas.cost(route.relay_gas_units());
    if cost > route.economics.fee_limit {
        info!(
            route = %route.label,
            transfer_id = %computed,
            cost = %cost,
            fee_limit = %route.economics.fee_limit,
            native = %route.target.chain.native,
            "Relay cost exceeds fee limit"
        );
        return Ok(Validation::Discarded(DiscardReason::OverFeeLimit));
    }

    Ok(Validation::Valid(ValidatedRelay {
        transfer_id: computed,
        gas,
        cost,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_labels_are_distinct() {
        let reasons = [
            DiscardReason::Malformed,
            DiscardReason::IdMismatch,
            DiscardReason::AlreadyFilled,
            DiscardReason::LockMissing,
            DiscardReason::LockClosed,
            DiscardReason::SourceTxUnknown,
            DiscardReason::BelowReorgThreshold,
            DiscardReason::OverFeeLimit,
            DiscardReason::DryRunFailed,
        ];
        let labels: std::collections::HashSet<_> = reasons.iter().map(|r| r.as_str()).collect();
        assert_eq!(labels.len(), reasons.len());
    }
}

//! Prometheus metrics for the relayer
//!
//! Exposed on the /metrics endpoint for Prometheus scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec,
};

lazy_static! {
    // Relay metrics
    pub static ref RELAYS_SUBMITTED: CounterVec = register_counter_vec!(
        "lnrelayer_relays_submitted_total",
        "Relay transactions submitted on the destination chain",
        &["route"]
    ).unwrap();

    pub static ref MULTISIG_PROPOSALS: CounterVec = register_counter_vec!(
        "lnrelayer_multisig_proposals_total",
        "Relays forwarded to the multisig proposal service",
        &["route", "ready"]
    ).unwrap();

    pub static ref CANDIDATES_DISCARDED: CounterVec = register_counter_vec!(
        "lnrelayer_candidates_discarded_total",
        "Indexer candidates discarded during validation",
        &["route", "reason"]
    ).unwrap();

    // Fee metrics
    pub static ref FEE_UPDATES: CounterVec = register_counter_vec!(
        "lnrelayer_fee_updates_total",
        "Fee adjustment runs by outcome",
        &["chain", "outcome"]
    ).unwrap();

    // Scheduling metrics
    pub static ref TICKS_SKIPPED: CounterVec = register_counter_vec!(
        "lnrelayer_ticks_skipped_total",
        "Ticks dropped because the previous tick was still running",
        &["route"]
    ).unwrap();

    pub static ref TICK_ERRORS: CounterVec = register_counter_vec!(
        "lnrelayer_tick_errors_total",
        "Ticks that ended in an error",
        &["route"]
    ).unwrap();

    pub static ref PENDING_BLOCKED: GaugeVec = register_gauge_vec!(
        "lnrelayer_pending_blocked",
        "1 while a destination chain has an unfinalized relay transaction",
        &["chain"]
    ).unwrap();

    // Health metrics
    pub static ref UP: Gauge = register_gauge!(
        "lnrelayer_up",
        "Whether the relayer is up and running"
    ).unwrap();
}

/// Force registration so every metric appears on the first scrape
pub fn init() {
    lazy_static::initialize(&RELAYS_SUBMITTED);
    lazy_static::initialize(&MULTISIG_PROPOSALS);
    lazy_static::initialize(&CANDIDATES_DISCARDED);
    lazy_static::initialize(&FEE_UPDATES);
    lazy_static::initialize(&TICKS_SKIPPED);
    lazy_static::initialize(&TICK_ERRORS);
    lazy_static::initialize(&PENDING_BLOCKED);
    lazy_static::initialize(&UP);
}

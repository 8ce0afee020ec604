//! Route scheduling
//!
//! Every route gets its own interval timer. Each firing spawns a tick task,
//! so a slow tick never delays the timer; the route's permit then drops any
//! tick that would overlap the one still running.

use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::{RelayContext, RouteRelayer, TickOutcome};
use crate::metrics;
use crate::route::BridgeRoute;

pub struct RelayService {
    relayers: Vec<Arc<RouteRelayer>>,
    interval: Duration,
}

impl RelayService {
    pub fn new(routes: Vec<BridgeRoute>, ctx: &RelayContext, interval: Duration) -> Self {
        let relayers = routes
            .into_iter()
            .map(|route| Arc::new(RouteRelayer::new(route, ctx)))
            .collect();
        Self { relayers, interval }
    }

    pub fn relayers(&self) -> &[Arc<RouteRelayer>] {
        &self.relayers
    }

    /// Drive every route until `shutdown` fires, then wait for running ticks
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        info!(
            routes = self.relayers.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Relay service starting"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut routes = JoinSet::new();
        for relayer in self.relayers {
            routes.spawn(drive(relayer, self.interval, stop_rx.clone()));
        }

        let _ = shutdown.recv().await;
        info!("Shutdown signal received, stopping routes");
        let _ = stop_tx.send(true);

        while let Some(joined) = routes.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Route task ended abnormally");
            }
        }
        info!("Relay service stopped");
        Ok(())
    }
}

async fn drive(relayer: Arc<RouteRelayer>, period: Duration, mut stop: watch::Receiver<bool>) {
    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks = JoinSet::new();

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = timer.tick() => {
                let relayer = relayer.clone();
                ticks.spawn(async move { tick_logged(&relayer).await });
            }
            Some(_) = ticks.join_next(), if !ticks.is_empty() => {}
        }
    }

    // a tick between broadcast and record must not be cut short
    while ticks.join_next().await.is_some() {}
    debug!(route = %relayer.route().label, "Route stopped");
}

/// Run one tick, logging instead of propagating failures
pub async fn tick_logged(relayer: &RouteRelayer) -> Option<TickOutcome> {
    let label = relayer.route().label.as_str();
    match relayer.tick().await {
        Ok(outcome) => {
            debug!(route = %label, outcome = ?outcome, "Tick finished");
            Some(outcome)
        }
        Err(e) => {
            metrics::TICK_ERRORS.with_label_values(&[label]).inc();
            error!(route = %label, error = %e, "Tick failed");
            None
        }
    }
}

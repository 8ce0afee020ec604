//! LnBridge Liquidity Relayer
//!
//! Watches the indexer for transfers locked on a source chain, fulfils them
//! on the destination chain on behalf of the configured liquidity providers,
//! tracks each fulfilment to finality and keeps the providers' quoted fees
//! inside their profit band.
//!
//! # Environment
//!
//! - `LP_BRIDGE_PATH`: JSON configuration file
//! - `LP_BRIDGE_STORE_PATH`: pending-transaction store (file path or `postgres://` URL)
//! - `LP_RELAYER_PASSWORD`: passphrase for the encrypted route keys
//! - `LOG_FORMAT=json`: structured log output

use std::sync::Arc;
use std::time::Duration;

use eyre::WrapErr;
use lnbridge_relayer::api::{self, ApiState};
use lnbridge_relayer::config::Config;
use lnbridge_relayer::indexer::IndexerClient;
use lnbridge_relayer::metrics;
use lnbridge_relayer::relayer::{Cadence, RelayContext, RelayService};
use lnbridge_relayer::route::build_routes;
use lnbridge_relayer::secret::KeyDecryptor;
use lnbridge_relayer::store;
use lnbridge_relayer::tracker::PendingTracker;
use tracing::{error, info, warn};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    info!("Starting LnBridge Relayer");

    let config = Config::load()?;
    info!(
        indexer = %config.indexer,
        chains = config.chains.len(),
        bridges = config.bridges.len(),
        "Configuration loaded"
    );

    // no degraded mode without a key
    let decryptor = KeyDecryptor::from_env()?;

    let store_path = Config::store_path()?;
    let store = store::open(&store_path)
        .await
        .wrap_err("Failed to open pending transaction store")?;

    let routes = build_routes(&config, &decryptor)?;
    if routes.is_empty() {
        warn!("No routes configured, relayer will idle");
    }

    metrics::init();
    metrics::UP.set(1.0);

    let schedule = &config.schedule;
    let ctx = RelayContext {
        indexer: Arc::new(IndexerClient::new(&config.indexer)),
        store,
        tracker: PendingTracker::new(schedule.finality_confirmations, schedule.max_status_misses),
        cadence: Cadence::from(schedule),
    };
    let api_state = ApiState {
        routes: Arc::new(routes.iter().map(|r| r.label.clone()).collect()),
    };
    let service = RelayService::new(routes, &ctx, Duration::from_millis(schedule.interval_ms));

    let api_port = config.api_port;
    let server = tokio::spawn(async move {
        if let Err(e) = api::start_server(api_port, api_state).await {
            error!(error = %e, "Health server failed");
        }
    });

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Handle signals
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    service.run(shutdown_rx).await?;

    metrics::UP.set(0.0);
    server.abort();
    info!("LnBridge Relayer stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,lnbridge_relayer=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .init();
    }
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}

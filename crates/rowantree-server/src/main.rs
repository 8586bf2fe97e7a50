//! Rowan Tree server binary.
//!
//! Wires configuration, persistence backends, the economy engine, both
//! HTTP routers, and the optional tick scheduler, then runs until Ctrl-C
//! or until either server fails.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `rowantree-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Connect the configured user store and action queue
//! 4. Build the economy engine over them
//! 5. Serve the public API and the operator API on their own ports
//! 6. Start the tick scheduler when `tick.interval_ms > 0`
//! 7. On shutdown, stop the scheduler between ticks, drain both servers,
//!    and close the `PostgreSQL` pool

mod backends;
mod error;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use rowantree_api::{AppState, ServerConfig, build_operator_router, build_router, start_server};
use rowantree_core::config::LoggingConfig;
use rowantree_core::{
    EconomyEngine, RowantreeConfig, SchedulerConfig, SchedulerControl, run_scheduler,
};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::ServerError;

/// Path of the configuration file, relative to the working directory.
const CONFIG_PATH: &str = "rowantree-config.yaml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging is not up yet, so note a missing file
    //    and report it once the subscriber exists.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("rowantree-server starting");
    if from_file {
        info!(path = CONFIG_PATH, "Configuration loaded");
    } else {
        info!("Config file not found, using defaults");
    }
    info!(
        backend = ?config.infrastructure.backend,
        queue_backend = ?config.infrastructure.queue_backend,
        port = config.server.port,
        operator_port = config.server.operator_port,
        tick_interval_ms = config.tick.interval_ms,
        concurrency = config.tick.concurrency,
        tiers = config.economy.tiers.len(),
        features = config.economy.features.len(),
        recipes = config.economy.merchants.len(),
        "Configuration resolved"
    );

    // 3. Connect backends.
    let backends = backends::connect(&config.infrastructure).await?;

    // 4. Build the engine.
    let engine = Arc::new(
        EconomyEngine::new(
            backends.users,
            backends.queue,
            Arc::new(config.economy),
        )
        .with_concurrency(config.tick.concurrency),
    );
    let state = Arc::new(AppState::new(Arc::clone(&engine)));

    // 5. Serve both routers.
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut servers = JoinSet::new();
    servers.spawn(serve(
        ServerConfig {
            host: config.server.host.clone(),
            port: config.server.port,
        },
        "public",
        build_router(Arc::clone(&state)),
        stop_rx.clone(),
    ));
    servers.spawn(serve(
        ServerConfig {
            host: config.server.host.clone(),
            port: config.server.operator_port,
        },
        "operator",
        build_operator_router(state),
        stop_rx,
    ));

    // 6. Start the scheduler.
    let control = Arc::new(SchedulerControl::new());
    let scheduler = (config.tick.interval_ms > 0).then(|| {
        tokio::spawn(run_scheduler(
            Arc::clone(&engine),
            SchedulerConfig {
                interval: Duration::from_millis(config.tick.interval_ms),
                enqueue_active_users: config.tick.enqueue_active_users,
                max_ticks: 0,
            },
            Arc::clone(&control),
        ))
    });
    if scheduler.is_none() {
        info!("Tick scheduler disabled; ticks run only via the operator API");
    }

    // 7. Wait for Ctrl-C or an early server exit, then shut down.
    let mut failure: Option<ServerError> = None;
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(error) = signal {
                failure = Some(ServerError::from(error));
            }
            info!("Shutdown requested");
        }
        Some(joined) = servers.join_next() => {
            failure = server_exit(joined).err();
            warn!("A server exited early, shutting down");
        }
    }

    stop_tx.send_replace(true);
    control.request_stop();

    while let Some(joined) = servers.join_next().await {
        if let Err(error) = server_exit(joined) {
            failure.get_or_insert(error);
        }
    }

    if let Some(handle) = scheduler {
        match handle.await {
            Ok(result) => info!(
                end_reason = ?result.end_reason,
                total_ticks = result.total_ticks,
                failed_ticks = result.failed_ticks,
                "Tick scheduler stopped"
            ),
            Err(error) => {
                failure.get_or_insert(ServerError::from(error));
            }
        }
    }

    if let Some(pool) = backends.postgres {
        pool.close().await;
    }

    info!(ticks = engine.ticks(), "rowantree-server shutdown complete");

    match failure {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

/// Load `rowantree-config.yaml`, falling back to defaults when it is absent.
///
/// Returns the config and whether it came from the file.
fn load_config() -> Result<(RowantreeConfig, bool), ServerError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        Ok((RowantreeConfig::from_file(config_path)?, true))
    } else {
        Ok((RowantreeConfig::parse("")?, false))
    }
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Serve one router until the stop flag flips.
async fn serve(
    config: ServerConfig,
    name: &'static str,
    router: Router,
    mut stop: watch::Receiver<bool>,
) -> Result<(), rowantree_api::ServerError> {
    let shutdown = async move {
        // A dropped sender also means shutdown.
        let _ = stop.wait_for(|stopped| *stopped).await;
    };
    start_server(&config, name, router, shutdown).await
}

fn server_exit(
    joined: Result<Result<(), rowantree_api::ServerError>, tokio::task::JoinError>,
) -> Result<(), ServerError> {
    Ok(joined??)
}

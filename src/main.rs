// =============================================================================
// Helion Paper Engine — Main Entry Point
// =============================================================================
//
// Positional args: `[duration_hours] [initial_capital_usdt]`, both optional,
// defaulting to 8.0 and 100.0. The session runs for `duration_hours` wall
// time or until Ctrl+C / a kill request on the control API, whichever comes
// first, then saves the runtime config and exits.
// =============================================================================

mod api;
mod bridge;
mod config;
mod control;
mod decision;
mod engine;
mod error;
mod events;
mod indicators;
mod ingest;
mod market;
mod modes;
mod orders;
mod session;
mod types;

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::RuntimeConfig;
use crate::control::ControlState;
use crate::engine::Engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Helion Paper Engine — Starting Up                 ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let args: Vec<String> = std::env::args().collect();
    let duration_hours: f64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(8.0);
    let initial_capital_usdt: f64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(100.0);

    let config_path = "runtime_config.json".to_string();
    let mut config = RuntimeConfig::load(&config_path);
    config.duration_hours = duration_hours;
    config.initial_capital_usdt = initial_capital_usdt;

    if let Ok(sym) = std::env::var("HELION_SYMBOL") {
        if !sym.trim().is_empty() {
            config.symbol = sym.trim().to_uppercase();
        }
    }

    info!(
        symbol = %config.symbol,
        duration_hours = config.duration_hours,
        initial_capital_usdt = config.initial_capital_usdt,
        "runtime config resolved"
    );

    let session_dir = format!("sessions/{}", Utc::now().format("%Y%m%d_%H%M%S"));

    let control = Arc::new(ControlState::new(config.symbol.clone()));

    let (tx, rx) = events::channel();
    ingest::spawn(config.symbol.clone(), tx);

    let api_control = control.clone();
    let bind_addr = std::env::var("HELION_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3101".into());
    tokio::spawn(async move {
        let app = api::rest::router(api_control);
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(addr = %bind_addr, error = %e, "failed to bind control API");
                return;
            }
        };
        info!(addr = %bind_addr, "control API listening");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "control API server failed");
        }
    });

    let engine = Engine::new(config.symbol.clone(), config.clone(), config_path.clone(), rx, control.clone(), session_dir)?;

    let engine_handle = tokio::spawn(engine.run());

    info!(hours = duration_hours, "engine running. Press Ctrl+C to stop early.");

    let duration_limit = tokio::time::Duration::from_secs_f64(duration_hours.max(0.0) * 3600.0);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            warn!("shutdown signal received — stopping gracefully");
        }
        _ = tokio::time::sleep(duration_limit) => {
            info!("session duration elapsed — stopping");
        }
        res = engine_handle => {
            if let Err(e) = res {
                error!(error = %e, "engine task ended unexpectedly");
            }
        }
    }

    control.kill();

    if let Err(e) = config.save(&config_path) {
        error!(error = %e, "failed to save runtime config on shutdown");
    }

    info!("Helion Paper Engine shut down complete.");
    Ok(())
}

// =============================================================================
// EMA Cross Engine: Main Entry Point
// =============================================================================
//
// Demo mode (the default) reads public market data from the exchange and keeps
// every order in the in-process paper broker.  Live mode sends signed orders.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod binance;
mod broker;
mod engine;
mod error;
mod indicators;
mod market_data;
mod order_lifecycle;
mod report;
mod risk;
mod runtime_config;
mod signals;
mod strategy;
mod types;

use anyhow::Context;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::binance::BinanceClient;
use crate::broker::{BrokerGateway, Credentials, PaperBroker};
use crate::engine::TradingEngine;
use crate::runtime_config::RuntimeConfig;
use crate::types::AccountMode;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("EMA Cross Engine starting up");

    let config_path = RuntimeConfig::path_from_env();
    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env_overrides();

    let settings = config.validate().context("invalid engine configuration")?;

    info!(
        account_mode = %settings.account_mode,
        symbols = ?settings.symbols,
        timeframe = %settings.timeframe,
        short = settings.short_ema_period,
        long = settings.long_ema_period,
        risk_pct = settings.risk_pct,
        "Configuration validated"
    );

    // ── 2. Broker gateway ────────────────────────────────────────────────
    let client = BinanceClient::new(settings.base_url.clone())
        .context("failed to build exchange client")?;

    let gateway: Box<dyn BrokerGateway> = match settings.account_mode {
        AccountMode::Live => Box::new(client),
        AccountMode::Demo => {
            let paper = PaperBroker::with_market_feed(client);
            if let Some(asset) = &settings.balance_asset {
                paper.set_balance(asset, settings.balance);
            }
            Box::new(paper)
        }
    };

    // ── 3. Session & symbols ─────────────────────────────────────────────
    let credentials = Credentials::from_env();
    let poll_interval = settings.poll_interval;

    let mut engine = TradingEngine::connect(gateway, &credentials, settings)
        .await
        .context("failed to establish broker session")?;
    engine.start().await.context("failed to initialise symbols")?;

    // ── 4. Polling loop ──────────────────────────────────────────────────
    let mut interval = tokio::time::interval(poll_interval);
    let outcome: anyhow::Result<()> = loop {
        tokio::select! {
            _ = interval.tick() => {
                match engine.run_cycle().await {
                    Ok(reports) => {
                        let trades = reports.iter().filter(|r| r.is_trade()).count();
                        debug!(symbols = reports.len(), trades, "cycle complete");
                        for report in &reports {
                            if let Ok(json) = serde_json::to_string(report) {
                                debug!(report = %json, "cycle report");
                            }
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "session failure, stopping");
                        break Err(e.into());
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break Ok(());
            }
        }
    };

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    if let Err(e) = engine.shutdown().await {
        error!(error = %e, "Failed to close broker session");
    }

    info!("EMA Cross Engine stopped");
    outcome
}

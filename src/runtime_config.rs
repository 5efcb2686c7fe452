// =============================================================================
// Runtime Configuration: JSON engine settings with env overrides
// =============================================================================
//
// All fields carry `#[serde(default)]` so that a partial file (or `{}`) still
// loads.  `validate()` turns the raw file into `StrategySettings` and is the
// single place where bad parameters are rejected, before any cycle runs.
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::binance::{DEFAULT_BASE_URL, MAX_KLINES};
use crate::error::EngineError;
use crate::market_data::Timeframe;
use crate::types::AccountMode;

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "engine_config.json";

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_strategy_name() -> String {
    "EMACross".to_string()
}

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}

fn default_timeframe() -> String {
    "H1".to_string()
}

fn default_short_ema_period() -> usize {
    50
}

fn default_long_ema_period() -> usize {
    200
}

fn default_balance() -> f64 {
    10_000.0
}

fn default_risk_pct() -> f64 {
    0.01
}

fn default_candle_count() -> usize {
    1000
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Raw configuration as read from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Demo (paper orders, public market data) or Live.
    #[serde(default)]
    pub account_mode: AccountMode,

    /// Prefix of every order tag.
    #[serde(default = "default_strategy_name")]
    pub strategy_name: String,

    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Timeframe tag, terminal style (`H1`) or exchange style (`1h`).
    #[serde(default = "default_timeframe")]
    pub timeframe: String,

    #[serde(default = "default_short_ema_period")]
    pub short_ema_period: usize,

    #[serde(default = "default_long_ema_period")]
    pub long_ema_period: usize,

    /// Static account balance used for sizing when `balance_asset` is unset.
    #[serde(default = "default_balance")]
    pub balance: f64,

    /// Fraction of balance risked per trade (0.01 = 1 %).
    #[serde(default = "default_risk_pct")]
    pub risk_pct: f64,

    /// When set, the broker balance of this asset replaces `balance` each
    /// cycle.
    #[serde(default)]
    pub balance_asset: Option<String>,

    /// Closed bars fetched per symbol per cycle.
    #[serde(default = "default_candle_count")]
    pub candle_count: usize,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// REST endpoint for account and market data.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            account_mode: AccountMode::Demo,
            strategy_name: default_strategy_name(),
            symbols: default_symbols(),
            timeframe: default_timeframe(),
            short_ema_period: default_short_ema_period(),
            long_ema_period: default_long_ema_period(),
            balance: default_balance(),
            risk_pct: default_risk_pct(),
            balance_asset: None,
            candle_count: default_candle_count(),
            poll_interval_secs: default_poll_interval_secs(),
            base_url: default_base_url(),
        }
    }
}

/// Validated, typed settings consumed by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategySettings {
    pub account_mode: AccountMode,
    pub strategy_name: String,
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
    pub short_ema_period: usize,
    pub long_ema_period: usize,
    pub balance: f64,
    pub risk_pct: f64,
    pub balance_asset: Option<String>,
    pub candle_count: usize,
    pub poll_interval: Duration,
    pub base_url: String,
}

impl RuntimeConfig {
    /// Config path from `EMACROSS_CONFIG`, else `engine_config.json`.
    pub fn path_from_env() -> String {
        std::env::var("EMACROSS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            account_mode = %config.account_mode,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Apply `EMACROSS_SYMBOLS` if present.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("EMACROSS_SYMBOLS") {
            self.override_symbols(&raw);
        }
    }

    /// Replace the symbol list with a comma separated, upper-cased list.
    /// An override that yields no symbols is ignored.
    pub fn override_symbols(&mut self, raw: &str) {
        let symbols: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !symbols.is_empty() {
            self.symbols = symbols;
        }
    }

    /// Check every parameter and produce typed settings.
    ///
    /// # Errors
    /// `EngineError::Config` on the first invalid parameter.
    pub fn validate(&self) -> Result<StrategySettings, EngineError> {
        if self.short_ema_period == 0 {
            return Err(EngineError::Config("short_ema_period must be positive".into()));
        }
        if self.long_ema_period <= self.short_ema_period {
            return Err(EngineError::Config(format!(
                "long_ema_period ({}) must be greater than short_ema_period ({})",
                self.long_ema_period, self.short_ema_period
            )));
        }
        let timeframe = Timeframe::from_tag(&self.timeframe)?;

        if self.symbols.is_empty() {
            return Err(EngineError::Config("no symbols configured".into()));
        }
        if self.strategy_name.trim().is_empty() {
            return Err(EngineError::Config("strategy_name must not be empty".into()));
        }
        if !(self.balance > 0.0) {
            return Err(EngineError::Config(format!("balance must be positive, got {}", self.balance)));
        }
        if !(self.risk_pct > 0.0 && self.risk_pct <= 1.0) {
            return Err(EngineError::Config(format!(
                "risk_pct must be in (0, 1], got {}",
                self.risk_pct
            )));
        }
        // One page of klines, less the forming bar, is all a cycle ever sees.
        let usable_bars = self.candle_count.min(MAX_KLINES - 1);
        if usable_bars <= self.long_ema_period {
            return Err(EngineError::Config(format!(
                "candle_count ({}, at most {} closed bars per fetch) must exceed long_ema_period ({})",
                self.candle_count,
                MAX_KLINES - 1,
                self.long_ema_period
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(EngineError::Config("poll_interval_secs must be positive".into()));
        }

        Ok(StrategySettings {
            account_mode: self.account_mode,
            strategy_name: self.strategy_name.clone(),
            symbols: self.symbols.clone(),
            timeframe,
            short_ema_period: self.short_ema_period,
            long_ema_period: self.long_ema_period,
            balance: self.balance,
            risk_pct: self.risk_pct,
            balance_asset: self.balance_asset.clone(),
            candle_count: self.candle_count,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            base_url: self.base_url.clone(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let settings = RuntimeConfig::default().validate().unwrap();
        assert_eq!(settings.account_mode, AccountMode::Demo);
        assert_eq!(settings.strategy_name, "EMACross");
        assert_eq!(settings.timeframe, Timeframe::H1);
        assert_eq!(settings.candle_count, 1000);
        assert_eq!(settings.poll_interval, Duration::from_secs(60));
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "account_mode": "Live", "symbols": ["EURUSD"], "timeframe": "M15" }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.account_mode, AccountMode::Live);
        assert_eq!(cfg.symbols, vec!["EURUSD"]);
        assert_eq!(cfg.long_ema_period, 200);
        assert!(cfg.balance_asset.is_none());
        assert_eq!(cfg.validate().unwrap().timeframe, Timeframe::M15);
    }

    #[test]
    fn long_period_must_exceed_short() {
        let mut cfg = RuntimeConfig::default();
        cfg.short_ema_period = 20;
        cfg.long_ema_period = 20;
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
        cfg.long_ema_period = 10;
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn unknown_timeframe_is_rejected() {
        let cfg = RuntimeConfig {
            timeframe: "H3".into(),
            ..RuntimeConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn bad_money_parameters() {
        for (balance, risk) in [(0.0, 0.01), (-5.0, 0.01), (1000.0, 0.0), (1000.0, 1.5), (f64::NAN, 0.01)] {
            let cfg = RuntimeConfig {
                balance,
                risk_pct: risk,
                ..RuntimeConfig::default()
            };
            assert!(cfg.validate().is_err(), "balance {balance} risk {risk}");
        }
    }

    #[test]
    fn too_few_candles_for_long_period() {
        let cfg = RuntimeConfig {
            candle_count: 200,
            ..RuntimeConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn long_period_must_fit_in_one_kline_page() {
        let mut cfg = RuntimeConfig {
            candle_count: 5000,
            short_ema_period: 50,
            long_ema_period: 999,
            ..RuntimeConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));

        cfg.long_ema_period = 998;
        assert_eq!(cfg.validate().unwrap().long_ema_period, 998);
    }

    #[test]
    fn symbol_override() {
        let mut cfg = RuntimeConfig::default();
        cfg.override_symbols(" eurusd, usdjpy ,,");
        assert_eq!(cfg.symbols, vec!["EURUSD", "USDJPY"]);

        cfg.override_symbols(" , ");
        assert_eq!(cfg.symbols, vec!["EURUSD", "USDJPY"]);
    }

    #[test]
    fn empty_symbols_rejected() {
        let cfg = RuntimeConfig {
            symbols: vec![],
            ..RuntimeConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(RuntimeConfig::load("/nonexistent/engine_config.json").is_err());
    }
}

// =============================================================================
// Trading Engine: one polling cycle over every configured symbol
// =============================================================================
//
// Owns the broker session and processes symbols strictly one after another:
// list -> cancel -> submit for symbol A completes before symbol B starts.
//
// Per symbol:
//   1. Fetch closed candles
//   2. Skip if the newest closed bar was already evaluated
//   3. Evaluate the crossover on that bar and size a proposal
//   4. Cancel stale tagged orders, then validate + submit the proposal
//
// Symbol-scoped errors become a `Skipped` outcome and the cycle moves on.
// Session-scoped errors abort the cycle and are returned to the caller.
// =============================================================================

use chrono::Utc;
use tracing::{info, warn};

use crate::broker::{BrokerGateway, Credentials, Session};
use crate::error::{BrokerError, EngineError};
use crate::market_data::BarClock;
use crate::order_lifecycle::OrderLifecycleManager;
use crate::report::{CycleReport, SymbolOutcome};
use crate::runtime_config::StrategySettings;
use crate::strategy::EmaCrossStrategy;
use crate::types::AccountState;

/// Bars of silence after which the feed is reported as stale.
const STALE_BARS: i64 = 3;

pub struct TradingEngine<G: BrokerGateway> {
    gateway: G,
    session: Session,
    strategy: EmaCrossStrategy,
    settings: StrategySettings,
    lifecycle: OrderLifecycleManager,
    clock: BarClock,
    active_symbols: Vec<String>,
}

impl<G: BrokerGateway> TradingEngine<G> {
    /// Validate the strategy and open a broker session.
    ///
    /// # Errors
    /// `EngineError::Config` for invalid EMA periods (checked before any
    /// broker call), `EngineError::Auth` if the broker refuses the
    /// credentials.
    pub async fn connect(
        gateway: G,
        credentials: &Credentials,
        settings: StrategySettings,
    ) -> Result<Self, EngineError> {
        let strategy = EmaCrossStrategy::new(
            settings.strategy_name.clone(),
            settings.short_ema_period,
            settings.long_ema_period,
            settings.timeframe,
        )?;

        let session = gateway.connect(credentials).await.map_err(|e| match e {
            BrokerError::Auth(msg) => EngineError::Auth(msg),
            other => EngineError::Broker(other),
        })?;

        info!(
            session_id = %session.id,
            account = %session.account,
            strategy = strategy.name(),
            short = strategy.short_period(),
            long = strategy.long_period(),
            timeframe = %strategy.timeframe(),
            "engine connected"
        );

        Ok(Self {
            gateway,
            session,
            strategy,
            settings,
            lifecycle: OrderLifecycleManager::new(),
            clock: BarClock::new(),
            active_symbols: Vec::new(),
        })
    }

    #[cfg(test)]
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn active_symbols(&self) -> &[String] {
        &self.active_symbols
    }

    /// Initialise every configured symbol.  Symbols the broker does not know
    /// or will not trade are dropped with a warning.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        let mut active = Vec::with_capacity(self.settings.symbols.len());

        for symbol in &self.settings.symbols {
            match self.gateway.initialize_symbol(&self.session, symbol).await {
                Ok(true) => active.push(symbol.clone()),
                Ok(false) => warn!(symbol = %symbol, "symbol not tradable, dropped"),
                Err(e) if e.is_session_scoped() => return Err(e.into()),
                Err(e) => warn!(symbol = %symbol, error = %e, "symbol initialisation failed, dropped"),
            }
        }

        if active.is_empty() {
            return Err(EngineError::Config("none of the configured symbols is tradable".into()));
        }

        info!(symbols = ?active, "engine started");
        self.active_symbols = active;
        Ok(())
    }

    /// Run one cycle over all active symbols.
    ///
    /// # Errors
    /// Only session-scoped failures; everything else is reported per symbol.
    pub async fn run_cycle(&self) -> Result<Vec<CycleReport>, EngineError> {
        let account = self.account_state().await?;
        let mut reports = Vec::with_capacity(self.active_symbols.len());

        for symbol in &self.active_symbols {
            let outcome = match self.process_symbol(symbol, &account).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_symbol_scoped() => {
                    warn!(
                        symbol = %symbol,
                        error = %e,
                        lifecycle = ?self.lifecycle.last_state(symbol),
                        "symbol skipped this cycle"
                    );
                    SymbolOutcome::Skipped { reason: e.to_string() }
                }
                Err(e) => return Err(e),
            };

            info!(symbol = %symbol, outcome = %outcome, "cycle outcome");
            reports.push(CycleReport::new(symbol.clone(), self.strategy.name(), outcome));
        }

        Ok(reports)
    }

    /// Close the broker session.
    pub async fn shutdown(self) -> Result<(), EngineError> {
        self.gateway.disconnect(&self.session).await?;
        info!(session_id = %self.session.id, "engine shut down");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    async fn account_state(&self) -> Result<AccountState, EngineError> {
        let mut balance = self.settings.balance;

        if let Some(asset) = &self.settings.balance_asset {
            match self.gateway.account_balance(&self.session, asset).await {
                Ok(free) => balance = free,
                Err(e) if e.is_session_scoped() => return Err(e.into()),
                Err(e) => warn!(asset = %asset, error = %e, "balance unavailable, using configured balance"),
            }
        }

        Ok(AccountState {
            balance,
            risk_pct: self.settings.risk_pct,
        })
    }

    async fn process_symbol(
        &self,
        symbol: &str,
        account: &AccountState,
    ) -> Result<SymbolOutcome, EngineError> {
        let series = self
            .gateway
            .fetch_candles(&self.session, symbol, self.strategy.timeframe(), self.settings.candle_count)
            .await?;

        if !series.is_chronological() {
            warn!(symbol, "candles are not in strictly increasing time order");
        }

        let first_look = self.clock.last_seen(symbol).is_none();
        if let Some(last) = series.last() {
            let age_ms = Utc::now().timestamp_millis() - last.open_time;
            if age_ms > STALE_BARS * series.timeframe().duration_ms() {
                warn!(symbol, age_ms, "latest closed bar is stale");
            }
            if !self.clock.observe(symbol, last.open_time) {
                return Ok(SymbolOutcome::NoSignal {
                    reason: "no new closed bar".into(),
                });
            }
        }

        if first_look {
            let history = self.strategy.backfill(&series)?;
            info!(
                symbol,
                bars = series.len(),
                crossovers = history.len(),
                "historical crossovers on first evaluation"
            );
        }

        let proposal = match self.strategy.evaluate_latest(&series)? {
            Some(event) => Some(self.strategy.propose(symbol, &event, account)?),
            None => None,
        };

        let comment = self.strategy.comment_for(symbol);
        let result = self
            .lifecycle
            .reconcile_and_submit(&self.gateway, &self.session, symbol, &comment, proposal.as_ref())
            .await?;

        Ok(match (result.order_id(), proposal) {
            (Some(order_id), Some(p)) => SymbolOutcome::TradeSubmitted {
                order_id,
                direction: p.direction,
                lot_size: p.lot_size,
            },
            _ if result.cancelled > 0 => SymbolOutcome::NoSignal {
                reason: format!("no crossover, {} stale order(s) cancelled", result.cancelled),
            },
            _ => SymbolOutcome::NoSignal {
                reason: "no crossover on latest bar".into(),
            },
        })
    }
}

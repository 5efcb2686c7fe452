// =============================================================================
// EMA Cross Strategy: turns a candle series into trade proposals
// =============================================================================
//
// Pipeline per symbol:
//   1. Short and long EMA columns over the close prices
//   2. Crossover test on the most recent closed bar (or every bar when
//      backfilling history)
//   3. Stop / target geometry from the crossover bar
//   4. Lot size from account balance and stop distance
//   5. TradeProposal tagged "{strategy_name}_{symbol}"
// =============================================================================

use tracing::{debug, info};

use crate::error::EngineError;
use crate::indicators::{compute_ema, IndicatorColumn};
use crate::market_data::{Series, Timeframe};
use crate::risk::size_position;
use crate::signals::{detect_crossovers, evaluate, round2, CrossEvent};
use crate::types::{AccountState, TradeProposal};

/// Validated EMA crossover configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EmaCrossStrategy {
    name: String,
    short_period: usize,
    long_period: usize,
    timeframe: Timeframe,
}

impl EmaCrossStrategy {
    /// # Errors
    /// `EngineError::Config` if `long_period <= short_period` or
    /// `short_period == 0`.
    pub fn new(
        name: impl Into<String>,
        short_period: usize,
        long_period: usize,
        timeframe: Timeframe,
    ) -> Result<Self, EngineError> {
        if short_period == 0 {
            return Err(EngineError::Config("short EMA period must be positive".into()));
        }
        if long_period <= short_period {
            return Err(EngineError::Config(format!(
                "long EMA period ({long_period}) must be greater than short EMA period ({short_period})"
            )));
        }

        Ok(Self {
            name: name.into(),
            short_period,
            long_period,
            timeframe,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_period(&self) -> usize {
        self.short_period
    }

    pub fn long_period(&self) -> usize {
        self.long_period
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Order tag identifying this strategy's orders on `symbol`.
    pub fn comment_for(&self, symbol: &str) -> String {
        format!("{}_{}", self.name, symbol)
    }

    fn columns(&self, series: &Series) -> Result<(IndicatorColumn, IndicatorColumn), EngineError> {
        let long = compute_ema(series, self.long_period)?;
        let short = compute_ema(series, self.short_period)?;
        debug!(
            symbol = series.symbol(),
            bars = series.len(),
            short = short.period(),
            long = long.period(),
            "EMA columns computed"
        );
        Ok((short, long))
    }

    /// Crossover on the most recent closed bar, if it is tradable.
    ///
    /// # Errors
    /// `EngineError::InsufficientData` when the series is not longer than the
    /// long period.
    pub fn evaluate_latest(&self, series: &Series) -> Result<Option<CrossEvent>, EngineError> {
        let (short, long) = self.columns(series)?;
        let Some(last) = series.last_index() else {
            return Ok(None);
        };

        let event = evaluate(series, &short, &long, last, self.long_period);
        if let Some(ev) = &event {
            info!(
                symbol = series.symbol(),
                direction = %ev.direction,
                stop_loss = ev.stop_loss,
                stop_price = ev.stop_price,
                take_profit = ev.take_profit,
                "crossover on latest bar"
            );
        } else {
            debug!(symbol = series.symbol(), index = last, "no tradable crossover on latest bar");
        }
        Ok(event)
    }

    /// Every tradable crossover over the whole history, oldest first.
    pub fn backfill(&self, series: &Series) -> Result<Vec<CrossEvent>, EngineError> {
        let (short, long) = self.columns(series)?;
        let events: Vec<CrossEvent> = detect_crossovers(&short, &long)
            .filter(|&(_, crossed)| crossed)
            .filter_map(|(i, _)| evaluate(series, &short, &long, i, self.long_period))
            .collect();

        debug!(symbol = series.symbol(), count = events.len(), "crossover history evaluated");
        Ok(events)
    }

    /// Size `event` against `account` and build the order proposal.
    ///
    /// # Errors
    /// `EngineError::Division` if the stop distance is zero.
    pub fn propose(
        &self,
        symbol: &str,
        event: &CrossEvent,
        account: &AccountState,
    ) -> Result<TradeProposal, EngineError> {
        let balance = round2(account.balance);
        let lot_size = size_position(
            balance,
            account.risk_pct,
            event.stop_loss,
            event.stop_price,
            symbol,
        )?;

        Ok(TradeProposal {
            symbol: symbol.to_string(),
            direction: event.direction,
            lot_size,
            stop_loss: round2(event.stop_loss),
            stop_price: round2(event.stop_price),
            take_profit: round2(event.take_profit),
            comment: self.comment_for(symbol),
        })
    }
}

// =============================================================================
// Signal Evaluator: stop / target geometry at a crossover bar
// =============================================================================
//
//   stop_loss  = long EMA at the crossover bar
//   Bullish    : stop_price = high, take_profit = stop_price + distance
//   Bearish    : stop_price = low,  take_profit = stop_price - distance
//
// All levels are rounded to 2 decimals.  A crossover whose rounded stop-loss
// equals its rounded stop price carries no tradable distance and is dropped.
// =============================================================================

use tracing::debug;

use super::crossover::is_cross_at;
use crate::indicators::IndicatorColumn;
use crate::market_data::Series;
use crate::types::Direction;

/// Round to 2 decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A tradable crossover.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossEvent {
    pub index: usize,
    pub direction: Direction,
    pub stop_loss: f64,
    pub stop_price: f64,
    pub take_profit: f64,
}

/// Classify the bar body.
pub fn bar_direction(open: f64, close: f64) -> Direction {
    if open < close {
        Direction::Bullish
    } else if open > close {
        Direction::Bearish
    } else {
        Direction::None
    }
}

/// Evaluate the crossover at `cross_index`.
///
/// Returns `None` when:
/// - the bar is before the long EMA has a defined predecessor,
/// - the short/long relation does not flip at this bar,
/// - the bar is a doji (no direction),
/// - the rounded stop-loss equals the rounded stop price.
pub fn evaluate(
    series: &Series,
    short_col: &IndicatorColumn,
    long_col: &IndicatorColumn,
    cross_index: usize,
    long_period: usize,
) -> Option<CrossEvent> {
    if cross_index <= long_period {
        return None;
    }
    if !is_cross_at(short_col, long_col, cross_index)? {
        return None;
    }

    let bar = series.get(cross_index)?;
    let stop_loss = round2(long_col.get(cross_index)?);

    let (direction, stop_price, take_profit) = match bar_direction(bar.open, bar.close) {
        Direction::Bullish => {
            let stop_price = round2(bar.high);
            let distance = stop_price - stop_loss;
            (Direction::Bullish, stop_price, round2(stop_price + distance))
        }
        Direction::Bearish => {
            let stop_price = round2(bar.low);
            let distance = stop_loss - stop_price;
            (Direction::Bearish, stop_price, round2(stop_price - distance))
        }
        Direction::None => {
            debug!(symbol = series.symbol(), cross_index, "doji at crossover, no direction");
            return None;
        }
    };

    if stop_loss == stop_price {
        debug!(
            symbol = series.symbol(),
            cross_index,
            stop_loss,
            "degenerate crossover: stop-loss equals stop price after rounding"
        );
        return None;
    }

    Some(CrossEvent {
        index: cross_index,
        direction,
        stop_loss,
        stop_price,
        take_profit,
    })
}

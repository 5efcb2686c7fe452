
use super::Timeframe;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single closed OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    /// Bar open time, UNIX milliseconds.
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(open_time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

// ---------------------------------------------------------------------------
// Series -- read-only snapshot for one evaluation cycle
// ---------------------------------------------------------------------------

/// Ordered candles for one `(symbol, timeframe)` pair, oldest first.
///
/// A `Series` is built once from a broker response and never mutated; the
/// indicator and signal code borrow it and index it by bar position.  Gaps and
/// ordering are the supplier's responsibility.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    symbol: String,
    timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl Series {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            candles,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Index of the most recent bar, `None` for an empty series.
    pub fn last_index(&self) -> Option<usize> {
        self.candles.len().checked_sub(1)
    }

    pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.candles.iter().map(|c| c.close)
    }

    /// `true` when open times are strictly increasing.
    pub fn is_chronological(&self) -> bool {
        self.candles
            .windows(2)
            .all(|w| w[0].open_time < w[1].open_time)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The column is aligned with the series: indices `< period` are undefined
// (`None`), index `period` holds the SMA of closes `[0, period)`, and every
// later index follows the recursion above.
// =============================================================================

use crate::error::EngineError;
use crate::market_data::Series;

/// One EMA value per bar of the source series.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorColumn {
    period: usize,
    values: Vec<Option<f64>>,
}

impl IndicatorColumn {
    pub fn period(&self) -> usize {
        self.period
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at bar `index`; `None` in the warm-up region or out of range.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }

    /// Index of the first defined value.
    pub fn first_defined(&self) -> Option<usize> {
        self.values.iter().position(Option::is_some)
    }
}

/// Compute the EMA column of `series` for `period`.
///
/// # Errors
/// - `period == 0` => `EngineError::Config`
/// - `series.len() <= period` => `EngineError::InsufficientData`
pub fn compute_ema(series: &Series, period: usize) -> Result<IndicatorColumn, EngineError> {
    if period == 0 {
        return Err(EngineError::Config("EMA period must be at least 1".into()));
    }
    if series.len() <= period {
        return Err(EngineError::InsufficientData {
            required: period,
            available: series.len(),
        });
    }

    let multiplier = 2.0 / (period + 1) as f64;
    let closes: Vec<f64> = series.closes().collect();

    let mut values = vec![None; closes.len()];

    // Seed: SMA of the first `period` closes, placed at index `period`.
    let seed = closes[..period].iter().sum::<f64>() / period as f64;
    values[period] = Some(seed);

    let mut prev = seed;
    for (i, &close) in closes.iter().enumerate().skip(period + 1) {
        let ema = close * multiplier + prev * (1.0 - multiplier);
        values[i] = Some(ema);
        prev = ema;
    }

    Ok(IndicatorColumn { period, values })
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::{Candle, Timeframe};

    fn series_from_closes(closes: &[f64]) -> Series {
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::new(i as i64 * 60_000, c, c, c, c, 1.0))
            .collect();
        Series::new("EURUSD", Timeframe::M1, candles)
    }

    #[test]
    fn ema_period_zero() {
        let s = series_from_closes(&[1.0, 2.0, 3.0]);
        assert!(matches!(compute_ema(&s, 0), Err(EngineError::Config(_))));
    }

    #[test]
    fn ema_insufficient_data() {
        let s = series_from_closes(&[1.0, 2.0]);
        assert_eq!(
            compute_ema(&s, 2),
            Err(EngineError::InsufficientData { required: 2, available: 2 })
        );
        assert!(compute_ema(&s, 5).is_err());
    }

    #[test]
    fn ema_known_values() {
        // closes [1,2,3,4,5], period 2 => m = 2/3
        let s = series_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let col = compute_ema(&s, 2).unwrap();

        assert_eq!(col.len(), 5);
        assert_eq!(col.get(0), None);
        assert_eq!(col.get(1), None);
        assert!((col.get(2).unwrap() - 1.5).abs() < 1e-12);
        assert!((col.get(3).unwrap() - 3.166_666_666_666_667).abs() < 1e-9);
        assert!((col.get(4).unwrap() - 4.388_888_888_888_889).abs() < 1e-9);
        assert_eq!(col.first_defined(), Some(2));
    }

    #[test]
    fn seed_is_mean_of_first_period_closes() {
        let closes: Vec<f64> = (1..=30).map(|x| (x as f64).sin() + 10.0).collect();
        let s = series_from_closes(&closes);
        for p in 1..closes.len() {
            let col = compute_ema(&s, p).unwrap();
            let mean = closes[..p].iter().sum::<f64>() / p as f64;
            assert!((col.get(p).unwrap() - mean).abs() < 1e-12, "period {p}");
        }
    }

    #[test]
    fn recursion_holds_after_seed() {
        let closes: Vec<f64> = (0..50).map(|x| 100.0 + (x as f64 * 0.7).cos()).collect();
        let s = series_from_closes(&closes);
        let p = 9;
        let m = 2.0 / (p as f64 + 1.0);
        let col = compute_ema(&s, p).unwrap();
        for i in (p + 1)..closes.len() {
            let expected = closes[i] * m + col.get(i - 1).unwrap() * (1.0 - m);
            assert!((col.get(i).unwrap() - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn warmup_is_undefined_not_zero() {
        let s = series_from_closes(&[0.0, 0.0, 0.0, 0.0]);
        let col = compute_ema(&s, 3).unwrap();
        assert_eq!(col.get(2), None);
        // A legitimate zero price still yields a defined zero EMA.
        assert_eq!(col.get(3), Some(0.0));
    }

    #[test]
    fn input_series_is_untouched() {
        let s = series_from_closes(&[1.0, 2.0, 3.0, 4.0]);
        let before = s.clone();
        let _ = compute_ema(&s, 2).unwrap();
        assert_eq!(s, before);
    }
}

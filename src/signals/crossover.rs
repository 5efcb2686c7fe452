// =============================================================================
// Crossover Detector
// =============================================================================
//
// position[i] = short[i] > long[i], defined only where both EMAs are defined.
// A crossover is flagged at i when position[i] != position[i - 1].  The first
// bar with a defined position has no predecessor and is never emitted.
// =============================================================================

use crate::indicators::IndicatorColumn;

/// "Short above long" relation at bar `index`, if both EMAs are defined.
pub fn position_at(short: &IndicatorColumn, long: &IndicatorColumn, index: usize) -> Option<bool> {
    match (short.get(index), long.get(index)) {
        (Some(s), Some(l)) => Some(s > l),
        _ => None,
    }
}

/// Whether the relation flips at `index` versus `index - 1`.
///
/// `None` when either bar lacks a defined relation.
pub fn is_cross_at(short: &IndicatorColumn, long: &IndicatorColumn, index: usize) -> Option<bool> {
    let prev = index.checked_sub(1)?;
    let now = position_at(short, long, index)?;
    let before = position_at(short, long, prev)?;
    Some(now != before)
}

/// Lazy sequence of `(index, is_cross)` pairs.
///
/// Cheap to clone; cloning or calling [`detect_crossovers`] again restarts
/// from the first bar.
#[derive(Debug, Clone)]
pub struct Crossovers<'a> {
    short: &'a IndicatorColumn,
    long: &'a IndicatorColumn,
    next: usize,
    end: usize,
    prev: Option<bool>,
}

impl Iterator for Crossovers<'_> {
    type Item = (usize, bool);

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.end {
            let i = self.next;
            self.next += 1;

            let current = position_at(self.short, self.long, i);
            let prev = std::mem::replace(&mut self.prev, current);

            if let (Some(now), Some(before)) = (current, prev) {
                return Some((i, now != before));
            }
        }
        None
    }
}

/// Walk both columns and report every bar that has a defined predecessor.
pub fn detect_crossovers<'a>(short: &'a IndicatorColumn, long: &'a IndicatorColumn) -> Crossovers<'a> {
    let end = short.len().min(long.len());
    let start = match (short.first_defined(), long.first_defined()) {
        (Some(a), Some(b)) => a.max(b),
        _ => end,
    };
    Crossovers {
        short,
        long,
        next: start,
        end,
        prev: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::compute_ema;
    use crate::market_data::{Candle, Series, Timeframe};

    fn series_from_closes(closes: &[f64]) -> Series {
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::new(i as i64 * 60_000, c, c, c, c, 1.0))
            .collect();
        Series::new("EURUSD", Timeframe::M1, candles)
    }

    /// Rises, falls, then rises again.
    fn zigzag() -> Series {
        let mut closes = Vec::new();
        closes.extend((0..20).map(|x| 100.0 + x as f64));
        closes.extend((0..20).map(|x| 120.0 - 2.0 * x as f64));
        closes.extend((0..20).map(|x| 80.0 + 3.0 * x as f64));
        series_from_closes(&closes)
    }

    #[test]
    fn first_defined_bar_is_never_emitted() {
        let s = zigzag();
        let short = compute_ema(&s, 3).unwrap();
        let long = compute_ema(&s, 8).unwrap();

        let pairs: Vec<(usize, bool)> = detect_crossovers(&short, &long).collect();
        // Long EMA first defined at 8, so output starts at 9.
        assert_eq!(pairs.first().map(|p| p.0), Some(9));
        assert!(pairs.iter().all(|&(i, _)| i > 8));
        assert_eq!(pairs.len(), s.len() - 9);
    }

    #[test]
    fn flags_match_position_flips() {
        let s = zigzag();
        let short = compute_ema(&s, 3).unwrap();
        let long = compute_ema(&s, 8).unwrap();

        for (i, flagged) in detect_crossovers(&short, &long) {
            let now = short.get(i).unwrap() > long.get(i).unwrap();
            let before = short.get(i - 1).unwrap() > long.get(i - 1).unwrap();
            assert_eq!(flagged, now != before, "bar {i}");
            assert_eq!(is_cross_at(&short, &long, i), Some(flagged));
        }

        let crosses = detect_crossovers(&short, &long).filter(|&(_, c)| c).count();
        assert_eq!(crosses, 2, "one bearish and one bullish flip expected");
    }

    #[test]
    fn sequence_is_restartable() {
        let s = zigzag();
        let short = compute_ema(&s, 3).unwrap();
        let long = compute_ema(&s, 8).unwrap();

        let iter = detect_crossovers(&short, &long);
        let a: Vec<_> = iter.clone().collect();
        let b: Vec<_> = iter.collect();
        assert_eq!(a, b);
    }

    #[test]
    fn no_predecessor_means_no_cross() {
        let s = zigzag();
        let short = compute_ema(&s, 3).unwrap();
        let long = compute_ema(&s, 8).unwrap();
        assert_eq!(is_cross_at(&short, &long, 8), None);
        assert_eq!(is_cross_at(&short, &long, 0), None);
    }
}

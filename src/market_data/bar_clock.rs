// =============================================================================
// Bar Clock: one evaluation per closed bar per symbol
// =============================================================================
//
// The polling loop ticks much faster than bars close.  The clock remembers the
// open time of the last bar evaluated for every symbol so that a second poll
// over the same closed bar is recognised and skipped instead of producing a
// duplicate proposal.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

/// Tracks the last evaluated bar per symbol.
#[derive(Debug, Default)]
pub struct BarClock {
    last_seen: RwLock<HashMap<String, i64>>,
}

impl BarClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `open_time` for `symbol`.
    ///
    /// Returns `true` if this bar is newer than the last one observed, `false`
    /// if it was already evaluated (or is older).
    pub fn observe(&self, symbol: &str, open_time: i64) -> bool {
        let mut map = self.last_seen.write();
        match map.get(symbol) {
            Some(&prev) if open_time <= prev => {
                debug!(symbol, open_time, last_seen = prev, "bar already evaluated");
                false
            }
            _ => {
                map.insert(symbol.to_string(), open_time);
                true
            }
        }
    }

    /// Open time of the last evaluated bar for `symbol`.
    pub fn last_seen(&self, symbol: &str) -> Option<i64> {
        self.last_seen.read().get(symbol).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_bar_is_new() {
        let clock = BarClock::new();
        assert!(clock.observe("EURUSD", 1_000));
        assert_eq!(clock.last_seen("EURUSD"), Some(1_000));
    }

    #[test]
    fn same_bar_twice_is_not_new() {
        let clock = BarClock::new();
        assert!(clock.observe("EURUSD", 1_000));
        assert!(!clock.observe("EURUSD", 1_000));
        assert!(!clock.observe("EURUSD", 500));
        assert!(clock.observe("EURUSD", 2_000));
    }

    #[test]
    fn symbols_are_independent() {
        let clock = BarClock::new();
        assert!(clock.observe("EURUSD", 1_000));
        assert!(clock.observe("USDJPY", 1_000));
        assert_eq!(clock.last_seen("GBPUSD"), None);
    }
}

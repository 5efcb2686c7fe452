// =============================================================================
// Position Sizer: percentage-risk lot sizing
// =============================================================================
//
//   currency_risk = balance * risk_pct
//   pip_risk      = |stop_price - stop_loss| / pip_size
//   pip_value     = currency_risk / pip_risk            (most symbols)
//                 = currency_risk / pip_risk * stop_price (USDJPY, USDCAD)
//   lot           = round(pip_value / 1000, 2), clamped to [1.0, 9.99]
//
// The USDJPY / USDCAD quote-currency multiplier is kept exactly as the
// strategy has always sized those pairs.
// =============================================================================

use tracing::debug;

use crate::error::EngineError;
use crate::signals::round2;

/// Pip size for JPY-quoted pairs.
const JPY_PIP_SIZE: f64 = 0.01;
/// Pip size for every other symbol.
const DEFAULT_PIP_SIZE: f64 = 0.0001;

/// Smallest lot the sizer will emit.
pub const MIN_LOT: f64 = 1.0;
/// Largest lot the sizer will emit.
pub const MAX_LOT: f64 = 9.99;
/// Lots at or above this are capped to `MAX_LOT`.
const LOT_CAP_THRESHOLD: f64 = 10.0;

/// Broker symbol without any suffix (`"USDJPY.a"` -> `"USDJPY"`).
pub fn symbol_prefix(symbol: &str) -> &str {
    symbol.split('.').next().unwrap_or(symbol)
}

/// Pip size for `symbol`.
pub fn pip_size(symbol: &str) -> f64 {
    match symbol_prefix(symbol) {
        "USDJPY" => JPY_PIP_SIZE,
        _ => DEFAULT_PIP_SIZE,
    }
}

/// Convert account risk and stop distance into a clamped lot size.
///
/// # Errors
/// `EngineError::Division` when `stop_price == stop_loss`.
pub fn size_position(
    balance: f64,
    risk_pct: f64,
    stop_loss: f64,
    stop_price: f64,
    symbol: &str,
) -> Result<f64, EngineError> {
    if stop_price == stop_loss {
        return Err(EngineError::Division(format!(
            "zero stop distance for {symbol} (stop_loss == stop_price == {stop_loss})"
        )));
    }

    let currency_risk = balance * risk_pct;
    let prefix = symbol_prefix(symbol);
    let pip_risk = (stop_price - stop_loss).abs() / pip_size(symbol);

    let pip_value = match prefix {
        "USDJPY" | "USDCAD" => currency_risk / pip_risk * stop_price,
        _ => currency_risk / pip_risk,
    };

    let raw_lot = pip_value / 1000.0;
    let rounded = round2(raw_lot);

    let lot_size = if rounded >= LOT_CAP_THRESHOLD {
        MAX_LOT
    } else if rounded < MIN_LOT {
        MIN_LOT
    } else {
        rounded
    };

    debug!(
        symbol,
        currency_risk,
        pip_risk,
        pip_value,
        raw_lot,
        lot_size,
        "position sized"
    );

    Ok(lot_size)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pip_sizes() {
        assert_eq!(pip_size("USDJPY"), 0.01);
        assert_eq!(pip_size("USDJPY.pro"), 0.01);
        assert_eq!(pip_size("USDCAD"), 0.0001);
        assert_eq!(pip_size("EURUSD"), 0.0001);
        assert_eq!(pip_size("GBPJPY"), 0.0001);
    }

    #[test]
    fn symbol_prefix_strips_suffix() {
        assert_eq!(symbol_prefix("EURUSD.a"), "EURUSD");
        assert_eq!(symbol_prefix("EURUSD"), "EURUSD");
        assert_eq!(symbol_prefix(""), "");
    }

    #[test]
    fn small_account_clamps_to_min_lot() {
        // 10 000 * 0.03 = 300 risk, 50 pips => tiny raw lot => 1.0
        let lot = size_position(10_000.0, 0.03, 1.1000, 1.1050, "EURUSD").unwrap();
        assert_eq!(lot, 1.0);
    }

    #[test]
    fn mid_range_lot_passes_through() {
        // 1 000 000 * 0.01 = 10 000 risk over 5 pips => 2000 / 1000 = 2.0
        let lot = size_position(1_000_000.0, 0.01, 1.1000, 1.1005, "EURUSD").unwrap();
        assert_eq!(lot, 2.0);
    }

    #[test]
    fn large_lot_is_capped() {
        let lot = size_position(1_000_000.0, 0.01, 1.1000, 1.1001, "EURUSD").unwrap();
        assert_eq!(lot, MAX_LOT);
    }

    #[test]
    fn usdcad_applies_stop_price_multiplier() {
        let eur = size_position(1_000_000.0, 0.05, 1.249, 1.25, "EURUSD").unwrap();
        let cad = size_position(1_000_000.0, 0.05, 1.249, 1.25, "USDCAD").unwrap();
        assert_eq!(eur, 5.0);
        assert_eq!(cad, 6.25);
    }

    #[test]
    fn usdjpy_uses_jpy_pip_and_multiplier() {
        // 10 000 risk / 50 pips * 150.5 = 30 100 => 30.1 lots => capped
        let lot = size_position(1_000_000.0, 0.01, 150.00, 150.50, "USDJPY").unwrap();
        assert_eq!(lot, MAX_LOT);
    }

    #[test]
    fn direction_of_stop_does_not_matter() {
        let long = size_position(1_000_000.0, 0.01, 1.1000, 1.1005, "EURUSD").unwrap();
        let short = size_position(1_000_000.0, 0.01, 1.1005, 1.1000, "EURUSD").unwrap();
        assert_eq!(long, short);
    }

    #[test]
    fn zero_distance_is_division_error() {
        let err = size_position(10_000.0, 0.01, 1.2, 1.2, "EURUSD").unwrap_err();
        assert!(matches!(err, EngineError::Division(_)));
    }

    #[test]
    fn lot_always_within_bounds() {
        let balances = [1.0, 500.0, 10_000.0, 250_000.0, 5_000_000.0];
        let risks = [0.001, 0.01, 0.03, 0.5];
        let stops = [(1.1, 1.1001), (1.1, 1.2), (150.0, 150.01), (0.5, 3.0)];
        let symbols = ["EURUSD", "USDJPY", "USDCAD", "XAUUSD.m"];

        for &b in &balances {
            for &r in &risks {
                for &(sl, sp) in &stops {
                    for sym in symbols {
                        let lot = size_position(b, r, sl, sp, sym).unwrap();
                        assert!(
                            (MIN_LOT..=MAX_LOT).contains(&lot),
                            "lot {lot} out of range for {b} {r} {sl} {sp} {sym}"
                        );
                    }
                }
            }
        }
    }
}

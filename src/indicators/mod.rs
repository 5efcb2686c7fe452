// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator computations.  Each indicator produces a
// new column aligned with the source series and never mutates its input.

pub mod ema;

pub use ema::{compute_ema, IndicatorColumn};

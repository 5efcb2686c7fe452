pub mod bar_clock;
pub mod series;
pub mod timeframe;

// Re-export for convenient access (e.g. `use crate::market_data::Series`).
pub use bar_clock::BarClock;
pub use series::{Candle, Series};
pub use timeframe::Timeframe;

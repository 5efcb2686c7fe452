// =============================================================================
// Signals Module
// =============================================================================
//
// Crossover detection over two EMA columns and evaluation of the crossover
// bar into a stop / target geometry.

pub mod crossover;
pub mod evaluator;

pub use crossover::detect_crossovers;
pub use evaluator::{evaluate, round2, CrossEvent};

pub mod client;
pub mod gateway;
pub mod rate_limit;

pub use client::{BinanceClient, DEFAULT_BASE_URL, MAX_KLINES};

// =============================================================================
// Shared types used across the EMA-cross engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Whether we are running against a real broker or the in-memory simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountMode {
    Demo,
    Live,
}

impl Default for AccountMode {
    fn default() -> Self {
        Self::Demo
    }
}

impl std::fmt::Display for AccountMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Demo => write!(f, "Demo"),
            Self::Live => write!(f, "Live"),
        }
    }
}

/// Direction of the crossover bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Bullish,
    Bearish,
    /// Doji at the crossover: open == close, nothing to trade.
    None,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "Bullish"),
            Self::Bearish => write!(f, "Bearish"),
            Self::None => write!(f, "None"),
        }
    }
}

/// Pending entry order type sent to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    BuyStop,
    SellStop,
}

impl OrderKind {
    /// A stop price above the stop-loss is a long entry, anything else short.
    pub fn from_levels(stop_price: f64, stop_loss: f64) -> Self {
        if stop_price > stop_loss {
            Self::BuyStop
        } else {
            Self::SellStop
        }
    }

    /// Exchange side string ("BUY" / "SELL").
    pub fn side(&self) -> &'static str {
        match self {
            Self::BuyStop => "BUY",
            Self::SellStop => "SELL",
        }
    }
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BuyStop => write!(f, "BUY_STOP"),
            Self::SellStop => write!(f, "SELL_STOP"),
        }
    }
}

/// Broker-assigned order identifier.
pub type OrderId = u64;

/// A fully sized trade ready for the order lifecycle manager.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeProposal {
    pub symbol: String,
    pub direction: Direction,
    pub lot_size: f64,
    pub stop_loss: f64,
    pub stop_price: f64,
    pub take_profit: f64,
    /// Strategy tag, `"{strategy_name}_{symbol}"`.
    pub comment: String,
}

impl TradeProposal {
    pub fn order_kind(&self) -> OrderKind {
        OrderKind::from_levels(self.stop_price, self.stop_loss)
    }
}

/// Status of an order as reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    PartiallyFilled,
    Other,
}

/// An order currently resting on the broker's book.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub id: OrderId,
    pub symbol: String,
    pub comment: String,
    pub status: OrderStatus,
}

/// Account figures supplied per evaluation cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountState {
    pub balance: f64,
    /// Fraction of balance risked per trade (0.01 = 1 %).
    pub risk_pct: f64,
}

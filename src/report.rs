// =============================================================================
// Cycle Report: auditable record of every per-symbol cycle outcome
// =============================================================================

use serde::Serialize;

use crate::types::{Direction, OrderId};

/// What happened to one symbol in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum SymbolOutcome {
    TradeSubmitted {
        order_id: OrderId,
        direction: Direction,
        lot_size: f64,
    },
    NoSignal {
        reason: String,
    },
    /// Symbol-scoped failure (data or order error); the next cycle retries.
    Skipped {
        reason: String,
    },
}

impl std::fmt::Display for SymbolOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TradeSubmitted { order_id, direction, lot_size } => {
                write!(f, "trade submitted (#{order_id} {direction} {lot_size})")
            }
            Self::NoSignal { reason } => write!(f, "no signal ({reason})"),
            Self::Skipped { reason } => write!(f, "skipped ({reason})"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// Unique identifier for this record (UUID v4).
    pub id: String,
    pub symbol: String,
    pub strategy_name: String,
    pub outcome: SymbolOutcome,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

impl CycleReport {
    pub fn new(
        symbol: impl Into<String>,
        strategy_name: impl Into<String>,
        outcome: SymbolOutcome,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            strategy_name: strategy_name.into(),
            outcome,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_trade(&self) -> bool {
        matches!(self.outcome, SymbolOutcome::TradeSubmitted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialises_with_outcome_tag() {
        let report = CycleReport::new(
            "EURUSD",
            "EMACross",
            SymbolOutcome::TradeSubmitted {
                order_id: 42,
                direction: Direction::Bullish,
                lot_size: 1.5,
            },
        );
        assert!(report.is_trade());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["symbol"], "EURUSD");
        assert_eq!(json["outcome"]["kind"], "TradeSubmitted");
        assert_eq!(json["outcome"]["order_id"], 42);
        assert_eq!(json["outcome"]["direction"], "Bullish");
        assert!(chrono::DateTime::parse_from_rfc3339(json["created_at"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn ids_are_unique() {
        let a = CycleReport::new("EURUSD", "EMACross", SymbolOutcome::NoSignal { reason: "flat".into() });
        let b = CycleReport::new("EURUSD", "EMACross", SymbolOutcome::NoSignal { reason: "flat".into() });
        assert_ne!(a.id, b.id);
        assert!(!a.is_trade());
    }
}

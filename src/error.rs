// =============================================================================
// Error taxonomy: symbol-scoped vs session-scoped failures
// =============================================================================
//
// Symbol-scoped errors (bad data, stale order that would not cancel, rejected
// order) are isolated to the symbol being processed; the cycle moves on to the
// next symbol.  Session-scoped errors (authentication, transport, rate limit)
// abort the whole run.
// =============================================================================

use thiserror::Error;

/// Failures reported by a broker gateway.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BrokerError {
    /// Credentials rejected or session expired.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The broker could not be reached or the connection dropped.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The broker understood the request and refused it.
    #[error("rejected by broker [{code}]: {message}")]
    Rejected { code: i64, message: String },

    /// The broker answered with something we could not interpret.
    #[error("unexpected broker response: {0}")]
    Protocol(String),

    /// Local request-weight ceiling reached.
    #[error("rate limit reached: {0}")]
    RateLimited(String),

    /// Symbol is unknown to the broker or not tradable.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
}

impl BrokerError {
    /// Whether this failure invalidates the whole session rather than a
    /// single request.
    pub fn is_session_scoped(&self) -> bool {
        matches!(
            self,
            Self::Auth(_) | Self::Transport(_) | Self::RateLimited(_)
        )
    }
}

/// Engine-level error taxonomy.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// Invalid strategy parameters. Fatal for the strategy instance.
    #[error("configuration error: {0}")]
    Config(String),

    /// Not enough candles for the requested EMA period.
    #[error("insufficient data: need more than {required} candles, have {available}")]
    InsufficientData { required: usize, available: usize },

    /// Position sizing was asked to divide by a zero stop distance.
    #[error("division error: {0}")]
    Division(String),

    /// A stale order for this symbol/strategy could not be cancelled.
    #[error("order lifecycle error: {0}")]
    OrderLifecycle(String),

    /// Validation or submission of a new order failed.
    #[error("order error: {0}")]
    Order(String),

    /// Session-scoped broker failure.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Could not establish an authenticated session.
    #[error("authentication error: {0}")]
    Auth(String),
}

impl EngineError {
    /// Symbol-scoped errors skip the current symbol; everything else aborts
    /// the run.
    pub fn is_symbol_scoped(&self) -> bool {
        match self {
            Self::InsufficientData { .. }
            | Self::Division(_)
            | Self::OrderLifecycle(_)
            | Self::Order(_) => true,
            Self::Broker(e) => !e.is_session_scoped(),
            Self::Config(_) | Self::Auth(_) => false,
        }
    }
}

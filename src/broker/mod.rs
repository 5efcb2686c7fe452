// =============================================================================
// Broker Gateway: the capability set the engine consumes from a broker
// =============================================================================
//
// Every call after `connect` receives the `Session` explicitly; gateways keep
// no hidden global login state.  Implementations:
//   - `BinanceClient` (live, signed REST)
//   - `PaperBroker`   (in-memory simulation, demo mode and tests)
// =============================================================================

pub mod paper;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::BrokerError;
use crate::market_data::{Series, Timeframe};
use crate::types::{OpenOrder, OrderId, TradeProposal};

pub use paper::PaperBroker;

// ---------------------------------------------------------------------------
// Credentials & session
// ---------------------------------------------------------------------------

/// API credentials.  Never logged.
#[derive(Clone, Default)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Read `BROKER_API_KEY` / `BROKER_API_SECRET`; missing values are empty.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("BROKER_API_KEY").unwrap_or_default(),
            std::env::var("BROKER_API_SECRET").unwrap_or_default(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.api_key.is_empty() || self.api_secret.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// An authenticated broker session.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    /// Broker-side account label, for logs.
    pub account: String,
    pub established_at: DateTime<Utc>,
    credentials: Credentials,
}

impl Session {
    pub fn new(account: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            id: Uuid::new_v4(),
            account: account.into(),
            established_at: Utc::now(),
            credentials,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

// ---------------------------------------------------------------------------
// Gateway trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Authenticate and open a session.
    async fn connect(&self, credentials: &Credentials) -> Result<Session, BrokerError>;

    /// Close the session.
    async fn disconnect(&self, session: &Session) -> Result<(), BrokerError>;

    /// Make `symbol` available for trading. `Ok(false)` if it exists but
    /// cannot be traded.
    async fn initialize_symbol(&self, session: &Session, symbol: &str) -> Result<bool, BrokerError>;

    /// Most recent `count` closed candles, oldest first.
    async fn fetch_candles(
        &self,
        session: &Session,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Series, BrokerError>;

    /// Open orders on `symbol` whose comment equals `comment_filter`.
    async fn list_open_orders(
        &self,
        session: &Session,
        symbol: &str,
        comment_filter: &str,
    ) -> Result<Vec<OpenOrder>, BrokerError>;

    /// Request cancellation. `Ok(false)` when the broker refused.
    async fn cancel_order(&self, session: &Session, order: &OpenOrder) -> Result<bool, BrokerError>;

    /// Broker-side dry run of an order.
    async fn validate_order(&self, session: &Session, proposal: &TradeProposal) -> Result<(), BrokerError>;

    /// Transmit an order.
    async fn submit_order(&self, session: &Session, proposal: &TradeProposal) -> Result<OrderId, BrokerError>;

    /// Free balance of `asset`.
    async fn account_balance(&self, session: &Session, asset: &str) -> Result<f64, BrokerError>;
}

#[async_trait]
impl<G: BrokerGateway + ?Sized> BrokerGateway for Box<G> {
    async fn connect(&self, credentials: &Credentials) -> Result<Session, BrokerError> {
        (**self).connect(credentials).await
    }

    async fn disconnect(&self, session: &Session) -> Result<(), BrokerError> {
        (**self).disconnect(session).await
    }

    async fn initialize_symbol(&self, session: &Session, symbol: &str) -> Result<bool, BrokerError> {
        (**self).initialize_symbol(session, symbol).await
    }

    async fn fetch_candles(
        &self,
        session: &Session,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Series, BrokerError> {
        (**self).fetch_candles(session, symbol, timeframe, count).await
    }

    async fn list_open_orders(
        &self,
        session: &Session,
        symbol: &str,
        comment_filter: &str,
    ) -> Result<Vec<OpenOrder>, BrokerError> {
        (**self).list_open_orders(session, symbol, comment_filter).await
    }

    async fn cancel_order(&self, session: &Session, order: &OpenOrder) -> Result<bool, BrokerError> {
        (**self).cancel_order(session, order).await
    }

    async fn validate_order(&self, session: &Session, proposal: &TradeProposal) -> Result<(), BrokerError> {
        (**self).validate_order(session, proposal).await
    }

    async fn submit_order(&self, session: &Session, proposal: &TradeProposal) -> Result<OrderId, BrokerError> {
        (**self).submit_order(session, proposal).await
    }

    async fn account_balance(&self, session: &Session, asset: &str) -> Result<f64, BrokerError> {
        (**self).account_balance(session, asset).await
    }
}

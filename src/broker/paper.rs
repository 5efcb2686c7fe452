// =============================================================================
// Paper Broker: in-memory simulated broker for demo mode
// =============================================================================
//
// Orders never leave the process: submitted proposals rest on a local book
// until cancelled.  Candles come either from series seeded in memory or, in
// demo mode, from the exchange's public kline endpoint.  Fault switches let
// callers force cancel / validate / submit failures or a dropped session.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::{BrokerGateway, Credentials, Session};
use crate::binance::BinanceClient;
use crate::error::BrokerError;
use crate::market_data::{Candle, Series, Timeframe};
use crate::types::{OpenOrder, OrderId, OrderStatus, TradeProposal};

/// Injected failures.
#[derive(Debug, Default)]
struct Faults {
    cancel: AtomicBool,
    validate: AtomicBool,
    submit: AtomicBool,
    session_lost: AtomicBool,
}

/// Simulated broker.
pub struct PaperBroker {
    candles: RwLock<HashMap<String, Vec<Candle>>>,
    market_feed: Option<BinanceClient>,
    book: RwLock<Vec<(OpenOrder, TradeProposal)>>,
    submitted: RwLock<Vec<TradeProposal>>,
    balances: RwLock<HashMap<String, f64>>,
    next_id: AtomicU64,
    faults: Faults,
}

impl PaperBroker {
    /// Broker backed purely by seeded candles.
    pub fn new() -> Self {
        Self {
            candles: RwLock::new(HashMap::new()),
            market_feed: None,
            book: RwLock::new(Vec::new()),
            submitted: RwLock::new(Vec::new()),
            balances: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            faults: Faults::default(),
        }
    }

    /// Broker that pulls public market data from the exchange while keeping
    /// every order local.
    pub fn with_market_feed(feed: BinanceClient) -> Self {
        Self {
            market_feed: Some(feed),
            ..Self::new()
        }
    }

    pub fn set_balance(&self, asset: &str, free: f64) {
        self.balances.write().insert(asset.to_string(), free);
    }

    /// Put an order on the book directly, as if left over from an earlier run.
    pub fn place_resting_order(&self, proposal: TradeProposal) -> OrderId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let order = OpenOrder {
            id,
            symbol: proposal.symbol.clone(),
            comment: proposal.comment.clone(),
            status: OrderStatus::Pending,
        };
        self.book.write().push((order, proposal));
        id
    }

    fn check_session(&self) -> Result<(), BrokerError> {
        if self.faults.session_lost.load(Ordering::Relaxed) {
            return Err(BrokerError::Transport("paper session lost".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test controls: seeding, inspection and fault injection
// ---------------------------------------------------------------------------

#[cfg(test)]
impl PaperBroker {
    /// Replace the candle history for `symbol`.
    pub fn seed_candles(&self, symbol: &str, candles: Vec<Candle>) {
        self.candles.write().insert(symbol.to_string(), candles);
    }

    /// Snapshot of every resting order.
    pub fn open_orders(&self) -> Vec<OpenOrder> {
        self.book.read().iter().map(|(o, _)| o.clone()).collect()
    }

    /// Every proposal accepted by `submit_order`, in submission order.
    pub fn submitted(&self) -> Vec<TradeProposal> {
        self.submitted.read().clone()
    }

    pub fn fail_cancels(&self, on: bool) {
        self.faults.cancel.store(on, Ordering::Relaxed);
    }

    pub fn fail_validation(&self, on: bool) {
        self.faults.validate.store(on, Ordering::Relaxed);
    }

    pub fn fail_submission(&self, on: bool) {
        self.faults.submit.store(on, Ordering::Relaxed);
    }

    pub fn drop_session(&self, on: bool) {
        self.faults.session_lost.store(on, Ordering::Relaxed);
    }
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerGateway for PaperBroker {
    async fn connect(&self, credentials: &Credentials) -> Result<Session, BrokerError> {
        self.check_session()?;
        let session = Session::new("paper", credentials.clone());
        info!(session_id = %session.id, "paper session opened");
        Ok(session)
    }

    async fn disconnect(&self, session: &Session) -> Result<(), BrokerError> {
        info!(session_id = %session.id, "paper session closed");
        Ok(())
    }

    async fn initialize_symbol(&self, _session: &Session, symbol: &str) -> Result<bool, BrokerError> {
        self.check_session()?;
        if let Some(feed) = &self.market_feed {
            return feed.symbol_is_trading(symbol).await;
        }
        Ok(self.candles.read().contains_key(symbol))
    }

    async fn fetch_candles(
        &self,
        _session: &Session,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Series, BrokerError> {
        self.check_session()?;
        if let Some(feed) = &self.market_feed {
            return feed.fetch_closed_series(symbol, timeframe, count).await;
        }

        let map = self.candles.read();
        let history = map
            .get(symbol)
            .ok_or_else(|| BrokerError::UnknownSymbol(symbol.to_string()))?;
        let start = history.len().saturating_sub(count);
        Ok(Series::new(symbol, timeframe, history[start..].to_vec()))
    }

    async fn list_open_orders(
        &self,
        _session: &Session,
        symbol: &str,
        comment_filter: &str,
    ) -> Result<Vec<OpenOrder>, BrokerError> {
        self.check_session()?;
        let orders: Vec<OpenOrder> = self
            .book
            .read()
            .iter()
            .filter(|(o, _)| o.symbol == symbol && o.comment == comment_filter)
            .map(|(o, _)| o.clone())
            .collect();
        debug!(symbol, comment_filter, count = orders.len(), "paper open orders listed");
        Ok(orders)
    }

    async fn cancel_order(&self, _session: &Session, order: &OpenOrder) -> Result<bool, BrokerError> {
        self.check_session()?;
        if self.faults.cancel.load(Ordering::Relaxed) {
            warn!(order_id = order.id, "paper cancel refused (injected)");
            return Ok(false);
        }
        let mut book = self.book.write();
        let before = book.len();
        book.retain(|(o, _)| o.id != order.id);
        Ok(book.len() < before)
    }

    async fn validate_order(&self, _session: &Session, proposal: &TradeProposal) -> Result<(), BrokerError> {
        self.check_session()?;
        if self.faults.validate.load(Ordering::Relaxed) {
            return Err(BrokerError::Rejected {
                code: 10_016,
                message: "invalid stops (injected)".into(),
            });
        }
        if proposal.lot_size <= 0.0 {
            return Err(BrokerError::Rejected {
                code: 10_014,
                message: format!("invalid volume {}", proposal.lot_size),
            });
        }
        Ok(())
    }

    async fn submit_order(&self, _session: &Session, proposal: &TradeProposal) -> Result<OrderId, BrokerError> {
        self.check_session()?;
        if self.faults.submit.load(Ordering::Relaxed) {
            return Err(BrokerError::Rejected {
                code: 10_006,
                message: "request rejected (injected)".into(),
            });
        }

        let id = self.place_resting_order(proposal.clone());
        self.submitted.write().push(proposal.clone());

        info!(
            order_id = id,
            symbol = %proposal.symbol,
            kind = %proposal.order_kind(),
            lot_size = proposal.lot_size,
            stop_price = proposal.stop_price,
            stop_loss = proposal.stop_loss,
            take_profit = proposal.take_profit,
            "paper order accepted"
        );
        Ok(id)
    }

    async fn account_balance(&self, _session: &Session, asset: &str) -> Result<f64, BrokerError> {
        self.check_session()?;
        Ok(self.balances.read().get(asset).copied().unwrap_or(0.0))
    }
}

impl std::fmt::Debug for PaperBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperBroker")
            .field("symbols", &self.candles.read().len())
            .field("open_orders", &self.book.read().len())
            .field("submitted", &self.submitted.read().len())
            .field("market_feed", &self.market_feed.is_some())
            .finish()
    }
}

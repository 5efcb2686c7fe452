// =============================================================================
// Order Lifecycle Manager: cancel-then-replace, one order per strategy tag
// =============================================================================
//
// Per symbol, per cycle:
//
//   Idle -> Reconciling -> NoSignal
//                       -> Proposing -> Validating -> Submitting -> Filled
//                                                               \-> Rejected
//   any step on failure -> Error
//
// Every matching open order is cancelled before anything new is sent.  If any
// cancel fails the cycle stops for that symbol; a new order is never placed
// over an unresolved old one.  Nothing is retried: the next cycle starts a
// fresh machine.
//
// List -> cancel -> submit runs under a per-symbol async lock so two callers
// for the same symbol can never interleave.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::broker::{BrokerGateway, Session};
use crate::error::{BrokerError, EngineError};
use crate::types::{OrderId, TradeProposal};

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleState {
    Idle,
    Reconciling,
    NoSignal,
    Proposing,
    Validating,
    Submitting,
    /// The broker accepted the order.
    Filled(OrderId),
    /// The broker refused validation or submission.
    Rejected(String),
    Error(String),
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NoSignal | Self::Filled(_) | Self::Rejected(_) | Self::Error(_)
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Reconciling => write!(f, "Reconciling"),
            Self::NoSignal => write!(f, "NoSignal"),
            Self::Proposing => write!(f, "Proposing"),
            Self::Validating => write!(f, "Validating"),
            Self::Submitting => write!(f, "Submitting"),
            Self::Filled(id) => write!(f, "Filled({id})"),
            Self::Rejected(reason) => write!(f, "Rejected({reason})"),
            Self::Error(reason) => write!(f, "Error({reason})"),
        }
    }
}

/// Result of a completed (non-error) lifecycle run.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleOutcome {
    /// Terminal state: `NoSignal` or `Filled`.
    pub state: LifecycleState,
    /// Stale orders cancelled during reconciliation.
    pub cancelled: usize,
}

impl LifecycleOutcome {
    pub fn order_id(&self) -> Option<OrderId> {
        match self.state {
            LifecycleState::Filled(id) => Some(id),
            _ => None,
        }
    }
}

/// One machine instance.
struct Run<'a> {
    symbol: &'a str,
    state: LifecycleState,
}

impl<'a> Run<'a> {
    fn new(symbol: &'a str) -> Self {
        Self {
            symbol,
            state: LifecycleState::Idle,
        }
    }

    fn advance(&mut self, next: LifecycleState) {
        debug!(symbol = self.symbol, from = %self.state, to = %next, "lifecycle transition");
        self.state = next;
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct OrderLifecycleManager {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    last_states: RwLock<HashMap<String, LifecycleState>>,
}

impl OrderLifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Terminal state of the most recent run for `symbol`.
    pub fn last_state(&self, symbol: &str) -> Option<LifecycleState> {
        self.last_states.read().get(symbol).cloned()
    }

    fn symbol_lock(&self, symbol: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(symbol.to_string())
            .or_default()
            .clone()
    }

    /// Cancel every open order tagged `comment` on `symbol`, then submit
    /// `proposal` if there is one.
    ///
    /// # Errors
    /// - `EngineError::OrderLifecycle` if a stale order could not be cancelled.
    /// - `EngineError::Order` if validation or submission was refused.
    /// - `EngineError::Broker` for any other gateway failure; session-scoped
    ///   ones must abort the run.
    pub async fn reconcile_and_submit<G: BrokerGateway + ?Sized>(
        &self,
        gateway: &G,
        session: &Session,
        symbol: &str,
        comment: &str,
        proposal: Option<&TradeProposal>,
    ) -> Result<LifecycleOutcome, EngineError> {
        let lock = self.symbol_lock(symbol);
        let _guard = lock.lock().await;

        let mut run = Run::new(symbol);
        let result = Self::drive(&mut run, gateway, session, comment, proposal).await;

        if let Err(e) = &result {
            if !matches!(run.state, LifecycleState::Rejected(_)) {
                run.advance(LifecycleState::Error(e.to_string()));
            }
        }
        debug_assert!(run.state.is_terminal());
        self.last_states
            .write()
            .insert(symbol.to_string(), run.state.clone());

        result
    }

    async fn drive<G: BrokerGateway + ?Sized>(
        run: &mut Run<'_>,
        gateway: &G,
        session: &Session,
        comment: &str,
        proposal: Option<&TradeProposal>,
    ) -> Result<LifecycleOutcome, EngineError> {
        let symbol = run.symbol;

        // -----------------------------------------------------------------
        // Reconcile
        // -----------------------------------------------------------------
        run.advance(LifecycleState::Reconciling);
        let stale = gateway.list_open_orders(session, symbol, comment).await?;

        let mut cancelled = 0;
        let mut failures = Vec::new();
        for order in &stale {
            match gateway.cancel_order(session, order).await {
                Ok(true) => {
                    cancelled += 1;
                    info!(symbol, order_id = order.id, "stale order cancelled");
                }
                Ok(false) => failures.push(format!("order {} refused", order.id)),
                Err(e) if e.is_session_scoped() => return Err(e.into()),
                Err(e) => failures.push(format!("order {}: {e}", order.id)),
            }
        }

        if !failures.is_empty() {
            warn!(symbol, failed = failures.len(), "stale orders left open, skipping submission");
            return Err(EngineError::OrderLifecycle(format!(
                "{symbol}: could not cancel {}",
                failures.join(", ")
            )));
        }

        let Some(proposal) = proposal else {
            run.advance(LifecycleState::NoSignal);
            return Ok(LifecycleOutcome {
                state: LifecycleState::NoSignal,
                cancelled,
            });
        };

        // -----------------------------------------------------------------
        // Validate, then submit
        // -----------------------------------------------------------------
        run.advance(LifecycleState::Proposing);
        debug!(
            symbol,
            kind = %proposal.order_kind(),
            lot_size = proposal.lot_size,
            stop_price = proposal.stop_price,
            "trade proposed"
        );

        run.advance(LifecycleState::Validating);
        if let Err(e) = gateway.validate_order(session, proposal).await {
            return Err(Self::order_failure(run, "validation", e));
        }

        run.advance(LifecycleState::Submitting);
        let order_id = match gateway.submit_order(session, proposal).await {
            Ok(id) => id,
            Err(e) => return Err(Self::order_failure(run, "submission", e)),
        };

        run.advance(LifecycleState::Filled(order_id));
        info!(
            symbol,
            order_id,
            kind = %proposal.order_kind(),
            lot_size = proposal.lot_size,
            "order submitted"
        );

        Ok(LifecycleOutcome {
            state: LifecycleState::Filled(order_id),
            cancelled,
        })
    }

    /// Session-scoped failures pass through untouched; anything else is a
    /// symbol-scoped `Order` error and moves the machine to `Rejected`.
    fn order_failure(run: &mut Run<'_>, step: &str, err: BrokerError) -> EngineError {
        if err.is_session_scoped() {
            return err.into();
        }
        warn!(symbol = run.symbol, step, error = %err, "order refused");
        run.advance(LifecycleState::Rejected(err.to_string()));
        EngineError::Order(format!("{} {step} failed: {err}", run.symbol))
    }
}

impl std::fmt::Debug for OrderLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderLifecycleManager")
            .field("symbols", &self.last_states.read().len())
            .finish()
    }
}

// =============================================================================
// BrokerGateway over the Binance spot REST API
// =============================================================================

use async_trait::async_trait;
use tracing::{info, warn};

use super::client::{parse_open_orders, BinanceClient};
use crate::broker::{BrokerGateway, Credentials, Session};
use crate::error::BrokerError;
use crate::market_data::{Series, Timeframe};
use crate::types::{OpenOrder, OrderId, TradeProposal};

#[async_trait]
impl BrokerGateway for BinanceClient {
    async fn connect(&self, credentials: &Credentials) -> Result<Session, BrokerError> {
        if credentials.is_empty() {
            return Err(BrokerError::Auth(
                "BROKER_API_KEY / BROKER_API_SECRET not set".into(),
            ));
        }

        let account = self.get_account(credentials).await?;
        if account["canTrade"].as_bool() == Some(false) {
            return Err(BrokerError::Auth("account is not permitted to trade".into()));
        }

        let label = account["accountType"].as_str().unwrap_or("SPOT");
        let session = Session::new(label, credentials.clone());
        info!(session_id = %session.id, account = label, "exchange session established");
        Ok(session)
    }

    async fn disconnect(&self, session: &Session) -> Result<(), BrokerError> {
        // REST is stateless; nothing to tear down server-side.
        info!(session_id = %session.id, "exchange session closed");
        Ok(())
    }

    async fn initialize_symbol(&self, _session: &Session, symbol: &str) -> Result<bool, BrokerError> {
        self.symbol_is_trading(symbol).await
    }

    async fn fetch_candles(
        &self,
        _session: &Session,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Series, BrokerError> {
        self.fetch_closed_series(symbol, timeframe, count).await
    }

    async fn list_open_orders(
        &self,
        session: &Session,
        symbol: &str,
        comment_filter: &str,
    ) -> Result<Vec<OpenOrder>, BrokerError> {
        let body = self.get_open_orders(session.credentials(), symbol).await?;
        parse_open_orders(&body, comment_filter)
    }

    async fn cancel_order(&self, session: &Session, order: &OpenOrder) -> Result<bool, BrokerError> {
        match BinanceClient::cancel_order(self, session.credentials(), &order.symbol, order.id).await {
            Ok(_) => Ok(true),
            Err(BrokerError::Rejected { code, message }) => {
                warn!(order_id = order.id, code, message = %message, "cancel refused");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn validate_order(&self, session: &Session, proposal: &TradeProposal) -> Result<(), BrokerError> {
        self.place_order(session.credentials(), proposal, true).await?;
        Ok(())
    }

    async fn submit_order(&self, session: &Session, proposal: &TradeProposal) -> Result<OrderId, BrokerError> {
        let body = self.place_order(session.credentials(), proposal, false).await?;
        let order_id = body["orderId"]
            .as_u64()
            .ok_or_else(|| BrokerError::Protocol("order response missing 'orderId'".into()))?;

        // Spot stop entries carry no attached exit legs; the levels are
        // recorded here so the operator can see them.
        info!(
            order_id,
            symbol = %proposal.symbol,
            kind = %proposal.order_kind(),
            stop_loss = proposal.stop_loss,
            take_profit = proposal.take_profit,
            "entry order placed"
        );
        Ok(order_id)
    }

    async fn account_balance(&self, session: &Session, asset: &str) -> Result<f64, BrokerError> {
        self.get_balance(session.credentials(), asset).await
    }
}

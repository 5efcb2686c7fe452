// =============================================================================
// Binance REST API Client: HMAC-SHA256 signed requests
// =============================================================================
//
// SECURITY: The secret key is never logged or serialized. Credentials are not
// stored on the client; every signed call takes them from the caller's
// session.  All signed requests include X-MBX-APIKEY as a header and a
// recvWindow of 5 000 ms to tolerate minor clock drift.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use sha2::Sha256;
use tracing::{debug, instrument, warn};

use super::rate_limit::RateLimitTracker;
use crate::broker::Credentials;
use crate::error::BrokerError;
use crate::market_data::{Candle, Series, Timeframe};
use crate::types::{OpenOrder, OrderStatus, TradeProposal};

type HmacSha256 = Hmac<Sha256>;

/// Default recv-window sent with every signed request (milliseconds).
const RECV_WINDOW: u64 = 5000;

/// Production REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Largest kline page the exchange serves.
pub const MAX_KLINES: usize = 1000;

/// Binance REST API client with HMAC-SHA256 request signing.
#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    client: reqwest::Client,
    rate_limit: Arc<RateLimitTracker>,
}

impl BinanceClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    pub fn new(base_url: impl Into<String>) -> Result<Self, BrokerError> {
        let base_url = base_url.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BrokerError::Transport(format!("failed to build HTTP client: {e}")))?;

        debug!(base_url = %base_url, "BinanceClient initialised");

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            rate_limit: Arc::new(RateLimitTracker::new()),
        })
    }

    // -------------------------------------------------------------------------
    // Signing helpers
    // -------------------------------------------------------------------------

    /// Produce an HMAC-SHA256 hex signature of `query`.
    pub fn sign(secret: &str, query: &str) -> Result<String, BrokerError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| BrokerError::Auth(format!("unusable API secret: {e}")))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Full query string for a signed request (appends timestamp, recvWindow
    /// and signature).
    fn signed_query(creds: &Credentials, params: &str) -> Result<String, BrokerError> {
        let ts = Utc::now().timestamp_millis();
        let base = if params.is_empty() {
            format!("timestamp={ts}&recvWindow={RECV_WINDOW}")
        } else {
            format!("{params}&timestamp={ts}&recvWindow={RECV_WINDOW}")
        };
        let sig = Self::sign(&creds.api_secret, &base)?;
        Ok(format!("{base}&signature={sig}"))
    }

    /// Send `request`, track rate-limit headers and map failures.
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        weight: u32,
        what: &str,
    ) -> Result<serde_json::Value, BrokerError> {
        if !self.rate_limit.can_send_request(weight) {
            return Err(BrokerError::RateLimited(format!(
                "{what} needs weight {weight}, used {}",
                self.rate_limit.used_weight()
            )));
        }

        let resp = request
            .send()
            .await
            .map_err(|e| BrokerError::Transport(format!("{what} request failed: {e}")))?;

        self.rate_limit.update_from_headers(resp.headers());
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BrokerError::Transport(format!("{what} response body unreadable: {e}")))?;

        decode_response(status, &text, what)
    }

    // -------------------------------------------------------------------------
    // Account / balance
    // -------------------------------------------------------------------------

    /// GET /api/v3/account (signed).
    #[instrument(skip(self, creds), name = "binance::get_account")]
    pub async fn get_account(&self, creds: &Credentials) -> Result<serde_json::Value, BrokerError> {
        let qs = Self::signed_query(creds, "")?;
        let url = format!("{}/api/v3/account?{}", self.base_url, qs);
        let req = self.client.get(&url).header("X-MBX-APIKEY", &creds.api_key);
        let body = self.execute(req, 20, "GET /api/v3/account").await?;
        debug!("account info retrieved successfully");
        Ok(body)
    }

    /// Free balance for a single `asset`.
    #[instrument(skip(self, creds), name = "binance::get_balance")]
    pub async fn get_balance(&self, creds: &Credentials, asset: &str) -> Result<f64, BrokerError> {
        let account = self.get_account(creds).await?;

        let balances = account["balances"]
            .as_array()
            .ok_or_else(|| BrokerError::Protocol("account response missing 'balances' array".into()))?;

        for b in balances {
            if b["asset"].as_str() == Some(asset) {
                let free = parse_str_f64(&b["free"])?;
                debug!(asset, free, "balance retrieved");
                return Ok(free);
            }
        }

        warn!(asset, "asset not found in balances, returning 0.0");
        Ok(0.0)
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    /// POST /api/v3/order (signed), or POST /api/v3/order/test when
    /// `dry_run` is set.  Returns the exchange response body.
    #[instrument(skip(self, creds, proposal), fields(symbol = %proposal.symbol), name = "binance::place_order")]
    pub async fn place_order(
        &self,
        creds: &Credentials,
        proposal: &TradeProposal,
        dry_run: bool,
    ) -> Result<serde_json::Value, BrokerError> {
        if !dry_run && !self.rate_limit.can_place_order() {
            return Err(BrokerError::RateLimited("order rate window exhausted".into()));
        }

        let params = order_params(proposal);
        let qs = Self::signed_query(creds, &params)?;
        let path = if dry_run { "/api/v3/order/test" } else { "/api/v3/order" };
        let url = format!("{}{}?{}", self.base_url, path, qs);

        debug!(dry_run, params = %params, "placing order");

        let req = self.client.post(&url).header("X-MBX-APIKEY", &creds.api_key);
        let body = self.execute(req, 1, path).await?;

        if !dry_run {
            self.rate_limit.record_order_sent();
        }
        Ok(body)
    }

    /// DELETE /api/v3/order (signed): cancel an existing order.
    #[instrument(skip(self, creds), name = "binance::cancel_order")]
    pub async fn cancel_order(
        &self,
        creds: &Credentials,
        symbol: &str,
        order_id: u64,
    ) -> Result<serde_json::Value, BrokerError> {
        let params = format!("symbol={symbol}&orderId={order_id}");
        let qs = Self::signed_query(creds, &params)?;
        let url = format!("{}/api/v3/order?{}", self.base_url, qs);

        debug!(symbol, order_id, "cancelling order");

        let req = self.client.delete(&url).header("X-MBX-APIKEY", &creds.api_key);
        let body = self.execute(req, 1, "DELETE /api/v3/order").await?;

        debug!(symbol, order_id, "order cancelled");
        Ok(body)
    }

    /// GET /api/v3/openOrders (signed) for one symbol.
    #[instrument(skip(self, creds), name = "binance::get_open_orders")]
    pub async fn get_open_orders(
        &self,
        creds: &Credentials,
        symbol: &str,
    ) -> Result<serde_json::Value, BrokerError> {
        let params = format!("symbol={symbol}");
        let qs = Self::signed_query(creds, &params)?;
        let url = format!("{}/api/v3/openOrders?{}", self.base_url, qs);

        let req = self.client.get(&url).header("X-MBX-APIKEY", &creds.api_key);
        self.execute(req, 6, "GET /api/v3/openOrders").await
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// GET /api/v3/klines (public: no signature required).
    ///
    /// The still-forming last kline is dropped; only closed bars are
    /// returned.
    #[instrument(skip(self), name = "binance::get_klines")]
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, BrokerError> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );

        let body = self
            .execute(self.client.get(&url), 2, "GET /api/v3/klines")
            .await?;
        let candles = parse_klines(&body, Utc::now().timestamp_millis())?;

        debug!(symbol, interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }

    /// Closed-bar `Series` of at most `count` candles.
    pub async fn fetch_closed_series(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Series, BrokerError> {
        // One extra to make up for the forming bar that gets dropped.
        let limit = (count + 1).min(MAX_KLINES);
        let mut candles = self.get_klines(symbol, timeframe.label(), limit).await?;
        if candles.len() > count {
            candles.drain(..candles.len() - count);
        }
        Ok(Series::new(symbol, timeframe, candles))
    }

    /// GET /api/v3/exchangeInfo: whether `symbol` is listed and `TRADING`.
    #[instrument(skip(self), name = "binance::symbol_is_trading")]
    pub async fn symbol_is_trading(&self, symbol: &str) -> Result<bool, BrokerError> {
        let url = format!("{}/api/v3/exchangeInfo?symbol={}", self.base_url, symbol);

        let body = match self
            .execute(self.client.get(&url), 20, "GET /api/v3/exchangeInfo")
            .await
        {
            Ok(body) => body,
            Err(BrokerError::UnknownSymbol(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        let status = body["symbols"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|info| info["status"].as_str())
            .unwrap_or("");

        debug!(symbol, status, "symbol info retrieved");
        Ok(status == "TRADING")
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Response / request helpers
// ---------------------------------------------------------------------------

/// Map an unsuccessful response to a `BrokerError`.
pub(crate) fn classify_failure(status: StatusCode, body: &serde_json::Value) -> BrokerError {
    let code = body["code"].as_i64().unwrap_or(i64::from(status.as_u16()));
    let message = body["msg"].as_str().unwrap_or("").to_string();

    match (status.as_u16(), code) {
        (401, _) | (_, -2014) | (_, -2015) | (_, -1022) => BrokerError::Auth(message),
        (418, _) | (429, _) => BrokerError::RateLimited(message),
        (s, _) if s >= 500 => BrokerError::Transport(format!("{status}: {message}")),
        (_, -1121) => BrokerError::UnknownSymbol(message),
        _ => BrokerError::Rejected { code, message },
    }
}

/// Turn a status and raw body into the JSON payload or a `BrokerError`.
///
/// Failure statuses are classified even when the body is not JSON (gateway
/// error pages, empty bodies), so an outage is never mistaken for a bad
/// payload.
pub(crate) fn decode_response(
    status: StatusCode,
    text: &str,
    what: &str,
) -> Result<serde_json::Value, BrokerError> {
    let parsed = serde_json::from_str::<serde_json::Value>(text);

    if !status.is_success() {
        let body = parsed.unwrap_or(serde_json::Value::Null);
        let err = classify_failure(status, &body);
        warn!(what, %status, error = %err, "exchange returned an error");
        return Err(err);
    }

    parsed.map_err(|e| BrokerError::Protocol(format!("failed to parse {what} response: {e}")))
}

/// Parse a JSON value that may be either a string or a number into `f64`.
fn parse_str_f64(val: &serde_json::Value) -> Result<f64, BrokerError> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .map_err(|_| BrokerError::Protocol(format!("failed to parse '{s}' as f64")))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        Err(BrokerError::Protocol(format!("expected string or number, got: {val}")))
    }
}

/// Parse the array-of-arrays kline payload, keeping only bars whose close
/// time is before `now_ms`.
///
/// Array indices:
///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
///   [6] closeTime
pub(crate) fn parse_klines(body: &serde_json::Value, now_ms: i64) -> Result<Vec<Candle>, BrokerError> {
    let raw = body
        .as_array()
        .ok_or_else(|| BrokerError::Protocol("klines response is not an array".into()))?;

    let mut candles = Vec::with_capacity(raw.len());
    for entry in raw {
        let arr = entry
            .as_array()
            .ok_or_else(|| BrokerError::Protocol("kline entry is not an array".into()))?;

        if arr.len() < 7 {
            warn!("skipping malformed kline entry with {} elements", arr.len());
            continue;
        }

        let close_time = arr[6].as_i64().unwrap_or(i64::MAX);
        if close_time >= now_ms {
            continue;
        }

        let open_time = arr[0]
            .as_i64()
            .ok_or_else(|| BrokerError::Protocol(format!("kline open time is not an integer: {}", arr[0])))?;

        candles.push(Candle::new(
            open_time,
            parse_str_f64(&arr[1])?,
            parse_str_f64(&arr[2])?,
            parse_str_f64(&arr[3])?,
            parse_str_f64(&arr[4])?,
            parse_str_f64(&arr[5])?,
        ));
    }
    Ok(candles)
}

/// Open orders whose `clientOrderId` equals `comment_filter`.
///
/// A payload that cannot be read in full is an error: silently dropping an
/// order would let a replacement stack on top of it.
pub(crate) fn parse_open_orders(
    body: &serde_json::Value,
    comment_filter: &str,
) -> Result<Vec<OpenOrder>, BrokerError> {
    let orders = body
        .as_array()
        .ok_or_else(|| BrokerError::Protocol("openOrders response is not an array".into()))?;

    let mut matching = Vec::new();
    for o in orders {
        if o["clientOrderId"].as_str() != Some(comment_filter) {
            continue;
        }
        let id = o["orderId"]
            .as_u64()
            .ok_or_else(|| BrokerError::Protocol(format!("open order without orderId: {o}")))?;
        let symbol = o["symbol"]
            .as_str()
            .ok_or_else(|| BrokerError::Protocol(format!("open order {id} without symbol")))?;

        matching.push(OpenOrder {
            id,
            symbol: symbol.to_string(),
            comment: comment_filter.to_string(),
            status: match o["status"].as_str() {
                Some("NEW") => OrderStatus::Pending,
                Some("PARTIALLY_FILLED") => OrderStatus::PartiallyFilled,
                _ => OrderStatus::Other,
            },
        });
    }
    Ok(matching)
}

/// Query parameters for a stop-entry order.
///
/// The entry rests as a `STOP_LOSS_LIMIT` that triggers and fills at the
/// stop price.  The strategy tag travels as the client order id so that the
/// order can be found again by comment.
pub(crate) fn order_params(proposal: &TradeProposal) -> String {
    format!(
        "symbol={}&side={}&type=STOP_LOSS_LIMIT&timeInForce=GTC&quantity={}&price={:.2}&stopPrice={:.2}&newClientOrderId={}",
        proposal.symbol,
        proposal.order_kind().side(),
        proposal.lot_size,
        proposal.stop_price,
        proposal.stop_price,
        proposal.comment,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use serde_json::json;

    #[test]
    fn signature_is_stable_hex() {
        // Reference vector from the exchange API documentation.
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        let sig = BinanceClient::sign(secret, query).unwrap();
        assert_eq!(
            sig,
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn classify_auth_and_limits() {
        let body = json!({"code": -2015, "msg": "Invalid API-key"});
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, &body),
            BrokerError::Auth(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, &body),
            BrokerError::Auth(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::TOO_MANY_REQUESTS, &json!({})),
            BrokerError::RateLimited(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, &json!({})),
            BrokerError::Transport(_)
        ));
    }

    #[test]
    fn classify_order_rejection() {
        let body = json!({"code": -2010, "msg": "Account has insufficient balance"});
        assert_eq!(
            classify_failure(StatusCode::BAD_REQUEST, &body),
            BrokerError::Rejected {
                code: -2010,
                message: "Account has insufficient balance".into()
            }
        );
        let body = json!({"code": -1121, "msg": "Invalid symbol."});
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, &body),
            BrokerError::UnknownSymbol(_)
        ));
    }

    #[test]
    fn klines_drop_forming_bar() {
        let body = json!([
            [1000, "1.10", "1.20", "1.00", "1.15", "10.5", 1999, "0", 1, "0", "0", "0"],
            [2000, "1.15", "1.25", "1.05", "1.20", "11.0", 2999, "0", 1, "0", "0", "0"],
            [3000, "1.20", "1.30", "1.10", "1.25", "3.0", 3999, "0", 1, "0", "0", "0"]
        ]);
        let candles = parse_klines(&body, 3500).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].open_time, 2000);
        assert!((candles[1].close - 1.20).abs() < f64::EPSILON);
    }

    #[test]
    fn klines_reject_non_array() {
        assert!(matches!(
            parse_klines(&json!({"code": -1}), 0),
            Err(BrokerError::Protocol(_))
        ));
    }

    #[test]
    fn open_orders_filtered_by_client_id() {
        let body = json!([
            {"symbol": "BTCUSDT", "orderId": 11, "clientOrderId": "EMACross_BTCUSDT", "status": "NEW"},
            {"symbol": "BTCUSDT", "orderId": 12, "clientOrderId": "manual", "status": "NEW"},
            {"symbol": "BTCUSDT", "orderId": 13, "clientOrderId": "EMACross_BTCUSDT", "status": "PARTIALLY_FILLED"}
        ]);
        let orders = parse_open_orders(&body, "EMACross_BTCUSDT").unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id, 11);
        assert_eq!(orders[0].status, OrderStatus::Pending);
        assert_eq!(orders[1].status, OrderStatus::PartiallyFilled);
    }

    #[test]
    fn order_params_for_sell_stop() {
        let p = TradeProposal {
            symbol: "BTCUSDT".into(),
            direction: Direction::Bearish,
            lot_size: 1.5,
            stop_loss: 101.0,
            stop_price: 99.5,
            take_profit: 98.0,
            comment: "EMACross_BTCUSDT".into(),
        };
        let qs = order_params(&p);
        assert!(qs.contains("side=SELL"));
        assert!(qs.contains("type=STOP_LOSS_LIMIT"));
        assert!(qs.contains("quantity=1.5"));
        assert!(qs.contains("stopPrice=99.50"));
        assert!(qs.contains("newClientOrderId=EMACross_BTCUSDT"));
    }

    #[test]
    fn open_orders_reject_unreadable_payloads() {
        assert!(matches!(
            parse_open_orders(&json!({"code": -1}), "EMACross_BTCUSDT"),
            Err(BrokerError::Protocol(_))
        ));

        let body = json!([
            {"symbol": "BTCUSDT", "clientOrderId": "EMACross_BTCUSDT", "status": "NEW"}
        ]);
        assert!(matches!(
            parse_open_orders(&body, "EMACross_BTCUSDT"),
            Err(BrokerError::Protocol(_))
        ));

        // Orders under another tag are never inspected.
        let body = json!([{"clientOrderId": "manual"}]);
        assert!(parse_open_orders(&body, "EMACross_BTCUSDT").unwrap().is_empty());
    }

    #[test]
    fn klines_reject_missing_open_time() {
        let body = json!([
            [null, "1.10", "1.20", "1.00", "1.15", "10.5", 1999, "0", 1, "0", "0", "0"]
        ]);
        assert!(matches!(parse_klines(&body, 3500), Err(BrokerError::Protocol(_))));
    }

    #[test]
    fn failure_status_with_html_body_is_classified_by_status() {
        let html = "<html><body>503 Service Unavailable</body></html>";
        let err = decode_response(StatusCode::SERVICE_UNAVAILABLE, html, "GET /api/v3/klines").unwrap_err();
        assert!(matches!(err, BrokerError::Transport(_)));
        assert!(err.is_session_scoped());

        let err = decode_response(StatusCode::TOO_MANY_REQUESTS, "", "GET /api/v3/klines").unwrap_err();
        assert!(matches!(err, BrokerError::RateLimited(_)));
    }

    #[test]
    fn success_status_with_bad_body_is_protocol() {
        let err = decode_response(StatusCode::OK, "<html>", "GET /api/v3/klines").unwrap_err();
        assert!(matches!(err, BrokerError::Protocol(_)));
    }

    /// Serve one canned HTTP response on a local port.
    async fn serve_once(response: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn gateway_outage_page_aborts_as_transport() {
        let base = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Type: text/html\r\nContent-Length: 40\r\nConnection: close\r\n\r\n<html><body>upstream down</body></html>\n",
        )
        .await;
        let client = BinanceClient::new(base).unwrap();

        let err = client.get_klines("BTCUSDT", "1h", 10).await.unwrap_err();
        assert!(matches!(err, BrokerError::Transport(_)), "{err:?}");
        assert!(err.is_session_scoped());
    }
}

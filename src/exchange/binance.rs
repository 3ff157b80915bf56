//! Binance spot REST integration.
//!
//! Public endpoints (ticker, exchange info, klines) need no auth.
//! Order placement is a signed request: HMAC-SHA256 of the query string
//! keyed by the API secret, with the API key in `X-MBX-APIKEY`.
//!
//! API docs: https://developers.binance.com/docs/binance-spot-api-docs/rest-api
//! Base URL: https://api.binance.com

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::{Exchange, ExchangeError};
use crate::types::{Candle, LotConstraint, OrderConfirmation};

type HmacSha256 = Hmac<Sha256>;

const EXCHANGE_NAME: &str = "binance";

/// Binance caps `limit` on /klines at 1000.
const MAX_KLINES: u32 = 1000;

// ---------------------------------------------------------------------------
// API response types (Binance JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
    #[serde(default)]
    executed_qty: Option<String>,
    #[serde(default)]
    cummulative_quote_qty: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Error body Binance returns alongside 4xx statuses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// API key pair for signed endpoints.
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: SecretString,
}

/// Binance spot client.
///
/// Without credentials only the public market-data endpoints work;
/// `market_buy` fails with `MissingCredentials`.
pub struct BinanceClient {
    http: Client,
    base_url: String,
    credentials: Option<ApiCredentials>,
    recv_window_ms: u64,
}

impl BinanceClient {
    pub fn new(
        base_url: &str,
        credentials: Option<ApiCredentials>,
        recv_window_ms: u64,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("DIPBUYER/0.1.0")
            .build()
            .context("Failed to build HTTP client for Binance")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            recv_window_ms,
        })
    }

    // -- Internal helpers ------------------------------------------------

    async fn get_public(&self, path: &str, query: &str) -> Result<Response, ExchangeError> {
        let url = format!("{}{path}?{query}", self.base_url);
        debug!(url = %url, "Binance GET");
        let resp = self.http.get(&url).send().await?;
        check_status(resp).await
    }

    fn credentials(&self) -> Result<&ApiCredentials, ExchangeError> {
        self.credentials
            .as_ref()
            .ok_or(ExchangeError::MissingCredentials)
    }

    /// Append timestamp, recvWindow and signature to `params`.
    fn signed_query(&self, params: &str) -> Result<String, ExchangeError> {
        let query = format!(
            "{params}&recvWindow={}&timestamp={}",
            self.recv_window_ms,
            Utc::now().timestamp_millis()
        );
        let signature = sign(self.credentials()?.api_secret.expose_secret(), &query)?;
        Ok(format!("{query}&signature={signature}"))
    }
}

/// Hex-encoded HMAC-SHA256 of `payload`.
pub(crate) fn sign(secret: &str, payload: &str) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Unknown(format!("invalid API secret: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Map non-2xx responses to a typed error.
async fn check_status(resp: Response) -> Result<Response, ExchangeError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();

    // 429/418 are rate-limit bans: retrying next cycle is the right answer.
    if status.as_u16() == 429 || status.as_u16() == 418 {
        return Err(ExchangeError::Transport(format!("rate limited ({status}): {body}")));
    }
    if status.is_client_error() {
        if let Ok(api) = serde_json::from_str::<ApiErrorBody>(&body) {
            return Err(ExchangeError::Rejected {
                code: api.code,
                message: api.msg,
            });
        }
        return Err(ExchangeError::Rejected {
            code: i64::from(status.as_u16()),
            message: body,
        });
    }
    // 5xx: Binance does not guarantee whether the request was executed.
    Err(ExchangeError::Unknown(format!("HTTP {status}: {body}")))
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, ExchangeError> {
    Decimal::from_str(raw).map_err(|e| ExchangeError::Decode(format!("{field}={raw:?}: {e}")))
}

/// Extract the LOT_SIZE filter for `pair` from an exchangeInfo payload.
fn lot_size_filter(info: &ExchangeInfo, pair: &str) -> Result<LotConstraint, ExchangeError> {
    let symbol = info
        .symbols
        .iter()
        .find(|s| s.symbol.eq_ignore_ascii_case(pair))
        .ok_or_else(|| ExchangeError::Decode(format!("symbol {pair} not in exchangeInfo")))?;

    let filter = symbol
        .filters
        .iter()
        .find(|f| f.get("filterType").and_then(|t| t.as_str()) == Some("LOT_SIZE"))
        .ok_or_else(|| ExchangeError::Decode(format!("no LOT_SIZE filter for {pair}")))?;

    let field = |name: &str| -> Result<Decimal, ExchangeError> {
        let raw = filter
            .get(name)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ExchangeError::Decode(format!("LOT_SIZE missing {name}")))?;
        parse_decimal(name, raw)
    };

    let constraint = LotConstraint::new(field("minQty")?, field("stepSize")?);
    if constraint.step_size <= Decimal::ZERO {
        return Err(ExchangeError::Decode(format!(
            "non-positive stepSize for {pair}: {}",
            constraint.step_size
        )));
    }
    Ok(constraint)
}

/// Parse kline rows: `[openTime, open, high, low, close, volume, ...]`.
fn parse_klines(rows: &[Vec<serde_json::Value>]) -> Result<Vec<Candle>, ExchangeError> {
    rows.iter()
        .map(|row| {
            let text = |idx: usize, name: &str| -> Result<Decimal, ExchangeError> {
                let raw = row
                    .get(idx)
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ExchangeError::Decode(format!("kline missing {name}")))?;
                parse_decimal(name, raw)
            };
            let open_time = row
                .first()
                .and_then(|v| v.as_i64())
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
            Ok(Candle {
                open_time,
                high: text(2, "high")?,
                low: text(3, "low")?,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Exchange trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl Exchange for BinanceClient {
    async fn spot_price(&self, pair: &str) -> Result<Decimal, ExchangeError> {
        let query = format!("symbol={}", urlencoding::encode(pair));
        let ticker: TickerPrice = self
            .get_public("/api/v3/ticker/price", &query)
            .await?
            .json()
            .await?;
        parse_decimal("price", &ticker.price)
    }

    async fn lot_constraint(&self, pair: &str) -> Result<LotConstraint, ExchangeError> {
        let query = format!("symbol={}", urlencoding::encode(pair));
        let info: ExchangeInfo = self
            .get_public("/api/v3/exchangeInfo", &query)
            .await?
            .json()
            .await?;
        lot_size_filter(&info, pair)
    }

    async fn candles(
        &self,
        pair: &str,
        interval: &str,
        count: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let limit = count.min(MAX_KLINES);
        if limit < count {
            warn!(requested = count, limit, "Kline count capped by exchange limit");
        }
        let query = format!(
            "symbol={}&interval={}&limit={limit}",
            urlencoding::encode(pair),
            urlencoding::encode(interval),
        );
        let rows: Vec<Vec<serde_json::Value>> = self
            .get_public("/api/v3/klines", &query)
            .await?
            .json()
            .await?;
        parse_klines(&rows)
    }

    async fn market_buy(
        &self,
        pair: &str,
        quantity: Decimal,
    ) -> Result<OrderConfirmation, ExchangeError> {
        let params = format!(
            "symbol={}&side=BUY&type=MARKET&quantity={}&newOrderRespType=RESULT",
            urlencoding::encode(pair),
            quantity.normalize(),
        );
        let query = self.signed_query(&params)?;
        let url = format!("{}/api/v3/order?{query}", self.base_url);

        info!(pair, quantity = %quantity.normalize(), "Submitting market buy");

        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.credentials()?.api_key)
            .send()
            .await?;
        let order: OrderResponse = check_status(resp).await?.json().await?;

        debug!(order_id = order.order_id, status = ?order.status, "Order acknowledged");

        let executed_quantity = match order.executed_qty.as_deref() {
            Some(raw) => parse_decimal("executedQty", raw)?,
            None => quantity,
        };
        let quote_spent = order
            .cummulative_quote_qty
            .as_deref()
            .map(|raw| parse_decimal("cummulativeQuoteQty", raw))
            .transpose()?;

        Ok(OrderConfirmation {
            order_id: order.order_id.to_string(),
            executed_quantity,
            quote_spent,
        })
    }

    fn name(&self) -> &'static str {
        EXCHANGE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

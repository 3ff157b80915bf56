//! Exchange integration.
//!
//! Defines the `Exchange` trait consumed by the oracle and executor, the
//! typed `ExchangeError` every call returns on failure, and the Binance
//! spot implementation.

pub mod binance;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::{Candle, LotConstraint, OrderConfirmation};

/// Failure of a single exchange call.
///
/// Callers inspect the variant instead of unwinding: every fault is
/// confined to the cycle that produced it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExchangeError {
    /// The exchange understood the request and refused it (filter
    /// violation, insufficient balance, bad symbol...).
    #[error("exchange rejected request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    /// The request never produced a usable HTTP response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response arrived but could not be interpreted.
    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("unknown exchange error: {0}")]
    Unknown(String),

    /// A signed endpoint was called on a client built without API keys.
    #[error("no API credentials configured")]
    MissingCredentials,
}

impl ExchangeError {
    /// Short category label for logs and notifications.
    pub fn category(&self) -> &'static str {
        match self {
            ExchangeError::Rejected { .. } => "exchange-rejected",
            ExchangeError::Transport(_) => "transport-error",
            ExchangeError::Decode(_) => "decode-error",
            ExchangeError::Unknown(_) => "unknown",
            ExchangeError::MissingCredentials => "missing-credentials",
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ExchangeError::Decode(e.to_string())
        } else {
            ExchangeError::Transport(e.to_string())
        }
    }
}

/// Abstraction over a spot exchange for one trading pair at a time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Latest traded price for `pair`.
    async fn spot_price(&self, pair: &str) -> Result<Decimal, ExchangeError>;

    /// Lot-size filter for `pair`.
    async fn lot_constraint(&self, pair: &str) -> Result<LotConstraint, ExchangeError>;

    /// The most recent `count` candles of the given interval ("1h", "4h"...).
    async fn candles(
        &self,
        pair: &str,
        interval: &str,
        count: u32,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// Submit a market buy for `quantity` units of the base asset.
    async fn market_buy(
        &self,
        pair: &str,
        quantity: Decimal,
    ) -> Result<OrderConfirmation, ExchangeError>;

    /// Exchange name for logging and identification.
    fn name(&self) -> &'static str;
}

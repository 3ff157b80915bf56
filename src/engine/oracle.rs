//! Price oracle.
//!
//! Spot price plus a simple moving reference: the mean of candle
//! midpoints `(high + low) / 2` over the trailing window.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use crate::exchange::{Exchange, ExchangeError};
use crate::types::{Candle, PriceSample};

pub struct PriceOracle {
    exchange: Arc<dyn Exchange>,
    pair: String,
}

impl PriceOracle {
    pub fn new(exchange: Arc<dyn Exchange>, pair: impl Into<String>) -> Self {
        Self {
            exchange,
            pair: pair.into(),
        }
    }

    pub async fn current_price(&self) -> Result<PriceSample, ExchangeError> {
        let value = self.exchange.spot_price(&self.pair).await?;
        if value <= Decimal::ZERO {
            return Err(ExchangeError::Decode(format!("non-positive spot price {value}")));
        }
        Ok(PriceSample::new(value, chrono::Utc::now()))
    }

    /// Mean candle midpoint over `window_hours`, sampled every
    /// `sample_interval_hours` (24 / 1 → 24 hourly candles).
    pub async fn rolling_average(
        &self,
        window_hours: u32,
        sample_interval_hours: u32,
    ) -> Result<Decimal, ExchangeError> {
        let count = window_hours.checked_div(sample_interval_hours).unwrap_or(0);
        if count == 0 {
            return Err(ExchangeError::Decode(format!(
                "window {window_hours}h holds no {sample_interval_hours}h candles"
            )));
        }

        let interval = format!("{sample_interval_hours}h");
        let candles = self.exchange.candles(&self.pair, &interval, count).await?;
        let avg = average_mid(&candles)
            .ok_or_else(|| ExchangeError::Decode("no candles returned".to_string()))?;

        debug!(pair = %self.pair, candles = candles.len(), %avg, "Rolling average computed");
        Ok(avg)
    }
}

/// Arithmetic mean of candle midpoints; `None` for an empty slice.
pub fn average_mid(candles: &[Candle]) -> Option<Decimal> {
    if candles.is_empty() {
        return None;
    }
    let sum: Decimal = candles.iter().map(Candle::mid).sum();
    Some(sum / Decimal::from(candles.len()))
}

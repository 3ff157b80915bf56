//! Mock exchange for integration testing.
//!
//! Provides a deterministic `Exchange` implementation with a scripted
//! price feed, fixed candles, and recorded orders. All in-memory with
//! no external dependencies.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use dipbuyer::exchange::{Exchange, ExchangeError};
use dipbuyer::types::{Candle, LotConstraint, OrderConfirmation};

/// A mock spot exchange for deterministic testing.
///
/// Each `spot_price` call pops the next scripted result; once the script
/// is exhausted the last price repeats.
pub struct MockExchange {
    prices: Arc<Mutex<VecDeque<Result<Decimal, ExchangeError>>>>,
    last_price: Arc<Mutex<Decimal>>,
    candles: Arc<Mutex<Vec<Candle>>>,
    lot: LotConstraint,
    orders: Arc<Mutex<Vec<Decimal>>>,
    price_calls: Arc<Mutex<usize>>,
    /// If set, order submission returns this error.
    order_error: Arc<Mutex<Option<ExchangeError>>>,
}

impl MockExchange {
    /// Reference price 30 000 (candles 30 100 / 29 900), BTC-like lot filter.
    pub fn new(initial_price: Decimal) -> Self {
        Self {
            prices: Arc::new(Mutex::new(VecDeque::new())),
            last_price: Arc::new(Mutex::new(initial_price)),
            candles: Arc::new(Mutex::new(vec![Candle::new(dec!(30100), dec!(29900)); 24])),
            lot: LotConstraint::new(dec!(0.0001), dec!(0.00001)),
            orders: Arc::new(Mutex::new(Vec::new())),
            price_calls: Arc::new(Mutex::new(0)),
            order_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Queue results for upcoming `spot_price` calls.
    pub fn script_prices(&self, results: Vec<Result<Decimal, ExchangeError>>) {
        self.prices.lock().unwrap().extend(results);
    }

    pub fn set_order_error(&self, err: ExchangeError) {
        *self.order_error.lock().unwrap() = Some(err);
    }

    /// Quantities of all submitted orders.
    pub fn orders(&self) -> Vec<Decimal> {
        self.orders.lock().unwrap().clone()
    }

    pub fn price_calls(&self) -> usize {
        *self.price_calls.lock().unwrap()
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn spot_price(&self, _pair: &str) -> Result<Decimal, ExchangeError> {
        *self.price_calls.lock().unwrap() += 1;
        match self.prices.lock().unwrap().pop_front() {
            Some(Ok(p)) => {
                *self.last_price.lock().unwrap() = p;
                Ok(p)
            }
            Some(Err(e)) => Err(e),
            None => Ok(*self.last_price.lock().unwrap()),
        }
    }

    async fn lot_constraint(&self, _pair: &str) -> Result<LotConstraint, ExchangeError> {
        Ok(self.lot)
    }

    async fn candles(
        &self,
        _pair: &str,
        _interval: &str,
        count: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let candles = self.candles.lock().unwrap();
        Ok(candles.iter().take(count as usize).copied().collect())
    }

    async fn market_buy(
        &self,
        _pair: &str,
        quantity: Decimal,
    ) -> Result<OrderConfirmation, ExchangeError> {
        if let Some(err) = self.order_error.lock().unwrap().clone() {
            return Err(err);
        }
        let mut orders = self.orders.lock().unwrap();
        orders.push(quantity);
        Ok(OrderConfirmation {
            order_id: format!("MOCK-{}", orders.len()),
            executed_quantity: quantity,
            quote_spent: None,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

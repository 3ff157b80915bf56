//! Order executor.
//!
//! Normalizes the notional into a legal quantity and submits a market
//! buy. A quantity below the lot minimum is a skip, not a failure.
//! In dry-run mode orders are logged and filled synthetically.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::exchange::{Exchange, ExchangeError};
use crate::strategy::quantity::{normalize, QuantityError};
use crate::types::{LotConstraint, OrderConfirmation, PurchaseRecord};

// ---------------------------------------------------------------------------
// Execution result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderResult {
    Filled(PurchaseRecord),
    /// Computed quantity is below the exchange minimum; nothing submitted.
    Skipped { quantity: Decimal, min: Decimal },
    Failed(ExchangeError),
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct OrderExecutor {
    exchange: Arc<dyn Exchange>,
    pair: String,
    dry_run: bool,
}

impl OrderExecutor {
    pub fn new(exchange: Arc<dyn Exchange>, pair: impl Into<String>, dry_run: bool) -> Self {
        Self {
            exchange,
            pair: pair.into(),
            dry_run,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Spend `notional` at roughly `price` under `constraint`.
    pub async fn execute(
        &self,
        notional: Decimal,
        price: Decimal,
        constraint: &LotConstraint,
    ) -> OrderResult {
        let quantity = match normalize(notional, price, constraint) {
            Ok(q) => q,
            Err(QuantityError::Insufficient { quantity, min }) => {
                warn!(%quantity, %min, %notional, %price, "Quantity below lot minimum, skipping order");
                return OrderResult::Skipped { quantity, min };
            }
            // Bad price or step size can only come from bad exchange data.
            Err(e) => return OrderResult::Failed(ExchangeError::Decode(e.to_string())),
        };

        info!(
            pair = %self.pair,
            notional = format!("{notional:.2}"),
            price = format!("{price:.2}"),
            %quantity,
            dry_run = self.dry_run,
            "Buying"
        );

        if self.dry_run {
            info!(pair = %self.pair, %quantity, "[DRY RUN] Would submit market buy");
            let confirmation = OrderConfirmation {
                order_id: format!("dry-run-{}", uuid::Uuid::new_v4()),
                executed_quantity: quantity,
                quote_spent: None,
            };
            return OrderResult::Filled(purchase_record(&confirmation, price));
        }

        match self.exchange.market_buy(&self.pair, quantity).await {
            Ok(confirmation) => {
                let record = purchase_record(&confirmation, price);
                info!(
                    order_id = %record.order_id,
                    quantity = %record.quantity,
                    spent = format!("{:.2}", record.notional_spent),
                    "Order complete"
                );
                OrderResult::Filled(record)
            }
            Err(e) => {
                warn!(category = e.category(), error = %e, "Market buy failed");
                OrderResult::Failed(e)
            }
        }
    }
}

/// Build the purchase record from what the exchange reports, falling back
/// to the quoted price when fill details are missing.
fn purchase_record(confirmation: &OrderConfirmation, quoted_price: Decimal) -> PurchaseRecord {
    let quantity = confirmation.executed_quantity;
    let spent = confirmation
        .quote_spent
        .filter(|s| !s.is_zero())
        .unwrap_or(quantity * quoted_price);
    let price = if quantity.is_zero() {
        quoted_price
    } else {
        spent / quantity
    };

    PurchaseRecord {
        timestamp: Utc::now(),
        order_id: confirmation.order_id.clone(),
        notional_spent: spent,
        price,
        quantity,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Shared types for the DIPBUYER agent.
//!
//! These types form the data model used across all modules.
//! Exchange, strategy, and engine modules depend on them without
//! depending on each other.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// A spot price observed at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSample {
    pub value: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl PriceSample {
    pub fn new(value: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self { value, timestamp }
    }
}

/// A historical candle. Only the range is needed for the reference price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candle {
    pub open_time: Option<DateTime<Utc>>,
    pub high: Decimal,
    pub low: Decimal,
}

impl Candle {
    pub fn new(high: Decimal, low: Decimal) -> Self {
        Self {
            open_time: None,
            high,
            low,
        }
    }

    /// Midpoint of the candle range.
    pub fn mid(&self) -> Decimal {
        (self.high + self.low) / Decimal::TWO
    }
}

/// Exchange lot-size filter for a trading pair.
///
/// A legal order quantity is `>= min_quantity` and expressed with no more
/// fractional digits than `step_size` carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotConstraint {
    pub min_quantity: Decimal,
    pub step_size: Decimal,
}

impl LotConstraint {
    pub fn new(min_quantity: Decimal, step_size: Decimal) -> Self {
        Self {
            min_quantity,
            step_size,
        }
    }

    /// Number of significant fractional digits in the step size.
    ///
    /// `0.00001` → 5, `0.00010` → 4, `1` → 0.
    pub fn precision(&self) -> u32 {
        self.step_size.normalize().scale()
    }
}

impl fmt::Display for LotConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min={} step={}",
            self.min_quantity.normalize(),
            self.step_size.normalize()
        )
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Exchange acknowledgement of a filled market buy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub executed_quantity: Decimal,
    /// Quote currency actually spent, when the exchange reports it.
    pub quote_spent: Option<Decimal>,
}

/// A successful purchase, as remembered by the throttle and the state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub timestamp: DateTime<Utc>,
    pub order_id: String,
    pub notional_spent: Decimal,
    pub price: Decimal,
    pub quantity: Decimal,
}

impl fmt::Display for PurchaseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "order={} qty={} price={:.2} spent={:.2}",
            self.order_id,
            self.quantity.normalize(),
            self.price,
            self.notional_spent,
        )
    }
}

// ---------------------------------------------------------------------------
// Throttle state
// ---------------------------------------------------------------------------

/// Purchase history retained between cycles and across restarts.
///
/// Only mutated through [`ThrottleState::record_purchase`], which the
/// scheduler calls after a confirmed fill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleState {
    pub last_buy_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_purchase: Option<PurchaseRecord>,
    #[serde(default)]
    pub purchases: u64,
    #[serde(default)]
    pub total_spent: Decimal,
    #[serde(default)]
    pub total_quantity: Decimal,
}

impl ThrottleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a confirmed purchase.
    pub fn record_purchase(&mut self, record: PurchaseRecord) {
        self.last_buy_time = Some(record.timestamp);
        self.purchases += 1;
        self.total_spent += record.notional_spent;
        self.total_quantity += record.quantity;
        self.last_purchase = Some(record);
    }

    /// Adopt a recovered timestamp if it is newer than what we hold.
    pub fn merge_recovered(&mut self, recovered: Option<DateTime<Utc>>) {
        if let Some(ts) = recovered {
            if self.last_buy_time.map_or(true, |current| ts > current) {
                self.last_buy_time = Some(ts);
            }
        }
    }

    /// Volume-weighted average entry price over all recorded purchases.
    pub fn average_entry(&self) -> Option<Decimal> {
        if self.total_quantity.is_zero() {
            None
        } else {
            Some(self.total_spent / self.total_quantity)
        }
    }
}

impl fmt::Display for ThrottleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self
            .last_buy_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        write!(
            f,
            "last_buy={} | purchases={} | spent={:.2} | qty={}",
            last,
            self.purchases,
            self.total_spent,
            self.total_quantity.normalize(),
        )
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Why a cycle did not buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Price or reference price could not be fetched this cycle.
    NoData,
    /// A purchase happened within the cooldown window.
    CooldownActive { remaining: Duration },
    /// Price is not below the dip threshold.
    NoDip { threshold: Decimal },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoData => write!(f, "no-data"),
            SkipReason::CooldownActive { remaining } => {
                let mins = remaining.num_minutes();
                write!(f, "cooldown-active ({}h{:02}m left)", mins / 60, mins % 60)
            }
            SkipReason::NoDip { threshold } => {
                write!(f, "no-dip (threshold {:.2})", threshold)
            }
        }
    }
}

/// Outcome of one evaluation of the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Buy,
    Skip(SkipReason),
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Buy => write!(f, "BUY"),
            Decision::Skip(reason) => write!(f, "SKIP: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity shared by journal lines and operator notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl Level {
    pub fn icon(&self) -> &'static str {
        match self {
            Level::Info => "✅",
            Level::Warning => "⚠️",
            Level::Error => "❌",
        }
    }

    /// Upper-case label used in journal lines.
    pub fn label(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

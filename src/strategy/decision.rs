//! Buy decision engine.
//!
//! Combines the spot price, the rolling reference price and the throttle
//! into a single `Decision`. Pure: identical inputs give identical output.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::throttle::remaining_cooldown;
use crate::config::{BuyMode, StrategyConfig};
use crate::types::{Decision, SkipReason};

/// Decision engine parameters.
#[derive(Debug, Clone)]
pub struct DecisionConfig {
    pub mode: BuyMode,
    /// Fraction below the reference price that counts as a dip.
    pub dip_fraction: Decimal,
    pub cooldown: Duration,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            mode: BuyMode::Dip,
            dip_fraction: dec!(0.01),
            cooldown: Duration::hours(24),
        }
    }
}

impl From<&StrategyConfig> for DecisionConfig {
    fn from(cfg: &StrategyConfig) -> Self {
        Self {
            mode: cfg.mode,
            dip_fraction: cfg.dip_fraction,
            cooldown: Duration::hours(i64::from(cfg.cooldown_hours)),
        }
    }
}

pub struct DecisionEngine {
    config: DecisionConfig,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Price below which a dip buy fires.
    pub fn threshold(&self, avg_price: Decimal) -> Decimal {
        avg_price * (Decimal::ONE - self.config.dip_fraction)
    }

    /// Evaluate one cycle.
    ///
    /// Order of checks: missing data, cooldown, then the dip test
    /// (`current < avg * (1 - dip_fraction)`, strict). Recurring mode
    /// skips the dip test and does not need a reference price.
    pub fn decide(
        &self,
        now: DateTime<Utc>,
        current_price: Option<Decimal>,
        avg_price: Option<Decimal>,
        last_buy_time: Option<DateTime<Utc>>,
    ) -> Decision {
        let (Some(current), avg) = (current_price, avg_price) else {
            return Decision::Skip(SkipReason::NoData);
        };
        if self.config.mode == BuyMode::Dip && avg.is_none() {
            return Decision::Skip(SkipReason::NoData);
        }

        if let Some(remaining) = remaining_cooldown(now, last_buy_time, self.config.cooldown) {
            return Decision::Skip(SkipReason::CooldownActive { remaining });
        }

        let Some(avg) = avg.filter(|_| self.config.mode == BuyMode::Dip) else {
            return Decision::Buy;
        };
        let threshold = self.threshold(avg);
        if current < threshold {
            Decision::Buy
        } else {
            Decision::Skip(SkipReason::NoDip { threshold })
        }
    }
}

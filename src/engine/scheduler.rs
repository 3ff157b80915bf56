//! Scheduler loop.
//!
//! Drives fetch → decide → (skip | execute) → sleep on a fixed interval
//! until shutdown. A cycle never fails: every fault is logged, journaled
//! and notified, then the loop waits the full interval and tries again.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::executor::{OrderExecutor, OrderResult};
use super::oracle::PriceOracle;
use crate::config::{AppConfig, BuyMode};
use crate::exchange::{Exchange, ExchangeError};
use crate::notify::Notifier;
use crate::storage::{self, journal::Journal};
use crate::strategy::DecisionEngine;
use crate::types::{Decision, Level, PurchaseRecord, SkipReason, ThrottleState};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub pair: String,
    pub notional: Decimal,
    pub interval: Duration,
    pub window_hours: u32,
    pub sample_interval_hours: u32,
    pub notify_skips: bool,
    /// Where to persist the throttle state after each purchase.
    pub state_path: Option<String>,
}

impl From<&AppConfig> for SchedulerConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            pair: cfg.agent.pair.clone(),
            notional: cfg.agent.notional,
            interval: Duration::from_secs(cfg.agent.poll_interval_secs),
            window_hours: cfg.strategy.window_hours,
            sample_interval_hours: cfg.strategy.sample_interval_hours,
            notify_skips: cfg.strategy.notify_skips,
            state_path: Some(cfg.storage.state_path.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// What a cycle ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    Bought(PurchaseRecord),
    BelowMinimum { quantity: Decimal, min: Decimal },
    Failed { stage: &'static str, error: ExchangeError },
}

/// Summary of one fetch → decide → act cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub timestamp: DateTime<Utc>,
    pub price: Option<Decimal>,
    pub avg_price: Option<Decimal>,
    pub decision: Decision,
    pub outcome: CycleOutcome,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    config: SchedulerConfig,
    exchange: Arc<dyn Exchange>,
    oracle: PriceOracle,
    executor: OrderExecutor,
    engine: DecisionEngine,
    notifier: Arc<dyn Notifier>,
    journal: Journal,
    state: ThrottleState,
    cycle_count: u64,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        exchange: Arc<dyn Exchange>,
        engine: DecisionEngine,
        notifier: Arc<dyn Notifier>,
        journal: Journal,
        state: ThrottleState,
        dry_run: bool,
    ) -> Self {
        Self {
            oracle: PriceOracle::new(exchange.clone(), config.pair.clone()),
            executor: OrderExecutor::new(exchange.clone(), config.pair.clone(), dry_run),
            exchange,
            engine,
            notifier,
            journal,
            state,
            config,
            cycle_count: 0,
        }
    }

    pub fn state(&self) -> &ThrottleState {
        &self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycle_count
    }

    /// Run cycles until `shutdown` resolves.
    ///
    /// Shutdown is only observed during the sleep; a running cycle always
    /// completes.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let decision = self.engine.config();
        info!(
            exchange = self.exchange.name(),
            pair = %self.config.pair,
            mode = ?decision.mode,
            dip_fraction = %decision.dip_fraction,
            cooldown_hours = decision.cooldown.num_hours(),
            interval_secs = self.config.interval.as_secs(),
            "Entering main loop. Press Ctrl+C to stop."
        );

        loop {
            let report = self.run_cycle(Utc::now()).await;
            log_cycle_report(&report);

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = &mut shutdown => {
                    info!("Shutdown signal received.");
                    break;
                }
            }
        }
    }

    /// One full cycle evaluated at `now`.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        self.cycle_count += 1;
        let mut fault: Option<(&'static str, ExchangeError)> = None;

        // 1. Spot price
        let price = match self.oracle.current_price().await {
            Ok(sample) => {
                debug!(price = %sample.value, at = %sample.timestamp, "Spot price fetched");
                Some(sample.value)
            }
            Err(e) => {
                fault = Some(("spot-price", e));
                None
            }
        };

        // 2. Reference price (dip mode only)
        let avg_price = if price.is_some() && self.engine.config().mode == BuyMode::Dip {
            match self
                .oracle
                .rolling_average(self.config.window_hours, self.config.sample_interval_hours)
                .await
            {
                Ok(avg) => Some(avg),
                Err(e) => {
                    fault = Some(("rolling-average", e));
                    None
                }
            }
        } else {
            None
        };

        // 3. Decide
        let decision = self
            .engine
            .decide(now, price, avg_price, self.state.last_buy_time);

        // 4. Act
        let outcome = match (decision, fault) {
            (Decision::Skip(_), Some((stage, error))) => {
                self.report_fault(stage, &error).await;
                CycleOutcome::Failed { stage, error }
            }
            (Decision::Skip(reason), None) => {
                self.report_skip(reason, price, avg_price).await;
                CycleOutcome::Skipped(reason)
            }
            (Decision::Buy, _) => match price {
                Some(price) => self.buy(price).await,
                None => CycleOutcome::Skipped(SkipReason::NoData),
            },
        };

        CycleReport {
            cycle_number: self.cycle_count,
            timestamp: now,
            price,
            avg_price,
            decision,
            outcome,
        }
    }

    async fn buy(&mut self, price: Decimal) -> CycleOutcome {
        let constraint = match self.exchange.lot_constraint(&self.config.pair).await {
            Ok(c) => c,
            Err(error) => {
                self.report_fault("lot-constraint", &error).await;
                return CycleOutcome::Failed {
                    stage: "lot-constraint",
                    error,
                };
            }
        };

        match self.executor.execute(self.config.notional, price, &constraint).await {
            OrderResult::Filled(record) => {
                self.commit_purchase(&record);
                let msg = format!(
                    "{}Bought {} {} at {:.2} for {:.2} (order {})",
                    if self.executor.is_dry_run() { "[DRY RUN] " } else { "" },
                    record.quantity.normalize(),
                    self.config.pair,
                    record.price,
                    record.notional_spent,
                    record.order_id,
                );
                self.notifier.notify(Level::Info, &msg).await;
                CycleOutcome::Bought(record)
            }
            OrderResult::Skipped { quantity, min } => {
                let msg = format!(
                    "Calculated amount {quantity} is below minimum {min} for {}. Skipping order.",
                    self.config.pair
                );
                warn!("{msg}");
                self.journal.record(Level::Warning, &msg);
                self.notifier.notify(Level::Warning, &msg).await;
                CycleOutcome::BelowMinimum { quantity, min }
            }
            OrderResult::Failed(error) => {
                self.report_fault("order", &error).await;
                CycleOutcome::Failed {
                    stage: "order",
                    error,
                }
            }
        }
    }

    /// The only place the throttle state changes.
    ///
    /// Simulated fills only update the in-memory state: they never write the
    /// recovery marker or the state file, so a later live run is not throttled
    /// by them.
    fn commit_purchase(&mut self, record: &PurchaseRecord) {
        self.state.record_purchase(record.clone());

        if self.executor.is_dry_run() {
            self.journal.record_simulated_purchase(record);
            return;
        }

        if let Err(e) = self.journal.record_purchase(record) {
            error!(error = format!("{e:#}"), "Failed to journal purchase");
        }
        if let Some(path) = &self.config.state_path {
            if let Err(e) = storage::save_state(&self.state, path) {
                error!(error = format!("{e:#}"), "Failed to save state");
            }
        }
    }

    async fn report_skip(
        &self,
        reason: SkipReason,
        price: Option<Decimal>,
        avg_price: Option<Decimal>,
    ) {
        let msg = match (price, avg_price) {
            (Some(p), Some(avg)) => format!("SKIP {reason}: price {p:.2}, 24h avg {avg:.2}"),
            (Some(p), None) => format!("SKIP {reason}: price {p:.2}"),
            _ => format!("SKIP {reason}"),
        };
        info!("{msg}");
        self.journal.record(Level::Info, &msg);

        if self.config.notify_skips && matches!(reason, SkipReason::NoDip { .. }) {
            self.notifier.notify(Level::Info, &msg).await;
        }
    }

    async fn report_fault(&self, stage: &str, error: &ExchangeError) {
        let msg = format!("{stage} failed [{}]: {error}", error.category());
        error!(stage, category = error.category(), error = %error, "Cycle step failed");
        self.journal.record(Level::Error, &msg);
        self.notifier.notify(Level::Error, &msg).await;
    }
}

/// Log a one-line cycle summary.
fn log_cycle_report(report: &CycleReport) {
    let outcome = match &report.outcome {
        CycleOutcome::Skipped(reason) => format!("skipped: {reason}"),
        CycleOutcome::Bought(record) => format!("bought: {record}"),
        CycleOutcome::BelowMinimum { quantity, min } => format!("below minimum: {quantity} < {min}"),
        CycleOutcome::Failed { stage, error } => format!("failed at {stage}: {error}"),
    };
    info!(
        cycle = report.cycle_number,
        price = ?report.price,
        avg = ?report.avg_price,
        decision = %report.decision,
        outcome = %outcome,
        "Cycle complete"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

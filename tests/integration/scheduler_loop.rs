//! End-to-end cycles against the in-memory exchange.

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use dipbuyer::config::BuyMode;
use dipbuyer::engine::scheduler::{CycleOutcome, Scheduler, SchedulerConfig};
use dipbuyer::exchange::ExchangeError;
use dipbuyer::notify::LogNotifier;
use dipbuyer::storage::{self, journal::Journal};
use dipbuyer::strategy::{DecisionConfig, DecisionEngine};
use dipbuyer::types::{Level, SkipReason, ThrottleState};

use crate::mock_exchange::MockExchange;

struct Paths {
    journal: String,
    state: String,
}

impl Paths {
    fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        let dir = std::env::temp_dir();
        Self {
            journal: dir.join(format!("dipbuyer_it_{id}.log")).to_string_lossy().to_string(),
            state: dir.join(format!("dipbuyer_it_{id}.json")).to_string_lossy().to_string(),
        }
    }
}

impl Drop for Paths {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.journal);
        let _ = std::fs::remove_file(&self.state);
    }
}

fn scheduler(
    exchange: &Arc<MockExchange>,
    paths: &Paths,
    state: ThrottleState,
    mode: BuyMode,
) -> Scheduler {
    build_scheduler(exchange, paths, state, mode, false)
}

fn build_scheduler(
    exchange: &Arc<MockExchange>,
    paths: &Paths,
    state: ThrottleState,
    mode: BuyMode,
    dry_run: bool,
) -> Scheduler {
    let config = SchedulerConfig {
        pair: "BTCUSDT".into(),
        notional: dec!(15),
        interval: Duration::from_secs(900),
        window_hours: 24,
        sample_interval_hours: 1,
        notify_skips: true,
        state_path: Some(paths.state.clone()),
    };
    Scheduler::new(
        config,
        exchange.clone(),
        DecisionEngine::new(DecisionConfig {
            mode,
            ..DecisionConfig::default()
        }),
        Arc::new(LogNotifier),
        Journal::new(&paths.journal),
        state,
        dry_run,
    )
}

#[tokio::test(start_paused = true)]
async fn test_fault_does_not_stop_the_loop() {
    let exchange = Arc::new(MockExchange::new(dec!(29000)));
    exchange.script_prices(vec![Err(ExchangeError::Transport("connection reset".into()))]);
    let paths = Paths::new();
    let mut sched = scheduler(&exchange, &paths, ThrottleState::new(), BuyMode::Dip);

    // Cycles at t=0 (fault) and t=900s (dip buy); shutdown lands in the second sleep.
    sched.run(tokio::time::sleep(Duration::from_secs(901))).await;

    assert_eq!(sched.cycles(), 2);
    assert_eq!(exchange.price_calls(), 2);
    assert_eq!(exchange.orders(), vec![dec!(0.00052)]);
    assert_eq!(sched.state().purchases, 1);
}

#[tokio::test(start_paused = true)]
async fn test_buy_once_per_cooldown() {
    let exchange = Arc::new(MockExchange::new(dec!(29000)));
    let paths = Paths::new();
    let mut sched = scheduler(&exchange, &paths, ThrottleState::new(), BuyMode::Dip);

    // Four cycles, price stays in the dip the whole time.
    sched.run(tokio::time::sleep(Duration::from_secs(3 * 900 + 1))).await;

    assert_eq!(sched.cycles(), 4);
    assert_eq!(exchange.orders().len(), 1);
}

#[tokio::test]
async fn test_oracle_fault_keeps_last_buy_time() {
    let exchange = Arc::new(MockExchange::new(dec!(29000)));
    exchange.script_prices(vec![Err(ExchangeError::Decode("bad body".into()))]);
    let paths = Paths::new();

    let last = Utc::now() - ChronoDuration::hours(30);
    let state = ThrottleState {
        last_buy_time: Some(last),
        ..ThrottleState::default()
    };
    let mut sched = scheduler(&exchange, &paths, state, BuyMode::Dip);

    let report = sched.run_cycle(Utc::now()).await;
    assert!(matches!(report.outcome, CycleOutcome::Failed { stage: "spot-price", .. }));
    assert_eq!(sched.state().last_buy_time, Some(last));

    let lines = Journal::new(&paths.journal).read_lines().unwrap();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("ERROR: spot-price failed [decode-error]"));
}

#[tokio::test]
async fn test_restart_recovers_cooldown_from_journal() {
    let exchange = Arc::new(MockExchange::new(dec!(29000)));
    let paths = Paths::new();

    // Previous run bought an hour ago but its state file was lost.
    let journal = Journal::new(&paths.journal);
    journal
        .append_at(Utc::now() - ChronoDuration::hours(1), Level::Info, "PURCHASE_OK order=1")
        .unwrap();

    let state = tokio_test::assert_ok!(storage::restore_state(&paths.state, &journal));
    assert!(state.last_buy_time.is_some());

    let mut sched = scheduler(&exchange, &paths, state, BuyMode::Dip);
    let report = sched.run_cycle(Utc::now()).await;

    assert!(matches!(
        report.outcome,
        CycleOutcome::Skipped(SkipReason::CooldownActive { .. })
    ));
    assert!(exchange.orders().is_empty());
}

#[tokio::test]
async fn test_purchase_survives_restart() {
    let exchange = Arc::new(MockExchange::new(dec!(29000)));
    let paths = Paths::new();
    let mut sched = scheduler(&exchange, &paths, ThrottleState::new(), BuyMode::Dip);

    let report = sched.run_cycle(Utc::now()).await;
    let CycleOutcome::Bought(record) = report.outcome else {
        panic!("expected a purchase, got {:?}", report.outcome);
    };

    let restored = storage::restore_state(&paths.state, &Journal::new(&paths.journal)).unwrap();
    assert_eq!(restored.last_buy_time, Some(record.timestamp));
    assert_eq!(restored.purchases, 1);
    assert_eq!(restored.last_purchase, Some(record));

    let lines = Journal::new(&paths.journal).read_lines().unwrap();
    assert!(lines.iter().any(|l| l.contains("PURCHASE_OK order=MOCK-1")));
}

#[tokio::test]
async fn test_rejected_order_is_not_a_purchase() {
    let exchange = Arc::new(MockExchange::new(dec!(29000)));
    exchange.set_order_error(ExchangeError::Rejected {
        code: -1013,
        message: "Filter failure: LOT_SIZE".into(),
    });
    let paths = Paths::new();
    let mut sched = scheduler(&exchange, &paths, ThrottleState::new(), BuyMode::Dip);

    let report = sched.run_cycle(Utc::now()).await;
    assert!(matches!(
        report.outcome,
        CycleOutcome::Failed {
            stage: "order",
            error: ExchangeError::Rejected { code: -1013, .. }
        }
    ));
    assert!(sched.state().last_buy_time.is_none());
    assert!(!std::path::Path::new(&paths.state).exists());
}

#[tokio::test]
async fn test_no_dip_above_threshold() {
    // Reference 30 000 → threshold 29 700; 29 700 itself is not a dip.
    let exchange = Arc::new(MockExchange::new(dec!(29700)));
    let paths = Paths::new();
    let mut sched = scheduler(&exchange, &paths, ThrottleState::new(), BuyMode::Dip);

    let report = sched.run_cycle(Utc::now()).await;
    assert_eq!(
        report.outcome,
        CycleOutcome::Skipped(SkipReason::NoDip { threshold: dec!(29700) })
    );
}

#[tokio::test]
async fn test_recurring_mode_buys_without_dip() {
    let exchange = Arc::new(MockExchange::new(dec!(31000)));
    let paths = Paths::new();
    let mut sched = scheduler(&exchange, &paths, ThrottleState::new(), BuyMode::Recurring);

    let report = sched.run_cycle(Utc::now()).await;
    assert!(matches!(report.outcome, CycleOutcome::Bought(_)));
    assert!(report.avg_price.is_none());
    assert_eq!(exchange.orders().len(), 1);
}

#[tokio::test]
async fn test_dry_run_fill_is_not_persisted() {
    let exchange = Arc::new(MockExchange::new(dec!(29000)));
    let paths = Paths::new();
    let mut sched = build_scheduler(&exchange, &paths, ThrottleState::new(), BuyMode::Dip, true);

    let report = sched.run_cycle(Utc::now()).await;
    assert!(matches!(report.outcome, CycleOutcome::Bought(_)));
    assert!(exchange.orders().is_empty());
    // Throttled for the rest of this session only.
    assert_eq!(sched.state().purchases, 1);

    assert!(!std::path::Path::new(&paths.state).exists());
    let journal = Journal::new(&paths.journal);
    let lines = journal.read_lines().unwrap();
    assert!(lines.iter().any(|l| l.contains("DRY_RUN order=dry-run-")));
    assert!(!lines.iter().any(|l| l.contains("PURCHASE_OK")));

    let restored = storage::restore_state(&paths.state, &journal).unwrap();
    assert_eq!(restored, ThrottleState::new());
}

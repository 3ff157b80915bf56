//! DIPBUYER — scheduled spot dip-buying agent.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the throttle state from disk and journal, and runs the
//! fetch→decide→buy loop until Ctrl+C.

use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, warn};

use dipbuyer::config::{self, AppConfig};
use dipbuyer::engine::scheduler::{Scheduler, SchedulerConfig};
use dipbuyer::exchange::binance::{ApiCredentials, BinanceClient};
use dipbuyer::notify::telegram::TelegramNotifier;
use dipbuyer::notify::{Level, LogNotifier, Notifier};
use dipbuyer::storage::{self, journal::Journal};
use dipbuyer::strategy::{DecisionConfig, DecisionEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    info!(
        agent_name = %cfg.agent.name,
        pair = %cfg.agent.pair,
        notional = %cfg.agent.notional,
        mode = ?cfg.strategy.mode,
        dip_fraction = %cfg.strategy.dip_fraction,
        cooldown_hours = cfg.strategy.cooldown_hours,
        poll_interval_secs = cfg.agent.poll_interval_secs,
        dry_run = cfg.agent.dry_run,
        "DIPBUYER starting up"
    );

    // -- Restore state ---------------------------------------------------

    let journal = Journal::new(&cfg.storage.journal_path);
    let state = storage::restore_state(&cfg.storage.state_path, &journal)?;
    info!(%state, "Throttle state restored");

    // -- Initialise components -------------------------------------------

    let credentials = cfg
        .exchange_credentials()?
        .map(|(api_key, api_secret)| ApiCredentials {
            api_key,
            api_secret: SecretString::new(api_secret),
        });
    if credentials.is_none() {
        warn!("No exchange API keys configured; dry run uses public endpoints only");
    }
    let exchange = Arc::new(BinanceClient::new(
        &cfg.exchange.base_url,
        credentials,
        cfg.exchange.recv_window_ms,
    )?);

    let notifier = build_notifier(&cfg.alerts)?;

    let engine = DecisionEngine::new(DecisionConfig::from(&cfg.strategy));
    let mut scheduler = Scheduler::new(
        SchedulerConfig::from(&cfg),
        exchange,
        engine,
        notifier.clone(),
        journal,
        state,
        cfg.agent.dry_run,
    );

    notifier
        .notify(
            Level::Info,
            &format!(
                "{} started: {} per buy on {} ({:?} mode{})",
                cfg.agent.name,
                cfg.agent.notional,
                cfg.agent.pair,
                cfg.strategy.mode,
                if cfg.agent.dry_run { ", dry run" } else { "" }
            ),
        )
        .await;

    // -- Main loop -------------------------------------------------------

    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!(
        cycles = scheduler.cycles(),
        state = %scheduler.state(),
        avg_entry = ?scheduler.state().average_entry(),
        "DIPBUYER shut down cleanly."
    );

    Ok(())
}

/// Telegram when both credentials resolve, log-only otherwise.
fn build_notifier(alerts: &config::AlertsConfig) -> Result<Arc<dyn Notifier>> {
    let token = alerts
        .telegram_bot_token_env
        .as_deref()
        .and_then(|env| std::env::var(env).ok());
    let chat_id = alerts
        .telegram_chat_id_env
        .as_deref()
        .and_then(|env| std::env::var(env).ok());

    match (token, chat_id) {
        (Some(token), Some(chat_id)) => {
            info!("Using Telegram notifier");
            Ok(Arc::new(TelegramNotifier::new(SecretString::new(token), chat_id)?))
        }
        _ => {
            warn!("No Telegram credentials configured; notifications go to the log only");
            Ok(Arc::new(LogNotifier))
        }
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dipbuyer=info"));

    let json_logging = std::env::var("DIPBUYER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}

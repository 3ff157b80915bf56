//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys, bot tokens) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub strategy: StrategyConfig,
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Trading pair symbol, e.g. "BTCUSDT".
    pub pair: String,
    /// Quote-currency amount spent per purchase.
    pub notional: Decimal,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Log intended orders without submitting them.
    #[serde(default)]
    pub dry_run: bool,
}

/// Which gating rule the decision engine applies.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuyMode {
    /// Buy only when price dips below the rolling reference.
    #[default]
    Dip,
    /// Buy on every cycle the cooldown allows.
    Recurring,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    #[serde(default)]
    pub mode: BuyMode,
    #[serde(default = "default_dip_fraction")]
    pub dip_fraction: Decimal,
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: u32,
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
    #[serde(default = "default_sample_interval_hours")]
    pub sample_interval_hours: u32,
    /// Also notify on plain no-dip skips (noisy).
    #[serde(default)]
    pub notify_skips: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub api_key_env: String,
    pub api_secret_env: String,
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AlertsConfig {
    pub telegram_bot_token_env: Option<String>,
    pub telegram_chat_id_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_journal_path")]
    pub journal_path: String,
    #[serde(default = "default_state_path")]
    pub state_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            journal_path: default_journal_path(),
            state_path: default_state_path(),
        }
    }
}

fn default_poll_interval() -> u64 {
    900
}

fn default_dip_fraction() -> Decimal {
    dec!(0.01)
}

fn default_cooldown_hours() -> u32 {
    24
}

fn default_window_hours() -> u32 {
    24
}

fn default_sample_interval_hours() -> u32 {
    1
}

fn default_base_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_recv_window() -> u64 {
    5000
}

fn default_journal_path() -> String {
    "dipbuyer_run.log".to_string()
}

fn default_state_path() -> String {
    "dipbuyer_state.json".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(contents).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the decision loop cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.agent.pair.trim().is_empty() {
            bail!("agent.pair must not be empty");
        }
        if self.agent.notional <= Decimal::ZERO {
            bail!("agent.notional must be positive, got {}", self.agent.notional);
        }
        if self.agent.poll_interval_secs == 0 {
            bail!("agent.poll_interval_secs must be positive");
        }
        let s = &self.strategy;
        if s.dip_fraction < Decimal::ZERO || s.dip_fraction >= Decimal::ONE {
            bail!("strategy.dip_fraction must be in [0, 1), got {}", s.dip_fraction);
        }
        if s.cooldown_hours == 0 {
            bail!("strategy.cooldown_hours must be positive");
        }
        if s.sample_interval_hours == 0 || s.window_hours < s.sample_interval_hours {
            bail!(
                "strategy.window_hours ({}) must be >= sample_interval_hours ({}) > 0",
                s.window_hours,
                s.sample_interval_hours
            );
        }
        Ok(())
    }

    /// Exchange API key and secret from the environment.
    ///
    /// A dry run only calls public endpoints, so missing keys are allowed
    /// there and yield `None`.
    pub fn exchange_credentials(&self) -> Result<Option<(String, String)>> {
        let key = Self::resolve_env(&self.exchange.api_key_env);
        let secret = Self::resolve_env(&self.exchange.api_secret_env);
        match (key, secret) {
            (Ok(key), Ok(secret)) => Ok(Some((key, secret))),
            (Err(e), _) | (_, Err(e)) if !self.agent.dry_run => Err(e),
            _ => Ok(None),
        }
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

//! Telegram Bot API notifier (`sendMessage`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{debug, error};

use super::{format_message, Level, Notifier};

const BASE_URL: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    http: Client,
    bot_token: SecretString,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: SecretString, chat_id: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client for Telegram")?;
        Ok(Self {
            http,
            bot_token,
            chat_id,
        })
    }

    async fn send(&self, text: &str) -> Result<()> {
        let url = format!(
            "{BASE_URL}/bot{}/sendMessage",
            self.bot_token.expose_secret()
        );
        let resp = self
            .http
            .post(&url)
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await
            // The bot token is part of the URL; keep it out of logs.
            .map_err(reqwest::Error::without_url)
            .context("Telegram request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram API error {status}: {body}");
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, level: Level, text: &str) {
        match self.send(&format_message(level, text)).await {
            Ok(()) => debug!("Telegram notification sent"),
            Err(e) => error!(error = format!("{e:#}"), "Failed to send Telegram notification"),
        }
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::NotificationChannel;
use crate::config::TELEGRAM_API_URL;
use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_url: String,
    pub bot_token: String,
    pub chat_id: String,
    /// Markdown, MarkdownV2 or HTML.
    pub parse_mode: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_url: TELEGRAM_API_URL.to_string(),
            bot_token: String::new(),
            chat_id: String::new(),
            parse_mode: "Markdown".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    description: Option<String>,
}

/// Telegram Bot API channel (`POST /bot<token>/sendMessage`).
pub struct TelegramChannel {
    config: TelegramConfig,
    client: Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn channel_type(&self) -> &'static str {
        "telegram"
    }

    fn is_enabled(&self) -> bool {
        !self.config.bot_token.is_empty() && !self.config.chat_id.is_empty()
    }

    async fn send(&self, text: &str) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_url.trim_end_matches('/'),
            self.config.bot_token
        );
        let payload = json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "parse_mode": self.config.parse_mode,
        });

        let response = self.client.post(&url).json(&payload).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        // Telegram reports most failures as `{"ok":false,...}`, sometimes with a 200.
        let parsed: Option<SendMessageResponse> = serde_json::from_str(&body).ok();
        match parsed {
            Some(r) if r.ok && status.is_success() => {
                debug!("Telegram message delivered");
                Ok(())
            }
            Some(r) => Err(AppError::Notify(format!(
                "Telegram sendMessage failed: {status} - {}",
                r.description.unwrap_or_default()
            ))),
            None => Err(AppError::Notify(format!(
                "Telegram sendMessage failed: {status} - {body}"
            ))),
        }
    }
}

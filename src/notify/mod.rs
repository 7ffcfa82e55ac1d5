pub mod messages;
mod telegram;

pub use telegram::{TelegramChannel, TelegramConfig};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;

/// Delivery seam for outbound alerts (Telegram in production).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn channel_type(&self) -> &'static str;

    fn is_enabled(&self) -> bool;

    async fn send(&self, text: &str) -> Result<()>;
}

/// Best-effort sender. Each message is bounded by `timeout` and failures are
/// only logged; nothing is retried.
#[derive(Clone)]
pub struct Notifier {
    channel: Arc<dyn NotificationChannel>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(channel: Arc<dyn NotificationChannel>, timeout: Duration) -> Self {
        Self { channel, timeout }
    }

    /// Returns whether the message was delivered.
    pub async fn send(&self, text: &str) -> bool {
        if !self.channel.is_enabled() {
            debug!(
                channel = self.channel.channel_type(),
                "Notification skipped, channel disabled"
            );
            return false;
        }

        match tokio::time::timeout(self.timeout, self.channel.send(text)).await {
            Ok(Ok(())) => {
                debug!(channel = self.channel.channel_type(), "Notification sent");
                true
            }
            Ok(Err(e)) => {
                warn!(channel = self.channel.channel_type(), "Notification failed: {e}");
                false
            }
            Err(_) => {
                warn!(
                    channel = self.channel.channel_type(),
                    "Notification timed out after {:?}", self.timeout
                );
                false
            }
        }
    }
}

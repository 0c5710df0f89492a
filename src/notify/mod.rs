//! Outbound lifecycle notifications
//!
//! The orchestrator emits one event per run transition; delivery is a
//! side channel and must never affect the run itself, so every
//! implementation swallows its own failures.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::NotifyConfig;
use crate::models::{EventPhase, LifecycleEvent};

/// Sink for job lifecycle events
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &LifecycleEvent);
}

/// Render an event as a Telegram-flavored HTML message
pub fn render_message(event: &LifecycleEvent) -> String {
    let mut message = match event.phase {
        EventPhase::Started => format!("\u{1F7E2} Starting job: <b>{}</b>", event.target),
        EventPhase::Completed => format!("\u{2705} Job completed: <b>{}</b>", event.target),
        EventPhase::Failed => format!("\u{1F534} Job failed: <b>{}</b>", event.target),
    };

    if let Some(detail) = &event.detail {
        match event.phase {
            EventPhase::Failed => {
                message.push_str(&format!("\n<pre>{}</pre>", detail));
            }
            _ => {
                message.push('\n');
                message.push_str(detail);
            }
        }
    }

    message
}

/// Delivers events to a Telegram chat via the bot API
pub struct TelegramNotifier {
    client: reqwest::Client,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: String, chat_id: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            token,
            chat_id,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, event: &LifecycleEvent) {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": render_message(event),
            "parse_mode": "HTML",
        });

        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(
                    "Telegram notification for '{}' rejected: HTTP {}",
                    event.target,
                    response.status()
                );
            }
            Err(e) => {
                warn!("Telegram notification for '{}' failed: {}", event.target, e);
            }
        }
    }
}

/// Logs events without delivering them anywhere
///
/// Used when no Telegram credentials are configured, and handy in tests.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &LifecycleEvent) {
        debug!(
            "Lifecycle event: target={} phase={:?} detail={:?}",
            event.target, event.phase, event.detail
        );
    }
}

/// Build the notifier for the current configuration
///
/// Missing credentials silently disable outbound delivery, matching the
/// behavior operators expect from an optional alerting channel.
pub fn build(config: &NotifyConfig) -> Arc<dyn Notifier> {
    match (config.effective_bot_token(), config.effective_chat_id()) {
        (Some(token), Some(chat_id)) => {
            debug!("Telegram notifications enabled");
            Arc::new(TelegramNotifier::new(token, chat_id))
        }
        _ => {
            debug!("Telegram credentials not configured; notifications disabled");
            Arc::new(LogNotifier)
        }
    }
}

//! Best-effort alerting.
//!
//! Every alert is logged; when a webhook is configured the payload is also
//! POSTed from a spawned task so the trading cycle never waits on delivery.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    pub timestamp: i64,
}

impl Alert {
    pub fn new(level: AlertLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Info, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Warning, title, message)
    }

    pub fn critical(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Critical, title, message)
    }
}

#[derive(Clone)]
pub struct AlertManager {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl AlertManager {
    /// Webhook target comes from `ALERT_WEBHOOK_URL`; without it alerts are
    /// log-only.
    pub fn from_env() -> Self {
        let webhook_url = std::env::var("ALERT_WEBHOOK_URL").ok();
        if webhook_url.is_none() {
            info!("No alert webhook configured, alerts are log-only");
        }
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    /// Log the alert and, if configured, dispatch it in the background.
    /// Never blocks and never fails the caller.
    pub fn notify(&self, alert: Alert) {
        match alert.level {
            AlertLevel::Info => info!("[ALERT] {}: {}", alert.title, alert.message),
            AlertLevel::Warning => warn!("[ALERT] {}: {}", alert.title, alert.message),
            AlertLevel::Critical => error!("[ALERT] {}: {}", alert.title, alert.message),
        }

        let Some(url) = self.webhook_url.clone() else {
            return;
        };
        let client = self.client.clone();

        tokio::spawn(async move {
            let payload = serde_json::json!({
                "text": format!("[{:?}] {}: {}", alert.level, alert.title, alert.message),
                "alert": alert,
            });
            if let Err(e) = client.post(&url).json(&payload).send().await {
                warn!("Failed to deliver webhook alert: {}", e);
            }
        });
    }
}

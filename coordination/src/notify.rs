//! Operator notification for human-tier escalations

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::escalation::state::EscalationContext;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("notification endpoint rejected the payload ({status})")]
    Rejected { status: u16 },
}

/// Delivers a human-readable escalation summary to an operator
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, summary: &str, context: &EscalationContext) -> Result<(), NotifyError>;
}

/// POSTs `{type, summary, context, timestamp}` to a webhook URL
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify(&self, summary: &str, context: &EscalationContext) -> Result<(), NotifyError> {
        let payload = json!({
            "type": "escalation",
            "summary": summary,
            "context": context,
            "timestamp": Utc::now().to_rfc3339(),
        });
        let resp = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }
        info!(status = %status, agent_id = %context.agent_id, "Webhook notification sent");
        Ok(())
    }
}

/// Used when no webhook is configured; the summary only reaches the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyNotifier;

#[async_trait]
impl NotificationSink for LogOnlyNotifier {
    async fn notify(&self, summary: &str, context: &EscalationContext) -> Result<(), NotifyError> {
        warn!(
            agent_id = %context.agent_id,
            reason = %context.reason,
            "Human intervention requested (no webhook configured):\n{summary}"
        );
        Ok(())
    }
}

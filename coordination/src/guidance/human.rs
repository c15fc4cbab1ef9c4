//! Human-facing tiers: operator notification and remote access preparation

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use super::{GuidanceError, GuidanceProducer};
use crate::escalation::state::{EscalationContext, EscalationLevel, EscalationResponse};
use crate::notify::NotificationSink;

/// Notifies an operator and waits for their reply out of band
pub struct HumanEscalation {
    sink: Arc<dyn NotificationSink>,
}

impl HumanEscalation {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }
}

pub(crate) fn human_summary(context: &EscalationContext) -> String {
    format!(
        "LeoDock Escalation Alert\n\n\
         Agent {} needs assistance:\n\
         - Reason: {}\n\
         - Task: {}\n\
         - Duration: {}s\n\
         - Failed attempts: {}\n\n\
         Latest error: {}\n\n\
         Action required: Review and provide guidance",
        context.agent_id,
        context.reason,
        context.current_task.as_deref().unwrap_or("Unknown"),
        context.elapsed_seconds,
        context.failed_attempts,
        context.error_messages.last().map(String::as_str).unwrap_or("None"),
    )
}

#[async_trait]
impl GuidanceProducer for HumanEscalation {
    fn level(&self) -> EscalationLevel {
        EscalationLevel::HumanRequired
    }

    async fn produce(
        &self,
        context: &EscalationContext,
    ) -> Result<EscalationResponse, GuidanceError> {
        let summary = human_summary(context);
        let notified = match self.sink.notify(&summary, context).await {
            Ok(()) => true,
            Err(e) => {
                warn!(agent_id = %context.agent_id, error = %e, "Human notification failed");
                false
            }
        };

        Ok(EscalationResponse::guidance(
            EscalationLevel::HumanRequired,
            format!("Human intervention requested. Summary: {summary}"),
        )
        .with_action("Check notification for details")
        .with_action("Review escalation context")
        .with_update("human_notified", notified)
        .with_update("notification_sent_at", Utc::now().to_rfc3339()))
    }
}

/// Last tier: hands the operator a remote session with the context preserved
pub struct RemoteAccessPreparation {
    remote_access_url: Option<String>,
}

impl RemoteAccessPreparation {
    pub fn new(remote_access_url: Option<String>) -> Self {
        Self { remote_access_url }
    }
}

#[async_trait]
impl GuidanceProducer for RemoteAccessPreparation {
    fn level(&self) -> EscalationLevel {
        EscalationLevel::RemoteAccess
    }

    async fn produce(
        &self,
        context: &EscalationContext,
    ) -> Result<EscalationResponse, GuidanceError> {
        let url = self.remote_access_url.as_deref().unwrap_or("not configured");
        info!(agent_id = %context.agent_id, url, "Remote access prepared");

        let access_info = json!({
            "escalation_id": context.escalation_id,
            "agent_id": context.agent_id,
            "timestamp": context.timestamp.to_rfc3339(),
            "description": context.description,
            "remote_url": self.remote_access_url,
        });

        Ok(EscalationResponse::guidance(
            EscalationLevel::RemoteAccess,
            "Remote access prepared for human intervention",
        )
        .with_action(format!("Remote access URL: {url}"))
        .with_action("Context preserved for remote session")
        .with_action("System state captured")
        .with_update("remote_access_prepared", true)
        .with_update("access_info", access_info)
        .requiring_further_escalation(false))
    }
}

//! Strong remote model consultation

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use super::{GuidanceError, GuidanceProducer};
use crate::escalation::actions::extract_action_items;
use crate::escalation::state::{EscalationContext, EscalationLevel, EscalationResponse};
use crate::llm::{ChatClient, ChatMessage, ChatRequest};

const MAX_TOKENS: u32 = 2000;

/// Consults the strong model; `client` is `None` when no API key is configured.
pub struct StrongModelConsultant {
    client: Option<Arc<dyn ChatClient>>,
    model: String,
}

impl StrongModelConsultant {
    pub fn new(client: Option<Arc<dyn ChatClient>>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }
}

fn lines_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items.join("\n")
    }
}

pub(crate) fn consultation_prompt(context: &EscalationContext) -> String {
    format!(
        "ESCALATION CONSULTATION REQUEST\n\n\
         Agent: {agent}\n\
         Reason: {reason}\n\
         Time: {time}\n\n\
         PROBLEM DESCRIPTION:\n{description}\n\n\
         CURRENT TASK:\n{task}\n\n\
         FAILED ATTEMPTS: {attempts}\n\n\
         RECENT ERROR MESSAGES:\n{errors}\n\n\
         RECENT COMMANDS:\n{commands}\n\n\
         PROJECT GOALS:\n{goals}\n\n\
         PREVIOUS ESCALATIONS:\n{previous}\n\n\
         TIME SPENT: {elapsed}s\n\
         COMPLETION: {completion:.1}%\n\n\
         Please provide:\n\
         1. Root cause analysis\n\
         2. Specific step-by-step resolution guidance\n\
         3. Prevention strategies for similar issues\n\
         4. Estimated resolution time\n\
         5. Whether further escalation is needed\n\n\
         Focus on actionable, technical guidance that can get development back on track.",
        agent = context.agent_id,
        reason = context.reason,
        time = context.timestamp.to_rfc3339(),
        description = context.description,
        task = context.current_task.as_deref().unwrap_or("None specified"),
        attempts = context.failed_attempts,
        errors = lines_or_none(context.recent_errors(5)),
        commands = lines_or_none(context.last_commands(5)),
        goals = lines_or_none(&context.project_goals),
        previous = lines_or_none(&context.previous_escalations),
        elapsed = context.elapsed_seconds,
        completion = context.completion_percentage,
    )
}

#[async_trait]
impl GuidanceProducer for StrongModelConsultant {
    fn level(&self) -> EscalationLevel {
        EscalationLevel::StrongModelConsultation
    }

    async fn produce(
        &self,
        context: &EscalationContext,
    ) -> Result<EscalationResponse, GuidanceError> {
        let level = EscalationLevel::StrongModelConsultation;
        let Some(client) = &self.client else {
            return Ok(EscalationResponse::failure(
                level,
                "Strong model API not configured",
            )
            .with_action("Configure strong model API access (set ANTHROPIC_API_KEY)"));
        };

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(consultation_prompt(context))],
            temperature: 0.3,
            max_tokens: MAX_TOKENS,
        };

        match client.complete(&request).await {
            Ok(reply) => {
                info!(agent_id = %context.agent_id, model = %reply.model, "Strong model consultation completed");
                let action_items = extract_action_items(&reply.content);
                Ok(EscalationResponse::guidance(level, reply.content)
                    .with_action_items(action_items)
                    .with_update("strong_model_consultation_completed", true))
            }
            Err(e) => {
                error!(agent_id = %context.agent_id, endpoint = client.endpoint(), error = %e, "Strong model consultation failed");
                let remedy = if e.is_transport() {
                    format!("Check network access to {}", client.endpoint())
                } else {
                    "Check the strong model API key and quota".to_string()
                };
                Ok(EscalationResponse::failure(
                    level,
                    format!("Strong model consultation failed: {e}"),
                )
                .with_action(remedy)
                .with_action("Escalate to human"))
            }
        }
    }
}

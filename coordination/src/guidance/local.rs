//! Local small-model supervisor (LEO) over an OpenAI-compatible endpoint

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{
    Analysis, GuidanceError, GuidanceProducer, InteractionAnalyzer, InteractionSample,
    RuleBasedSupervisor, Verdict, VerdictSource,
};
use crate::escalation::actions::extract_action_items;
use crate::escalation::state::{EscalationContext, EscalationLevel, EscalationResponse};
use crate::llm::{ChatClient, ChatMessage, ChatRequest};

const SYSTEM_PROMPT: &str = "You are LEO, a local supervisor for autonomous coding agents. \
Keep agents on track with their project goals, spot dependency and code quality problems \
early, and escalate to a stronger model when a problem is beyond you. \
Be concise, direct, and answer in the JSON format you are asked for.";

const VERDICT_FORMAT: &str = r#"Respond with JSON: {"on_track": bool, "intervention_needed": bool, "guidance": str, "priority": "low|medium|high"}"#;

pub struct LocalModelSupervisor {
    client: Arc<dyn ChatClient>,
    model: String,
    fallback: RuleBasedSupervisor,
}

impl LocalModelSupervisor {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            fallback: RuleBasedSupervisor,
        }
    }

    fn request(&self, prompt: String, max_tokens: u32) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)],
            temperature: 0.3,
            max_tokens,
        }
    }
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "None".to_string();
    }
    items
        .iter()
        .map(|i| format!("- {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn escalation_prompt(context: &EscalationContext) -> String {
    format!(
        "An agent needs intervention.\n\
         Escalation reason: {}\n\
         Description: {}\n\
         Current task: {}\n\
         Failed attempts: {}\n\
         Recent errors:\n{}\n\
         Project goals:\n{}\n\n\
         Put numbered, concrete steps for the agent in the guidance field.\n\
         {VERDICT_FORMAT}",
        context.reason,
        context.description,
        context.current_task.as_deref().unwrap_or("None specified"),
        context.failed_attempts,
        bullet_list(context.recent_errors(5)),
        bullet_list(&context.project_goals),
    )
}

fn interaction_prompt(sample: &InteractionSample) -> String {
    format!(
        "Analyze this agent interaction:\n\
         Command: {}\n\
         Files Modified: {:?}\n\
         Current Goals: {:?}\n\n\
         Assess:\n\
         1. Is the agent staying on track with the goals?\n\
         2. Are there any dependency or code quality issues?\n\
         3. Should I intervene or provide guidance?\n\n\
         {VERDICT_FORMAT}",
        sample.command, sample.files_modified, sample.goals
    )
}

#[async_trait]
impl GuidanceProducer for LocalModelSupervisor {
    fn level(&self) -> EscalationLevel {
        EscalationLevel::LocalIntervention
    }

    async fn produce(
        &self,
        context: &EscalationContext,
    ) -> Result<EscalationResponse, GuidanceError> {
        let request = self.request(escalation_prompt(context), 800);
        let reply = match self.client.complete(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    agent_id = %context.agent_id,
                    endpoint = self.client.endpoint(),
                    error = %e,
                    "Local supervisor unavailable, using rule-based guidance"
                );
                return Ok(self
                    .fallback
                    .respond(context)
                    .with_update("local_model_unavailable", true)
                    .with_update("local_model_error", e.to_string()));
            }
        };

        let (verdict, source) = Verdict::parse_or_classify(&reply.content);
        debug!(agent_id = %context.agent_id, ?source, priority = %verdict.priority, "LEO verdict");

        let guidance = match source {
            VerdictSource::Parsed => verdict.guidance.clone(),
            VerdictSource::Fallback => reply.content.trim().to_string(),
        };
        let further = verdict.priority == super::Priority::High;

        Ok(EscalationResponse::guidance(EscalationLevel::LocalIntervention, guidance.clone())
            .with_action_items(extract_action_items(&guidance))
            .with_update("leo_intervention_attempted", true)
            .with_update("verdict_source", serde_json::to_value(source).unwrap_or_default())
            .with_verdict(verdict)
            .requiring_further_escalation(further))
    }
}

#[async_trait]
impl InteractionAnalyzer for LocalModelSupervisor {
    async fn analyze(&self, sample: &InteractionSample) -> Analysis {
        let request = self.request(interaction_prompt(sample), 500);
        match self.client.complete(&request).await {
            Ok(reply) => {
                let (verdict, source) = Verdict::parse_or_classify(&reply.content);
                if source == VerdictSource::Fallback {
                    let preview: String = reply.content.chars().take(100).collect();
                    warn!(preview = %preview, "LEO response not JSON, using keyword analysis");
                }
                Analysis {
                    verdict,
                    source,
                    reasoning: format!("LEO ({}) analyzed command", reply.model),
                }
            }
            Err(e) => {
                warn!(endpoint = self.client.endpoint(), error = %e, "Local supervisor unavailable for analysis");
                self.fallback.analyze_interaction(sample)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::state::{ContextSnapshot, EscalationReason};
    use crate::guidance::Priority;
    use crate::llm::{ChatError, ChatReply};

    enum Canned {
        Reply(&'static str),
        Refused,
    }

    struct FakeClient(Canned);

    #[async_trait]
    impl ChatClient for FakeClient {
        async fn complete(&self, request: &ChatRequest) -> crate::llm::Result<ChatReply> {
            match self.0 {
                Canned::Reply(text) => Ok(ChatReply {
                    content: text.to_string(),
                    model: request.model.clone(),
                }),
                Canned::Refused => Err(ChatError::Request("connection refused".into())),
            }
        }

        fn endpoint(&self) -> &str {
            "fake://local"
        }
    }

    fn supervisor(canned: Canned) -> LocalModelSupervisor {
        LocalModelSupervisor::new(Arc::new(FakeClient(canned)), "llama-3.1-8b")
    }

    fn context() -> EscalationContext {
        EscalationContext::new(
            "agent-1",
            EscalationLevel::LocalIntervention,
            EscalationReason::StuckOnTask,
            ContextSnapshot {
                error_messages: vec!["ImportError: no module named foo".into()],
                ..Default::default()
            },
            vec![],
        )
    }

    #[tokio::test]
    async fn test_json_verdict_drives_response() {
        let sup = supervisor(Canned::Reply(
            r#"{"on_track": false, "intervention_needed": true, "guidance": "1. Install foo\n2. Rerun", "priority": "medium"}"#,
        ));
        let resp = sup.produce(&context()).await.unwrap();
        assert!(resp.success);
        assert_eq!(resp.action_items, vec!["1. Install foo", "2. Rerun"]);
        assert!(!resp.requires_further_escalation);
        assert_eq!(resp.context_updates["verdict_source"], "parsed");
    }

    #[tokio::test]
    async fn test_prose_reply_uses_keyword_fallback() {
        let sup = supervisor(Canned::Reply("There is a problem.\n- Reinstall foo"));
        let resp = sup.produce(&context()).await.unwrap();
        assert_eq!(resp.context_updates["verdict_source"], "fallback");
        assert_eq!(resp.verdict.as_ref().map(|v| v.priority), Some(Priority::Medium));
        assert_eq!(resp.action_items, vec!["- Reinstall foo"]);
    }

    #[tokio::test]
    async fn test_high_priority_verdict_escalates() {
        let sup = supervisor(Canned::Reply(
            r#"{"on_track": false, "intervention_needed": true, "guidance": "beyond me", "priority": "high"}"#,
        ));
        let resp = sup.produce(&context()).await.unwrap();
        assert!(resp.requires_further_escalation);
    }

    #[tokio::test]
    async fn test_unreachable_model_falls_back_to_rules() {
        let resp = supervisor(Canned::Refused).produce(&context()).await.unwrap();
        assert!(resp.success);
        assert_eq!(resp.context_updates["local_model_unavailable"], true);
        assert!(resp.guidance.starts_with("LEO guidance (stuck_on_task)"));
    }

    #[tokio::test]
    async fn test_analysis_fallback_when_unreachable() {
        let sample = InteractionSample {
            command: "cargo test".into(),
            output: "error[E0308]: mismatched types".into(),
            recent_commands: vec!["cargo test".into()],
            ..Default::default()
        };
        let a = supervisor(Canned::Refused).analyze(&sample).await;
        assert_eq!(a.verdict.priority, Priority::Medium);
    }

    #[test]
    fn test_interaction_prompt_requests_json() {
        let sample = InteractionSample {
            command: "npm test".into(),
            goals: vec!["green CI".into()],
            ..Default::default()
        };
        let prompt = interaction_prompt(&sample);
        assert!(prompt.contains("npm test"));
        assert!(prompt.contains("green CI"));
        assert!(prompt.contains("\"priority\""));
    }
}

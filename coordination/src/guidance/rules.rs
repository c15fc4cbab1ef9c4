//! Deterministic rule-based supervisor
//!
//! Stands in for the local model when none is configured and serves as the
//! fallback whenever the local endpoint is unreachable.

use async_trait::async_trait;

use super::{
    Analysis, GuidanceError, GuidanceProducer, InteractionAnalyzer, InteractionSample, Priority,
    Verdict, VerdictSource,
};
use crate::escalation::actions::extract_action_items;
use crate::escalation::state::{
    EscalationContext, EscalationLevel, EscalationReason, EscalationResponse,
};

const OUTPUT_ERROR_INDICATORS: [&str; 5] = ["error", "failed", "exception", "traceback", "timeout"];
const DEPENDENCY_INSTALL_COMMANDS: [&str; 7] = [
    "pip install",
    "npm install",
    "yarn add",
    "poetry add",
    "cargo add",
    "apt-get install",
    "go get",
];
const REPEAT_WINDOW: usize = 3;
const MANY_FILES: usize = 5;

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedSupervisor;

impl RuleBasedSupervisor {
    pub fn new() -> Self {
        Self
    }

    /// Passive verdict for a single interaction.
    pub fn analyze_interaction(&self, sample: &InteractionSample) -> Analysis {
        let output = sample.output.to_lowercase();
        let mut verdict = Verdict::default();

        if OUTPUT_ERROR_INDICATORS.iter().any(|i| output.contains(i)) {
            verdict.on_track = false;
            verdict.intervention_needed = true;
            verdict.priority = Priority::Medium;
            verdict.guidance = "Error detected. Check logs and retry with different approach.".to_string();
        }

        if is_repeating(&sample.recent_commands) {
            verdict.on_track = false;
            verdict.intervention_needed = true;
            verdict.priority = Priority::High;
            verdict.guidance = "Repetitive command detected. Try alternative approach or escalate.".to_string();
        }

        let command = sample.command.to_lowercase();
        if DEPENDENCY_INSTALL_COMMANDS.iter().any(|c| command.contains(c)) && output.contains("error") {
            verdict.intervention_needed = true;
            verdict.priority = Priority::Medium;
            verdict.guidance = "Dependency installation issue. Check package availability and version compatibility.".to_string();
        }

        if sample.files_modified.len() > MANY_FILES {
            verdict
                .guidance
                .push_str(" Consider breaking down the task into smaller chunks.");
        }

        Analysis {
            verdict,
            source: VerdictSource::Parsed,
            reasoning: format!(
                "Analyzed command '{}' and output patterns",
                truncate(&sample.command, 50)
            ),
        }
    }

    /// Verdict for an escalation context.
    pub fn escalation_verdict(&self, context: &EscalationContext) -> Verdict {
        let classified = Verdict::classify_text(&context.error_messages.join(" "));
        let priority = if context.reason.is_severe() {
            Priority::High
        } else if classified.intervention_needed {
            Priority::Medium
        } else {
            Priority::Low
        };

        Verdict {
            on_track: priority == Priority::Low,
            intervention_needed: true,
            guidance: guidance_text(context),
            priority,
        }
    }

    /// Full local-intervention response; asks for further escalation when
    /// the verdict is high priority.
    pub fn respond(&self, context: &EscalationContext) -> EscalationResponse {
        let verdict = self.escalation_verdict(context);
        let further = verdict.priority == Priority::High;
        EscalationResponse::guidance(EscalationLevel::LocalIntervention, verdict.guidance.clone())
            .with_action_items(extract_action_items(&verdict.guidance))
            .with_update("leo_intervention_attempted", true)
            .with_verdict(verdict)
            .requiring_further_escalation(further)
    }
}

fn is_repeating(recent_commands: &[String]) -> bool {
    if recent_commands.len() < REPEAT_WINDOW {
        return false;
    }
    let window = &recent_commands[recent_commands.len() - REPEAT_WINDOW..];
    window.iter().all(|c| c == &window[0])
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn guidance_text(context: &EscalationContext) -> String {
    let task = context.current_task.as_deref().unwrap_or("current task");
    let latest_error = context
        .error_messages
        .last()
        .map(|e| truncate(e, 200))
        .unwrap_or_else(|| "none recorded".to_string());

    let steps = match context.reason {
        EscalationReason::StuckOnTask => format!(
            "1. Re-read the requirements for '{task}' and the last error in full\n\
             2. Reduce the task to the smallest step that still fails\n\
             3. Try a different approach instead of repeating the last fix"
        ),
        EscalationReason::RepeatedFailures => format!(
            "1. Stop retrying the same command\n\
             2. Diagnose the latest error: {latest_error}\n\
             3. Verify the environment (paths, services, permissions) before the next attempt"
        ),
        EscalationReason::DependencyIssues => "1. Check package availability and version compatibility\n\
             2. Pin the failing dependency to a known-good version\n\
             3. Reinstall dependencies in a clean environment"
            .to_string(),
        EscalationReason::GoalDrift => {
            let goals = if context.project_goals.is_empty() {
                "none specified".to_string()
            } else {
                context.project_goals.join("; ")
            };
            format!(
                "1. Re-read the project goals: {goals}\n\
                 2. Revert changes that do not serve those goals\n\
                 3. Resume '{task}' with a narrower scope"
            )
        }
        EscalationReason::TimeoutExceeded => format!(
            "1. Checkpoint the progress made on '{task}'\n\
             2. Split the remaining work into smaller tasks\n\
             3. Pick the smallest task and finish it before continuing"
        ),
        EscalationReason::CriticalError | EscalationReason::SystemInstability => format!(
            "1. Stop making changes\n\
             2. Capture the full error output and system state: {latest_error}\n\
             3. Hand the problem to a stronger reviewer"
        ),
    };

    format!("LEO guidance ({}): {}\n{steps}", context.reason, context.description)
}

#[async_trait]
impl GuidanceProducer for RuleBasedSupervisor {
    fn level(&self) -> EscalationLevel {
        EscalationLevel::LocalIntervention
    }

    async fn produce(
        &self,
        context: &EscalationContext,
    ) -> Result<EscalationResponse, GuidanceError> {
        Ok(self.respond(context))
    }
}

#[async_trait]
impl InteractionAnalyzer for RuleBasedSupervisor {
    async fn analyze(&self, sample: &InteractionSample) -> Analysis {
        self.analyze_interaction(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::state::ContextSnapshot;

    fn sample(command: &str, output: &str) -> InteractionSample {
        InteractionSample {
            command: command.to_string(),
            output: output.to_string(),
            recent_commands: vec![command.to_string()],
            ..Default::default()
        }
    }

    fn context(reason: EscalationReason, errors: &[&str]) -> EscalationContext {
        let snapshot = ContextSnapshot {
            current_task: Some("add login form".to_string()),
            error_messages: errors.iter().map(|e| e.to_string()).collect(),
            project_goals: vec!["ship auth".to_string()],
            ..Default::default()
        };
        EscalationContext::new("agent-1", EscalationLevel::LocalIntervention, reason, snapshot, vec![])
    }

    #[test]
    fn test_clean_interaction_is_on_track() {
        let a = RuleBasedSupervisor.analyze_interaction(&sample("ls", "src tests"));
        assert!(a.verdict.on_track);
        assert_eq!(a.verdict.priority, Priority::Low);
        assert!(a.verdict.actions().is_empty());
    }

    #[test]
    fn test_output_error_is_medium() {
        let a = RuleBasedSupervisor.analyze_interaction(&sample("pytest", "Traceback (most recent call last)"));
        assert!(!a.verdict.on_track);
        assert_eq!(a.verdict.priority, Priority::Medium);
    }

    #[test]
    fn test_repeated_command_is_high() {
        let mut s = sample("make build", "ok");
        s.recent_commands = vec!["make build".into(); 3];
        let a = RuleBasedSupervisor.analyze_interaction(&s);
        assert_eq!(a.verdict.priority, Priority::High);
        assert!(a.verdict.signals_drift());
    }

    #[test]
    fn test_two_repeats_are_not_enough() {
        let mut s = sample("make build", "ok");
        s.recent_commands = vec!["make build".into(); 2];
        assert!(RuleBasedSupervisor.analyze_interaction(&s).verdict.on_track);
    }

    #[test]
    fn test_dependency_install_error() {
        let a = RuleBasedSupervisor
            .analyze_interaction(&sample("pip install torch==9.9", "ERROR: No matching distribution"));
        assert_eq!(a.verdict.priority, Priority::Medium);
        assert!(a.verdict.guidance.starts_with("Dependency installation issue"));
    }

    #[test]
    fn test_many_files_appends_breakdown_hint() {
        let mut s = sample("edit", "done");
        s.files_modified = (0..6).map(|i| format!("f{i}.rs")).collect();
        let a = RuleBasedSupervisor.analyze_interaction(&s);
        assert!(a.verdict.guidance.ends_with("smaller chunks."));
    }

    #[test]
    fn test_escalation_response_has_numbered_steps() {
        let resp = RuleBasedSupervisor.respond(&context(
            EscalationReason::RepeatedFailures,
            &["TypeError: x is undefined"],
        ));
        assert!(resp.success);
        assert_eq!(resp.level, EscalationLevel::LocalIntervention);
        assert_eq!(resp.action_items.len(), 3);
        assert!(resp.action_items[1].contains("TypeError"));
        assert_eq!(resp.estimated_resolution_time.as_deref(), Some("5-15 minutes"));
        assert_eq!(resp.verdict.as_ref().map(|v| v.priority), Some(Priority::Medium));
        assert!(!resp.requires_further_escalation);
        assert_eq!(resp.context_updates["leo_intervention_attempted"], true);
    }

    #[test]
    fn test_severe_reason_requests_further_escalation() {
        let resp = RuleBasedSupervisor.respond(&context(EscalationReason::CriticalError, &["fatal"]));
        assert!(resp.requires_further_escalation);
        assert_eq!(resp.verdict.map(|v| v.priority), Some(Priority::High));
    }

    #[test]
    fn test_goal_drift_mentions_goals() {
        let resp = RuleBasedSupervisor.respond(&context(EscalationReason::GoalDrift, &[]));
        assert!(resp.guidance.contains("ship auth"));
        assert_eq!(resp.verdict.map(|v| v.priority), Some(Priority::Low));
    }
}

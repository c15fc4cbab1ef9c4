//! Escalation state: levels, reasons, contexts and tier responses

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::guidance::Verdict;

/// Guidance tiers in the supervision hierarchy, ordered by cost/capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    /// Passive observation, no dispatch
    LocalMonitoring,
    /// Local supervisor (LEO) intervenes; first-line, cheapest tier
    LocalIntervention,
    /// Strong remote model consultation
    StrongModelConsultation,
    /// Human operator notified
    HumanRequired,
    /// Remote access prepared for a human session; the ladder ends here
    RemoteAccess,
}

impl EscalationLevel {
    /// All levels in ladder order
    pub const ALL: [EscalationLevel; 5] = [
        Self::LocalMonitoring,
        Self::LocalIntervention,
        Self::StrongModelConsultation,
        Self::HumanRequired,
        Self::RemoteAccess,
    ];

    /// The next tier up the ladder, if any
    pub fn next(&self) -> Option<EscalationLevel> {
        match self {
            Self::LocalMonitoring => Some(Self::LocalIntervention),
            Self::LocalIntervention => Some(Self::StrongModelConsultation),
            Self::StrongModelConsultation => Some(Self::HumanRequired),
            Self::HumanRequired => Some(Self::RemoteAccess),
            Self::RemoteAccess => None,
        }
    }

    /// Fixed estimate of how long guidance at this tier takes to land
    pub fn estimated_resolution_time(&self) -> &'static str {
        match self {
            Self::LocalMonitoring | Self::LocalIntervention => "5-15 minutes",
            Self::StrongModelConsultation => "15-30 minutes",
            Self::HumanRequired => "Variable - awaiting human response",
            Self::RemoteAccess => "Variable - manual intervention",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalMonitoring => "local_monitoring",
            Self::LocalIntervention => "local_intervention",
            Self::StrongModelConsultation => "strong_model_consultation",
            Self::HumanRequired => "human_required",
            Self::RemoteAccess => "remote_access",
        }
    }
}

impl std::fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an escalation was proposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// Failed attempts on the current task reached the threshold
    StuckOnTask,
    /// Consecutive failed interactions reached the threshold
    RepeatedFailures,
    /// Dependency-related errors reached the threshold
    DependencyIssues,
    /// Agent drifted away from the project goals
    GoalDrift,
    /// Time on task exceeded the limit
    TimeoutExceeded,
    /// A critical keyword showed up in recent errors
    CriticalError,
    /// Host or tooling instability
    SystemInstability,
}

impl EscalationReason {
    pub const ALL: [EscalationReason; 7] = [
        Self::StuckOnTask,
        Self::RepeatedFailures,
        Self::DependencyIssues,
        Self::GoalDrift,
        Self::TimeoutExceeded,
        Self::CriticalError,
        Self::SystemInstability,
    ];

    /// Reasons that skip local intervention entirely
    pub fn is_severe(&self) -> bool {
        matches!(self, Self::CriticalError | Self::SystemInstability)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StuckOnTask => "stuck_on_task",
            Self::RepeatedFailures => "repeated_failures",
            Self::DependencyIssues => "dependency_issues",
            Self::GoalDrift => "goal_drift",
            Self::TimeoutExceeded => "timeout_exceeded",
            Self::CriticalError => "critical_error",
            Self::SystemInstability => "system_instability",
        }
    }
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent-side facts captured when a trigger fires.
///
/// Built by the agent monitor from its interaction history; the coordinator
/// copies it into the [`EscalationContext`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub current_task: Option<String>,
    pub failed_attempts: u32,
    pub consecutive_failures: u32,
    pub error_messages: Vec<String>,
    pub recent_commands: Vec<String>,
    pub modified_files: Vec<String>,
    pub project_goals: Vec<String>,
    pub elapsed_seconds: u64,
    pub completion_percentage: f64,
    #[serde(default)]
    pub system_state: Map<String, Value>,
    #[serde(default)]
    pub resource_usage: Map<String, Value>,
    #[serde(default)]
    pub resolution_attempts: Vec<String>,
}

/// Complete context for one escalation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationContext {
    pub escalation_id: String,
    pub agent_id: String,
    pub level: EscalationLevel,
    pub reason: EscalationReason,
    pub timestamp: DateTime<Utc>,
    pub description: String,

    // Technical context
    pub current_task: Option<String>,
    pub failed_attempts: u32,
    pub error_messages: Vec<String>,
    pub recent_commands: Vec<String>,
    pub modified_files: Vec<String>,

    // Project context
    pub project_goals: Vec<String>,
    pub elapsed_seconds: u64,
    pub completion_percentage: f64,

    // System context
    pub system_state: Map<String, Value>,
    pub resource_usage: Map<String, Value>,

    // Previous escalations
    pub previous_escalations: Vec<String>,
    pub resolution_attempts: Vec<String>,
    /// Local supervisor interventions already attempted in this cycle
    pub local_intervention_attempts: u32,
}

impl EscalationContext {
    /// Build a context for a reason the trigger evaluator produced.
    pub(crate) fn new(
        agent_id: &str,
        level: EscalationLevel,
        reason: EscalationReason,
        snapshot: ContextSnapshot,
        previous_escalations: Vec<String>,
    ) -> Self {
        let description = describe(reason, &snapshot);
        Self {
            escalation_id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            level,
            reason,
            timestamp: Utc::now(),
            description,
            current_task: snapshot.current_task,
            failed_attempts: snapshot.failed_attempts,
            error_messages: snapshot.error_messages,
            recent_commands: snapshot.recent_commands,
            modified_files: snapshot.modified_files,
            project_goals: snapshot.project_goals,
            elapsed_seconds: snapshot.elapsed_seconds,
            completion_percentage: snapshot.completion_percentage,
            system_state: snapshot.system_state,
            resource_usage: snapshot.resource_usage,
            previous_escalations,
            resolution_attempts: snapshot.resolution_attempts,
            local_intervention_attempts: 0,
        }
    }

    /// Time spent on the task, saturating at `Duration::MAX`
    pub fn time_spent(&self) -> Duration {
        i64::try_from(self.elapsed_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }

    /// Last `n` error messages, oldest first
    pub fn recent_errors(&self, n: usize) -> &[String] {
        tail(&self.error_messages, n)
    }

    /// Last `n` commands, oldest first
    pub fn last_commands(&self, n: usize) -> &[String] {
        tail(&self.recent_commands, n)
    }

    /// One-line summary used in history and prompts
    pub fn summary(&self) -> String {
        format!(
            "agent={} level={} reason={} failed_attempts={} elapsed={}s",
            self.agent_id, self.level, self.reason, self.failed_attempts, self.elapsed_seconds
        )
    }
}

fn tail(items: &[String], n: usize) -> &[String] {
    &items[items.len().saturating_sub(n)..]
}

/// Human-readable description of why the escalation fired
fn describe(reason: EscalationReason, snapshot: &ContextSnapshot) -> String {
    match reason {
        EscalationReason::StuckOnTask => format!(
            "Agent stuck on task '{}' after {} attempts",
            snapshot.current_task.as_deref().unwrap_or("unknown"),
            snapshot.failed_attempts
        ),
        EscalationReason::RepeatedFailures => format!(
            "Agent experiencing {} consecutive failures",
            snapshot.consecutive_failures
        ),
        EscalationReason::DependencyIssues => {
            "Multiple dependency errors preventing progress".to_string()
        }
        EscalationReason::GoalDrift => "Agent has drifted from project goals".to_string(),
        EscalationReason::TimeoutExceeded => {
            format!("Task timeout exceeded ({}s)", snapshot.elapsed_seconds)
        }
        EscalationReason::CriticalError => "Critical system error detected".to_string(),
        EscalationReason::SystemInstability => "System instability detected".to_string(),
    }
}

/// Response from one guidance tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationResponse {
    pub level: EscalationLevel,
    pub success: bool,
    pub guidance: String,
    /// Ordered, at most ten items
    pub action_items: Vec<String>,
    pub estimated_resolution_time: Option<String>,
    pub requires_further_escalation: bool,
    /// Merged back into the active escalation entry
    #[serde(default)]
    pub context_updates: Map<String, Value>,
    /// Structured verdict when the tier produced one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
}

impl EscalationResponse {
    /// Successful guidance with the tier's fixed time estimate
    pub fn guidance(level: EscalationLevel, guidance: impl Into<String>) -> Self {
        Self {
            level,
            success: true,
            guidance: guidance.into(),
            action_items: Vec::new(),
            estimated_resolution_time: Some(level.estimated_resolution_time().to_string()),
            requires_further_escalation: false,
            context_updates: Map::new(),
            verdict: None,
        }
    }

    /// Failed tier that hands the problem further up the ladder
    pub fn failure(level: EscalationLevel, guidance: impl Into<String>) -> Self {
        Self {
            level,
            success: false,
            guidance: guidance.into(),
            action_items: Vec::new(),
            estimated_resolution_time: None,
            requires_further_escalation: true,
            context_updates: Map::new(),
            verdict: None,
        }
    }

    pub fn with_action_items(mut self, items: Vec<String>) -> Self {
        self.action_items = items;
        self.action_items.truncate(crate::escalation::actions::MAX_ACTION_ITEMS);
        self
    }

    pub fn with_action(mut self, item: impl Into<String>) -> Self {
        if self.action_items.len() < crate::escalation::actions::MAX_ACTION_ITEMS {
            self.action_items.push(item.into());
        }
        self
    }

    pub fn with_update(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context_updates.insert(key.to_string(), value.into());
        self
    }

    pub fn with_verdict(mut self, verdict: Verdict) -> Self {
        self.verdict = Some(verdict);
        self
    }

    pub fn requiring_further_escalation(mut self, further: bool) -> Self {
        self.requires_further_escalation = further;
        self
    }
}

/// Outcome of a history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Dispatched,
    Resolved { notes: String },
}

/// Record of an escalation event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub escalation_id: String,
    pub agent_id: String,
    pub level: EscalationLevel,
    pub reason: EscalationReason,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    #[serde(flatten)]
    pub outcome: RecordOutcome,
}

impl EscalationRecord {
    pub fn dispatched(context: &EscalationContext) -> Self {
        Self {
            escalation_id: context.escalation_id.clone(),
            agent_id: context.agent_id.clone(),
            level: context.level,
            reason: context.reason,
            timestamp: context.timestamp,
            description: context.description.clone(),
            outcome: RecordOutcome::Dispatched,
        }
    }

    pub fn resolved(context: &EscalationContext, notes: &str) -> Self {
        Self {
            escalation_id: context.escalation_id.clone(),
            agent_id: context.agent_id.clone(),
            level: context.level,
            reason: context.reason,
            timestamp: Utc::now(),
            description: context.description.clone(),
            outcome: RecordOutcome::Resolved {
                notes: notes.to_string(),
            },
        }
    }

    pub fn is_dispatch(&self) -> bool {
        self.outcome == RecordOutcome::Dispatched
    }

    /// `"<timestamp>: <reason>"` as embedded in prompts
    pub fn prompt_line(&self) -> String {
        format!("{}: {}", self.timestamp.to_rfc3339(), self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ladder_order() {
        assert!(EscalationLevel::LocalIntervention < EscalationLevel::StrongModelConsultation);
        assert!(EscalationLevel::HumanRequired < EscalationLevel::RemoteAccess);
        assert_eq!(
            EscalationLevel::LocalIntervention.next(),
            Some(EscalationLevel::StrongModelConsultation)
        );
        assert_eq!(EscalationLevel::RemoteAccess.next(), None);
    }

    #[test]
    fn test_reason_serialization() {
        let json = serde_json::to_string(&EscalationReason::RepeatedFailures).unwrap();
        assert_eq!(json, "\"repeated_failures\"");
        assert_eq!(EscalationReason::CriticalError.to_string(), "critical_error");
    }

    #[test]
    fn test_description_mentions_task() {
        let snapshot = ContextSnapshot {
            current_task: Some("wire up auth".to_string()),
            failed_attempts: 3,
            ..Default::default()
        };
        let ctx = EscalationContext::new(
            "agent-1",
            EscalationLevel::LocalIntervention,
            EscalationReason::StuckOnTask,
            snapshot,
            vec![],
        );
        assert_eq!(
            ctx.description,
            "Agent stuck on task 'wire up auth' after 3 attempts"
        );
        assert_eq!(ctx.local_intervention_attempts, 0);
    }

    #[test]
    fn test_recent_errors_keeps_tail() {
        let snapshot = ContextSnapshot {
            error_messages: (0..8).map(|i| format!("e{i}")).collect(),
            ..Default::default()
        };
        let ctx = EscalationContext::new(
            "a",
            EscalationLevel::StrongModelConsultation,
            EscalationReason::RepeatedFailures,
            snapshot,
            vec![],
        );
        assert_eq!(ctx.recent_errors(5), &["e3", "e4", "e5", "e6", "e7"]);
        assert_eq!(ctx.last_commands(5).len(), 0);
    }

    #[test]
    fn test_time_spent_saturates() {
        let snapshot = ContextSnapshot {
            elapsed_seconds: u64::MAX,
            ..Default::default()
        };
        let ctx = EscalationContext::new(
            "a",
            EscalationLevel::LocalIntervention,
            EscalationReason::TimeoutExceeded,
            snapshot,
            vec![],
        );
        assert_eq!(ctx.time_spent(), Duration::MAX);

        let mut ctx = ctx;
        ctx.elapsed_seconds = 90;
        assert_eq!(ctx.time_spent().num_seconds(), 90);
    }

    #[test]
    fn test_response_action_items_capped() {
        let items = (0..25).map(|i| format!("{i}. step")).collect();
        let resp = EscalationResponse::guidance(EscalationLevel::LocalIntervention, "g")
            .with_action_items(items)
            .with_action("one more");
        assert_eq!(resp.action_items.len(), 10);
        assert_eq!(resp.estimated_resolution_time.as_deref(), Some("5-15 minutes"));
    }

    #[test]
    fn test_record_outcome_flattened() {
        let ctx = EscalationContext::new(
            "a",
            EscalationLevel::LocalIntervention,
            EscalationReason::GoalDrift,
            ContextSnapshot::default(),
            vec![],
        );
        let rec = EscalationRecord::resolved(&ctx, "fixed manually");
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"outcome\":\"resolved\""), "JSON: {json}");
        assert!(json.contains("fixed manually"));
        assert!(!rec.is_dispatch());
    }
}

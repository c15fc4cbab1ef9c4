//! Trigger evaluation: maps interaction counters to an escalation reason
//!
//! Pure and deterministic: the same counters always yield the same reason.
//! Checks run in severity order and the first match wins.

use serde::{Deserialize, Serialize};

use crate::escalation::state::EscalationReason;

/// Counters derived from an agent's recent interaction history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerCounters {
    /// Trailing run of failed interactions
    pub consecutive_failures: u32,
    /// Failed attempts on the current task
    pub failed_attempts: u32,
    /// Seconds spent on the current task
    pub elapsed_seconds: u64,
    /// Set when the supervisor or caller detected drift from the goals
    pub goal_drift_detected: bool,
    /// Dependency-related errors in the recent window
    pub dependency_errors: u32,
    /// Recent error message text
    pub error_messages: Vec<String>,
}

/// Configurable thresholds for the trigger evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerThresholds {
    /// `consecutive_failures >=` this → repeated failures
    pub consecutive_failures: u32,
    /// `failed_attempts >=` this → stuck on task
    pub failed_attempts: u32,
    /// `elapsed_seconds >` this → timeout exceeded
    pub timeout_secs: u64,
    /// `dependency_errors >=` this → dependency issues
    pub dependency_errors: u32,
    /// Case-insensitive keywords that mark an error as critical
    pub critical_keywords: Vec<String>,
}

impl Default for TriggerThresholds {
    fn default() -> Self {
        Self {
            consecutive_failures: 5,
            failed_attempts: 3,
            timeout_secs: 3600,
            dependency_errors: 2,
            critical_keywords: ["fatal", "critical", "corruption", "segfault", "memory"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

/// Stateless evaluator over [`TriggerCounters`]
#[derive(Debug, Clone, Default)]
pub struct TriggerEvaluator {
    thresholds: TriggerThresholds,
}

impl TriggerEvaluator {
    pub fn new(thresholds: TriggerThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &TriggerThresholds {
        &self.thresholds
    }

    /// Propose an escalation reason, or `None` when nothing fired.
    pub fn evaluate(&self, counters: &TriggerCounters) -> Option<EscalationReason> {
        let t = &self.thresholds;

        if counters.consecutive_failures >= t.consecutive_failures {
            return Some(EscalationReason::RepeatedFailures);
        }

        if counters.failed_attempts >= t.failed_attempts {
            return Some(EscalationReason::StuckOnTask);
        }

        if counters.elapsed_seconds > t.timeout_secs {
            return Some(EscalationReason::TimeoutExceeded);
        }

        if self.critical_keyword(&counters.error_messages).is_some() {
            return Some(EscalationReason::CriticalError);
        }

        if counters.goal_drift_detected {
            return Some(EscalationReason::GoalDrift);
        }

        if counters.dependency_errors >= t.dependency_errors {
            return Some(EscalationReason::DependencyIssues);
        }

        None
    }

    /// First critical keyword found in the joined error text
    pub fn critical_keyword(&self, error_messages: &[String]) -> Option<&str> {
        if error_messages.is_empty() {
            return None;
        }
        let joined = normalize_error_text(&error_messages.join(" "));
        self.thresholds
            .critical_keywords
            .iter()
            .find(|k| joined.contains(&k.to_lowercase()))
            .map(|k| k.as_str())
    }
}

/// Long-form spellings folded onto their keyword before matching
const KEYWORD_ALIASES: &[(&str, &str)] = &[
    ("segmentation fault", "segfault"),
    ("segmentation violation", "segfault"),
    ("sigsegv", "segfault"),
];

fn normalize_error_text(text: &str) -> String {
    let mut lowered = text.to_lowercase();
    for (long, short) in KEYWORD_ALIASES {
        if lowered.contains(long) {
            lowered = lowered.replace(long, short);
        }
    }
    lowered
}

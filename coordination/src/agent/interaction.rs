//! Interaction records and the trigger counters derived from them

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::escalation::triggers::TriggerCounters;
use crate::guidance::Analysis;

/// Failed interactions scanned for dependency errors
const DEPENDENCY_WINDOW: usize = 10;
/// Failed outputs kept as error messages
const ERROR_MESSAGES: usize = 5;
const ERROR_MESSAGE_CHARS: usize = 500;

const DEPENDENCY_MARKERS: [&str; 12] = [
    "modulenotfounderror",
    "no module named",
    "importerror",
    "cannot find module",
    "could not resolve",
    "unresolved import",
    "no matching distribution",
    "package not found",
    "version conflict",
    "eresolve",
    "failed to select a version",
    "dependency",
];

/// One agent action. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: String,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub output: String,
    pub files_modified: Vec<String>,
    pub success: bool,
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Passive supervisor verdict, when monitoring was enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Analysis>,
}

impl InteractionRecord {
    pub fn mentions_dependency_error(&self) -> bool {
        let output = self.output.to_lowercase();
        DEPENDENCY_MARKERS.iter().any(|m| output.contains(m))
    }

    fn drift_flagged(&self) -> bool {
        let from_context = self
            .context
            .get("goal_drift_detected")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let from_verdict = self
            .analysis
            .as_ref()
            .is_some_and(|a| a.verdict.signals_drift());
        from_context || from_verdict
    }
}

/// Where the current unit of work began
#[derive(Debug, Clone, Copy)]
pub struct WorkStart {
    /// Start of the in-progress task, if any
    pub task_started: Option<DateTime<Utc>>,
    pub session_started: DateTime<Utc>,
}

/// Derive trigger counters from the interaction ring.
///
/// Only the latest interaction contributes the drift flag.
pub fn derive_counters(
    interactions: &VecDeque<InteractionRecord>,
    start: WorkStart,
    now: DateTime<Utc>,
) -> TriggerCounters {
    let consecutive_failures = interactions.iter().rev().take_while(|i| !i.success).count() as u32;

    let failed_attempts = match start.task_started {
        Some(started) => interactions
            .iter()
            .filter(|i| !i.success && i.timestamp >= started)
            .count(),
        None => interactions.iter().rev().take_while(|i| !i.success).count(),
    } as u32;

    let elapsed_seconds = (now - start.task_started.unwrap_or(start.session_started))
        .num_seconds()
        .max(0) as u64;

    let dependency_errors = interactions
        .iter()
        .rev()
        .take(DEPENDENCY_WINDOW)
        .filter(|i| !i.success && i.mentions_dependency_error())
        .count() as u32;

    TriggerCounters {
        consecutive_failures,
        failed_attempts,
        elapsed_seconds,
        goal_drift_detected: interactions.back().is_some_and(InteractionRecord::drift_flagged),
        dependency_errors,
        error_messages: recent_errors(interactions),
    }
}

/// Outputs of the last five failed interactions, oldest first
pub fn recent_errors(interactions: &VecDeque<InteractionRecord>) -> Vec<String> {
    let mut errors: Vec<String> = interactions
        .iter()
        .rev()
        .filter(|i| !i.success)
        .take(ERROR_MESSAGES)
        .map(|i| i.output.chars().take(ERROR_MESSAGE_CHARS).collect())
        .collect();
    errors.reverse();
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guidance::{Priority, Verdict, VerdictSource};
    use chrono::Duration;

    fn record(success: bool, output: &str, at: DateTime<Utc>) -> InteractionRecord {
        InteractionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: "a".into(),
            timestamp: at,
            command: "cmd".into(),
            output: output.into(),
            files_modified: vec![],
            success,
            context: Map::new(),
            analysis: None,
        }
    }

    fn ring(records: Vec<InteractionRecord>) -> VecDeque<InteractionRecord> {
        records.into_iter().collect()
    }

    #[test]
    fn test_trailing_failures_only() {
        let now = Utc::now();
        let r = ring(vec![
            record(false, "e", now),
            record(true, "ok", now),
            record(false, "e1", now),
            record(false, "e2", now),
        ]);
        let start = WorkStart {
            task_started: None,
            session_started: now - Duration::seconds(90),
        };
        let c = derive_counters(&r, start, now);
        assert_eq!(c.consecutive_failures, 2);
        assert_eq!(c.failed_attempts, 2);
        assert_eq!(c.elapsed_seconds, 90);
        assert_eq!(c.error_messages, vec!["e", "e1", "e2"]);
    }

    #[test]
    fn test_failed_attempts_since_task_start() {
        let now = Utc::now();
        let started = now - Duration::seconds(10);
        let r = ring(vec![
            record(false, "before", now - Duration::seconds(60)),
            record(false, "during", now - Duration::seconds(5)),
            record(true, "ok", now - Duration::seconds(4)),
            record(false, "again", now - Duration::seconds(3)),
        ]);
        let start = WorkStart {
            task_started: Some(started),
            session_started: now - Duration::seconds(600),
        };
        let c = derive_counters(&r, start, now);
        assert_eq!(c.failed_attempts, 2);
        assert_eq!(c.consecutive_failures, 1);
        assert_eq!(c.elapsed_seconds, 10);
    }

    #[test]
    fn test_dependency_errors_in_window() {
        let now = Utc::now();
        let mut records = vec![record(false, "ModuleNotFoundError: x", now)];
        records.extend((0..10).map(|_| record(true, "ok", now)));
        records.push(record(false, "npm ERR! ERESOLVE unable to resolve", now));
        records.push(record(false, "No matching distribution found for foo", now));
        let start = WorkStart {
            task_started: None,
            session_started: now,
        };
        assert_eq!(derive_counters(&ring(records), start, now).dependency_errors, 2);
    }

    #[test]
    fn test_drift_from_context_or_verdict() {
        let now = Utc::now();
        let start = WorkStart {
            task_started: None,
            session_started: now,
        };

        let mut flagged = record(true, "ok", now);
        flagged
            .context
            .insert("goal_drift_detected".into(), Value::Bool(true));
        assert!(derive_counters(&ring(vec![flagged]), start, now).goal_drift_detected);

        let mut judged = record(true, "ok", now);
        judged.analysis = Some(Analysis {
            verdict: Verdict {
                on_track: false,
                intervention_needed: true,
                guidance: "off course".into(),
                priority: Priority::High,
            },
            source: VerdictSource::Parsed,
            reasoning: String::new(),
        });
        assert!(derive_counters(&ring(vec![judged]), start, now).goal_drift_detected);

        assert!(!derive_counters(&ring(vec![record(true, "ok", now)]), start, now).goal_drift_detected);
    }

    #[test]
    fn test_error_messages_truncated_and_capped() {
        let now = Utc::now();
        let long = "x".repeat(2000);
        let records = (0..8).map(|_| record(false, &long, now)).collect();
        let errors = recent_errors(&ring(records));
        assert_eq!(errors.len(), 5);
        assert_eq!(errors[0].len(), 500);
    }
}

//! Supervisor activity log
//!
//! Every monitoring pass, decision, intervention and escalation is recorded
//! three ways: a `tracing` event, a bounded in-memory ring for status reads,
//! and an optional append-only text file. Sink failures are logged and
//! swallowed; logging never fails the caller.

pub mod status;

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

pub use status::{Decision, PerformanceCounters, StatusSummary, SupervisorStatus};

pub const DEFAULT_ACTIVITY_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Thinking,
    Monitoring,
    Decision,
    Guidance,
    Intervention,
    Escalation,
    Resolution,
    Success,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thinking => "thinking",
            Self::Monitoring => "monitoring",
            Self::Decision => "decision",
            Self::Guidance => "guidance",
            Self::Intervention => "intervention",
            Self::Escalation => "escalation",
            Self::Resolution => "resolution",
            Self::Success => "success",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub timestamp: DateTime<Utc>,
    pub kind: ActivityKind,
    pub description: String,
    #[serde(default)]
    pub details: Map<String, Value>,
    pub importance: Importance,
}

pub struct ActivityLog {
    recent: Mutex<VecDeque<Activity>>,
    capacity: usize,
    file: Option<PathBuf>,
    status: Mutex<SupervisorStatus>,
}

impl ActivityLog {
    /// `file` is created (with parent directories) on first write.
    pub fn new(capacity: usize, file: Option<PathBuf>) -> Self {
        Self {
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            file,
            status: Mutex::new(SupervisorStatus::default()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(DEFAULT_ACTIVITY_CAPACITY, None)
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn log(
        &self,
        kind: ActivityKind,
        description: impl Into<String>,
        details: Map<String, Value>,
        importance: Importance,
    ) {
        let activity = Activity {
            timestamp: Utc::now(),
            kind,
            description: description.into(),
            details,
            importance,
        };

        emit(&activity);
        if let Some(path) = &self.file {
            if let Err(e) = append_to_file(path, &activity) {
                error!(path = %path.display(), error = %e, "Failed to write activity log");
            }
        }

        let Ok(mut recent) = self.recent.lock() else {
            return;
        };
        if recent.len() >= self.capacity {
            recent.pop_front();
        }
        recent.push_back(activity);
    }

    /// Most recent `limit` activities, oldest first
    pub fn recent(&self, limit: usize) -> Vec<Activity> {
        let Ok(recent) = self.recent.lock() else {
            return Vec::new();
        };
        let skip = recent.len().saturating_sub(limit);
        recent.iter().skip(skip).cloned().collect()
    }

    pub fn by_kind(&self, kind: ActivityKind) -> Vec<Activity> {
        let Ok(recent) = self.recent.lock() else {
            return Vec::new();
        };
        recent.iter().filter(|a| a.kind == kind).cloned().collect()
    }

    pub fn clear(&self) {
        if let Ok(mut recent) = self.recent.lock() {
            recent.clear();
        }
    }

    pub fn monitoring(&self, agent: &str, action: &str, result: &str) {
        self.log(
            ActivityKind::Monitoring,
            format!("LEO monitored {agent}: {action} -> {result}"),
            Map::new(),
            Importance::Low,
        );
        self.with_status(|s| s.counters.interactions_monitored += 1);
    }

    pub fn decision(&self, decision: &str, reasoning: &str, importance: Importance) {
        let mut details = Map::new();
        details.insert("reasoning".to_string(), Value::String(reasoning.to_string()));
        self.log(
            ActivityKind::Decision,
            format!("LEO decided: {decision}"),
            details,
            importance,
        );
        self.with_status(|s| s.record_decision(decision, reasoning));
    }

    pub fn intervention(&self, intervention: &str, reason: &str) {
        let mut details = Map::new();
        details.insert("reason".to_string(), Value::String(reason.to_string()));
        self.log(
            ActivityKind::Intervention,
            format!("LEO intervened: {intervention}"),
            details,
            Importance::High,
        );
        self.with_status(|s| s.counters.interventions_made += 1);
    }

    pub fn escalation(&self, target: &str, reason: &str, details: Map<String, Value>, importance: Importance) {
        self.log(
            ActivityKind::Escalation,
            format!("LEO escalated to {target}: {reason}"),
            details,
            importance,
        );
        self.with_status(|s| s.counters.escalations_triggered += 1);
    }

    pub fn resolution(&self, agent: &str, notes: &str) {
        self.log(
            ActivityKind::Resolution,
            format!("Escalation for {agent} resolved: {notes}"),
            Map::new(),
            Importance::Normal,
        );
        self.with_status(|s| s.counters.escalations_resolved += 1);
    }

    pub fn update_status(&self, status: &str, task: Option<&str>, reasoning: &str) {
        self.with_status(|s| s.update(status, task, reasoning));
    }

    pub fn status(&self) -> StatusSummary {
        self.status
            .lock()
            .map(|s| s.summary())
            .unwrap_or_default()
    }

    fn with_status(&self, f: impl FnOnce(&mut SupervisorStatus)) {
        if let Ok(mut status) = self.status.lock() {
            f(&mut status);
        }
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn emit(activity: &Activity) {
    let kind = activity.kind.as_str();
    let description = activity.description.as_str();
    match activity.importance {
        Importance::Low => debug!(kind, "{description}"),
        Importance::Normal => info!(kind, "{description}"),
        Importance::High => warn!(kind, details = ?activity.details, "{description}"),
        Importance::Critical => error!(kind, details = ?activity.details, "{description}"),
    }
}

fn append_to_file(path: &Path, activity: &Activity) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(
        file,
        "{} [{}] {}: {}",
        activity.timestamp.to_rfc3339(),
        activity.importance.as_str().to_uppercase(),
        activity.kind.as_str(),
        activity.description
    )?;
    if !activity.details.is_empty() {
        let details = serde_json::to_string_pretty(&activity.details).map_err(std::io::Error::other)?;
        writeln!(file, "  Details: {details}")?;
    }
    writeln!(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_is_bounded() {
        let log = ActivityLog::new(3, None);
        for i in 0..5 {
            log.log(ActivityKind::Thinking, format!("t{i}"), Map::new(), Importance::Low);
        }
        let recent = log.recent(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].description, "t2");
        assert_eq!(log.recent(1)[0].description, "t4");
    }

    #[test]
    fn test_helpers_update_counters() {
        let log = ActivityLog::in_memory();
        log.monitoring("agent-1", "cargo build", "ok");
        log.intervention("provide guidance", "error in output");
        log.escalation("strong_model_consultation", "critical_error", Map::new(), Importance::High);
        log.resolution("agent-1", "fixed");
        log.decision("retry", "transient failure", Importance::Normal);

        let status = log.status();
        assert_eq!(status.performance.interactions_monitored, 1);
        assert_eq!(status.performance.interventions_made, 1);
        assert_eq!(status.performance.escalations_triggered, 1);
        assert_eq!(status.performance.escalations_resolved, 1);
        assert_eq!(status.recent_decisions.len(), 1);
        assert_eq!(log.by_kind(ActivityKind::Escalation).len(), 1);
    }

    #[test]
    fn test_file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("leo_activity.log");
        let log = ActivityLog::new(10, Some(path.clone()));

        let mut details = Map::new();
        details.insert("reason".into(), Value::String("segfault".into()));
        log.log(ActivityKind::Escalation, "LEO escalated", details, Importance::Critical);
        log.log(ActivityKind::Monitoring, "quiet", Map::new(), Importance::Low);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[CRITICAL] escalation: LEO escalated"));
        assert!(text.contains("\"reason\": \"segfault\""));
        assert!(text.contains("[LOW] monitoring: quiet"));
    }

    #[test]
    fn test_unwritable_file_does_not_fail() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for append.
        let log = ActivityLog::new(10, Some(dir.path().to_path_buf()));
        log.log(ActivityKind::Thinking, "still recorded", Map::new(), Importance::Normal);
        assert_eq!(log.recent(5).len(), 1);
    }
}

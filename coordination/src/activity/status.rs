//! What the supervisor is doing right now, plus running counters

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

const DECISION_CAPACITY: usize = 50;
const SUMMARY_DECISIONS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub timestamp: DateTime<Utc>,
    pub decision: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceCounters {
    pub interactions_monitored: u64,
    pub interventions_made: u64,
    pub escalations_triggered: u64,
    pub escalations_resolved: u64,
}

#[derive(Debug, Clone)]
pub struct SupervisorStatus {
    pub current_status: String,
    pub current_task: Option<String>,
    pub reasoning: String,
    pub decisions: VecDeque<Decision>,
    pub counters: PerformanceCounters,
    pub started_at: DateTime<Utc>,
}

impl Default for SupervisorStatus {
    fn default() -> Self {
        Self {
            current_status: "idle".to_string(),
            current_task: None,
            reasoning: String::new(),
            decisions: VecDeque::new(),
            counters: PerformanceCounters::default(),
            started_at: Utc::now(),
        }
    }
}

/// Serializable snapshot of [`SupervisorStatus`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusSummary {
    pub status: String,
    pub current_task: Option<String>,
    pub reasoning: String,
    pub recent_decisions: Vec<Decision>,
    pub performance: PerformanceCounters,
    pub uptime_secs: i64,
}

impl SupervisorStatus {
    pub fn update(&mut self, status: &str, task: Option<&str>, reasoning: &str) {
        self.current_status = status.to_string();
        self.current_task = task.map(str::to_string);
        self.reasoning = reasoning.to_string();
        info!(status, task = task.unwrap_or("-"), reasoning, "LEO status");
    }

    pub fn record_decision(&mut self, decision: &str, reasoning: &str) {
        if self.decisions.len() >= DECISION_CAPACITY {
            self.decisions.pop_front();
        }
        self.decisions.push_back(Decision {
            timestamp: Utc::now(),
            decision: decision.to_string(),
            reasoning: reasoning.to_string(),
        });
    }

    pub fn summary(&self) -> StatusSummary {
        let skip = self.decisions.len().saturating_sub(SUMMARY_DECISIONS);
        StatusSummary {
            status: self.current_status.clone(),
            current_task: self.current_task.clone(),
            reasoning: self.reasoning.clone(),
            recent_decisions: self.decisions.iter().skip(skip).cloned().collect(),
            performance: self.counters,
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
        }
    }
}

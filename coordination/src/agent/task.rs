//! Agent kinds and the tasks a monitor tracks for them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    #[default]
    ClaudeCode,
    Copilot,
    Cline,
    Custom,
}

impl std::str::FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude_code" => Ok(Self::ClaudeCode),
            "copilot" => Ok(Self::Copilot),
            "cline" => Ok(Self::Cline),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown agent type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Escalated,
}

impl TaskStatus {
    /// Completed and failed tasks leave the active map
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub agent_type: AgentType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set the first time the task moves to in-progress
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
}

/// Input for `AgentMonitor::add_task`
#[derive(Debug, Clone, Default)]
pub struct TaskSpec {
    pub description: String,
    pub priority: TaskPriority,
    pub context: Map<String, Value>,
    pub dependencies: Vec<String>,
    pub acceptance_criteria: Vec<String>,
}

impl TaskSpec {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn depends_on(mut self, task_id: impl Into<String>) -> Self {
        self.dependencies.push(task_id.into());
        self
    }

    pub fn accept_when(mut self, criterion: impl Into<String>) -> Self {
        self.acceptance_criteria.push(criterion.into());
        self
    }
}

impl Task {
    pub(crate) fn from_spec(spec: TaskSpec, agent_type: AgentType) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: spec.description,
            priority: spec.priority,
            status: TaskStatus::Pending,
            agent_type,
            created_at: now,
            updated_at: now,
            started_at: None,
            context: spec.context,
            dependencies: spec.dependencies,
            acceptance_criteria: spec.acceptance_criteria,
        }
    }

    pub(crate) fn transition(&mut self, status: TaskStatus, context: Option<Map<String, Value>>) {
        let now = Utc::now();
        if status == TaskStatus::InProgress && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.status = status;
        self.updated_at = now;
        if let Some(extra) = context {
            self.context.extend(extra);
        }
    }
}

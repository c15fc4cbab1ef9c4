//! Agent-facing interaction feed
//!
//! An [`AgentMonitor`] owns one agent's interaction ring and task map. Each
//! registered interaction gets a passive verdict from the configured
//! analyzer, updates the derived trigger counters, and is forwarded to the
//! shared [`EscalationCoordinator`].

pub mod brief;
pub mod interaction;
pub mod task;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::activity::{ActivityKind, ActivityLog, Importance};
use crate::escalation::engine::{EscalationCoordinator, EscalationOutcome};
use crate::escalation::state::ContextSnapshot;
use crate::escalation::triggers::TriggerCounters;
use crate::guidance::{Analysis, GuidanceAction, InteractionAnalyzer, InteractionSample};

pub use brief::{phase_brief, suggest_commit_message, BriefInput};
pub use interaction::{derive_counters, InteractionRecord, WorkStart};
pub use task::{AgentType, Task, TaskPriority, TaskSpec, TaskStatus};

pub const DEFAULT_INTERACTION_RETENTION: usize = 500;
/// Commands handed to the analyzer for repetition checks
const ANALYZER_COMMANDS: usize = 3;
/// Commands and files copied into an escalation snapshot
const SNAPSHOT_WINDOW: usize = 10;

/// What happened to one registered interaction
#[derive(Debug, Clone, Serialize)]
pub struct InteractionReport {
    pub interaction_id: String,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    /// `None` while monitoring is disabled
    pub analysis: Option<Analysis>,
    pub actions: Vec<GuidanceAction>,
    pub counters: TriggerCounters,
    pub escalation: EscalationOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub agent_type: AgentType,
    pub monitoring_enabled: bool,
    pub active_tasks: usize,
    pub completed_tasks: u32,
    pub failed_tasks: u32,
    pub completion_percentage: f64,
    pub total_interactions: usize,
    pub last_interaction: Option<InteractionRecord>,
    pub tasks: Vec<Task>,
}

struct MonitorState {
    interactions: VecDeque<InteractionRecord>,
    total_interactions: usize,
    tasks: HashMap<String, Task>,
    completed: Vec<String>,
    failed: Vec<String>,
    project_goals: Vec<String>,
    monitoring_enabled: bool,
}

impl MonitorState {
    fn push(&mut self, record: InteractionRecord, retention: usize) {
        while self.interactions.len() >= retention.max(1) {
            self.interactions.pop_front();
        }
        self.interactions.push_back(record);
        self.total_interactions += 1;
    }

    fn sorted_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    fn current_task(&self) -> Option<&Task> {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::InProgress)
            .max_by_key(|t| t.started_at)
    }

    fn goals(&self) -> Vec<String> {
        let mut goals = self.project_goals.clone();
        goals.extend(self.sorted_tasks().into_iter().map(|t| t.description));
        goals
    }

    fn completion_percentage(&self) -> f64 {
        let done = self.completed.len();
        let total = done + self.failed.len() + self.tasks.len();
        if total == 0 {
            return 0.0;
        }
        done as f64 / total as f64 * 100.0
    }

    fn recent_commands(&self, n: usize) -> Vec<String> {
        let skip = self.interactions.len().saturating_sub(n);
        self.interactions
            .iter()
            .skip(skip)
            .map(|i| i.command.clone())
            .collect()
    }

    fn recent_files(&self) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        for record in self.interactions.iter().rev().take(SNAPSHOT_WINDOW) {
            for file in &record.files_modified {
                if !files.contains(file) {
                    files.push(file.clone());
                }
            }
        }
        files
    }
}

pub struct AgentMonitor {
    agent_id: String,
    agent_type: AgentType,
    analyzer: Arc<dyn InteractionAnalyzer>,
    coordinator: Arc<EscalationCoordinator>,
    activity: Arc<ActivityLog>,
    retention: usize,
    session_started: DateTime<Utc>,
    state: Mutex<MonitorState>,
}

impl AgentMonitor {
    pub fn new(
        agent_id: impl Into<String>,
        agent_type: AgentType,
        analyzer: Arc<dyn InteractionAnalyzer>,
        coordinator: Arc<EscalationCoordinator>,
    ) -> Self {
        let activity = coordinator.activity().clone();
        Self {
            agent_id: agent_id.into(),
            agent_type,
            analyzer,
            coordinator,
            activity,
            retention: DEFAULT_INTERACTION_RETENTION,
            session_started: Utc::now(),
            state: Mutex::new(MonitorState {
                interactions: VecDeque::new(),
                total_interactions: 0,
                tasks: HashMap::new(),
                completed: Vec::new(),
                failed: Vec::new(),
                project_goals: Vec::new(),
                monitoring_enabled: true,
            }),
        }
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn coordinator(&self) -> &Arc<EscalationCoordinator> {
        &self.coordinator
    }

    pub async fn set_project_goals(&self, goals: Vec<String>) {
        self.state.lock().await.project_goals = goals;
    }

    pub async fn set_monitoring(&self, enabled: bool) {
        self.state.lock().await.monitoring_enabled = enabled;
    }

    /// Record one agent action, analyze it, and escalate if a trigger fires.
    pub async fn register_interaction(
        &self,
        command: &str,
        output: &str,
        files_modified: Vec<String>,
        success: bool,
        context: Map<String, Value>,
    ) -> InteractionReport {
        let (sample, monitoring_enabled) = {
            let state = self.state.lock().await;
            let mut recent_commands = state.recent_commands(ANALYZER_COMMANDS - 1);
            recent_commands.push(command.to_string());
            let sample = InteractionSample {
                command: command.to_string(),
                output: output.to_string(),
                files_modified: files_modified.clone(),
                goals: state.goals(),
                recent_commands,
            };
            (sample, state.monitoring_enabled)
        };

        let analysis = if monitoring_enabled {
            self.activity.update_status("analyzing", Some(command), "new agent interaction");
            let analysis = self.analyzer.analyze(&sample).await;
            self.log_analysis(command, &files_modified, &analysis);
            Some(analysis)
        } else {
            None
        };

        let record = InteractionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: self.agent_id.clone(),
            timestamp: Utc::now(),
            command: command.to_string(),
            output: output.to_string(),
            files_modified,
            success,
            context,
            analysis: analysis.clone(),
        };
        let interaction_id = record.id.clone();
        let timestamp = record.timestamp;

        let (counters, snapshot) = {
            let mut state = self.state.lock().await;
            state.push(record, self.retention);
            let start = WorkStart {
                task_started: state.current_task().and_then(|t| t.started_at),
                session_started: self.session_started,
            };
            let counters = derive_counters(&state.interactions, start, Utc::now());
            let snapshot = self.snapshot(&state, &counters);
            (counters, snapshot)
        };

        let escalation = if monitoring_enabled {
            self.coordinator
                .process(&self.agent_id, &counters, snapshot)
                .await
        } else {
            EscalationOutcome::Quiet
        };
        self.activity.update_status("idle", None, "");

        InteractionReport {
            interaction_id,
            agent_id: self.agent_id.clone(),
            timestamp,
            actions: analysis
                .as_ref()
                .map(|a| a.verdict.actions())
                .unwrap_or_default(),
            analysis,
            counters,
            escalation,
        }
    }

    fn log_analysis(&self, command: &str, files: &[String], analysis: &Analysis) {
        self.activity
            .monitoring(&self.agent_id, command, &format!("Modified {} files", files.len()));

        let verdict = &analysis.verdict;
        if !verdict.on_track {
            warn!(agent_id = %self.agent_id, guidance = %verdict.guidance, "Agent off track");
        }
        for action in verdict.actions() {
            match action {
                GuidanceAction::ProvideGuidance => {
                    let mut details = Map::new();
                    details.insert("priority".into(), Value::String(verdict.priority.to_string()));
                    self.activity.log(
                        ActivityKind::Guidance,
                        format!("LEO guidance for {}: {}", self.agent_id, verdict.guidance),
                        details,
                        Importance::Normal,
                    );
                }
                GuidanceAction::EscalateToStrongModel => {
                    self.activity.decision(
                        "escalate_to_strong_model",
                        &verdict.guidance,
                        Importance::High,
                    );
                }
            }
        }
    }

    fn snapshot(&self, state: &MonitorState, counters: &TriggerCounters) -> ContextSnapshot {
        let mut system_state = Map::new();
        system_state.insert("agent_type".into(), serde_json::to_value(self.agent_type).unwrap_or_default());
        system_state.insert("active_tasks".into(), Value::from(state.tasks.len()));
        system_state.insert("total_interactions".into(), Value::from(state.total_interactions));

        ContextSnapshot {
            current_task: state.current_task().map(|t| t.description.clone()),
            failed_attempts: counters.failed_attempts,
            consecutive_failures: counters.consecutive_failures,
            error_messages: counters.error_messages.clone(),
            recent_commands: state.recent_commands(SNAPSHOT_WINDOW),
            modified_files: state.recent_files(),
            project_goals: state.goals(),
            elapsed_seconds: counters.elapsed_seconds,
            completion_percentage: state.completion_percentage(),
            system_state,
            resource_usage: Map::new(),
            resolution_attempts: Vec::new(),
        }
    }

    pub async fn add_task(&self, spec: TaskSpec) -> String {
        let task = Task::from_spec(spec, self.agent_type);
        let id = task.id.clone();
        info!(agent_id = %self.agent_id, task_id = %id, description = %task.description, "Task added");
        self.state.lock().await.tasks.insert(id.clone(), task);
        id
    }

    /// Returns `false` for unknown task ids. Completed and failed tasks
    /// leave the active map but stay counted.
    pub async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        context: Option<Map<String, Value>>,
    ) -> bool {
        let mut state = self.state.lock().await;
        let Some(task) = state.tasks.get_mut(task_id) else {
            return false;
        };
        task.transition(status, context);
        let description = task.description.clone();
        info!(agent_id = %self.agent_id, task_id, ?status, "Task updated");

        match status {
            TaskStatus::Completed => {
                state.tasks.remove(task_id);
                state.completed.push(description);
            }
            TaskStatus::Failed => {
                state.tasks.remove(task_id);
                state.failed.push(description);
            }
            _ => {}
        }
        true
    }

    pub async fn pending_tasks(&self) -> Vec<Task> {
        self.state
            .lock()
            .await
            .sorted_tasks()
            .into_iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect()
    }

    pub async fn status(&self) -> AgentStatus {
        let state = self.state.lock().await;
        AgentStatus {
            agent_id: self.agent_id.clone(),
            agent_type: self.agent_type,
            monitoring_enabled: state.monitoring_enabled,
            active_tasks: state.tasks.len(),
            completed_tasks: state.completed.len() as u32,
            failed_tasks: state.failed.len() as u32,
            completion_percentage: state.completion_percentage(),
            total_interactions: state.total_interactions,
            last_interaction: state.interactions.back().cloned(),
            tasks: state.sorted_tasks(),
        }
    }

    /// Markdown brief for the next phase of work
    pub async fn phase_brief(&self) -> String {
        let state = self.state.lock().await;
        let mut completed = state.completed.clone();
        completed.extend(
            state
                .interactions
                .iter()
                .filter(|i| i.success)
                .map(|i| i.command.clone()),
        );
        let input = BriefInput {
            completed,
            current: state.sorted_tasks().into_iter().map(|t| t.description).collect(),
            issues: state
                .interactions
                .iter()
                .filter(|i| !i.success)
                .map(|i| i.command.clone())
                .collect(),
            project_goals: state.project_goals.clone(),
            interactions_monitored: state.total_interactions,
        };
        phase_brief(&input)
    }

    /// Commit message for the files changed across retained interactions,
    /// or for `files` when given.
    pub async fn suggest_commit_message(&self, files: Option<Vec<String>>) -> String {
        let files = match files {
            Some(files) => files,
            None => self.state.lock().await.recent_files(),
        };
        suggest_commit_message(&files)
    }
}

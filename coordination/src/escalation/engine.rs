//! Escalation Coordinator: trigger → level → producer → record → callbacks
//!
//! One coordinator per process owns the active-escalation map and the
//! bounded history behind a single async mutex. The lock is never held
//! while a guidance producer runs, so escalations for different agents
//! proceed concurrently while each agent has at most one active escalation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::activity::{ActivityLog, Importance};
use crate::escalation::selector::{LevelSelector, SelectionInput};
use crate::escalation::state::{
    ContextSnapshot, EscalationContext, EscalationLevel, EscalationReason, EscalationRecord,
    EscalationResponse,
};
use crate::escalation::triggers::{TriggerCounters, TriggerEvaluator, TriggerThresholds};
use crate::guidance::GuidanceProducer;

/// Previous-escalation summaries embedded in a new context
const PREVIOUS_ESCALATIONS: usize = 5;
/// Error messages kept on an active escalation while triggers coalesce
const COALESCED_ERRORS: usize = 5;

pub type EscalationCallback = Arc<dyn Fn(&EscalationContext) + Send + Sync>;
pub type ResolutionCallback = Arc<dyn Fn(&EscalationContext, &str) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    pub thresholds: TriggerThresholds,
    /// Dispatches newer than this skip local intervention
    pub recent_window_secs: u64,
    /// History entries kept; oldest evicted first
    pub history_retention: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            thresholds: TriggerThresholds::default(),
            recent_window_secs: 3600,
            history_retention: 500,
        }
    }
}

/// Producer registry keyed by the tier each producer answers for
#[derive(Clone, Default)]
pub struct GuidanceTiers {
    producers: HashMap<EscalationLevel, Arc<dyn GuidanceProducer>>,
}

impl GuidanceTiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `producer` for its own level, replacing any previous one.
    pub fn with(mut self, producer: Arc<dyn GuidanceProducer>) -> Self {
        self.producers.insert(producer.level(), producer);
        self
    }

    pub fn get(&self, level: EscalationLevel) -> Option<&Arc<dyn GuidanceProducer>> {
        self.producers.get(&level)
    }

    pub fn levels(&self) -> Vec<EscalationLevel> {
        let mut levels: Vec<_> = self.producers.keys().copied().collect();
        levels.sort();
        levels
    }
}

/// Result of [`EscalationCoordinator::process`]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EscalationOutcome {
    /// No trigger fired
    Quiet,
    /// An escalation for the agent was already active; the trigger was merged into it
    Coalesced {
        escalation_id: String,
        reason: EscalationReason,
    },
    /// The escalation was dispatched; `levels` lists every tier visited in order
    Handled {
        escalation_id: String,
        reason: EscalationReason,
        response: EscalationResponse,
        levels: Vec<EscalationLevel>,
    },
}

impl EscalationOutcome {
    pub fn response(&self) -> Option<&EscalationResponse> {
        match self {
            Self::Handled { response, .. } => Some(response),
            _ => None,
        }
    }

    pub fn is_quiet(&self) -> bool {
        matches!(self, Self::Quiet)
    }
}

/// An escalation awaiting resolution
#[derive(Debug, Clone, Serialize)]
pub struct ActiveEscalation {
    pub context: EscalationContext,
    /// Accumulated tier context updates and coalesced triggers
    pub context_updates: Map<String, Value>,
    pub last_response: Option<EscalationResponse>,
}

impl ActiveEscalation {
    fn new(context: EscalationContext) -> Self {
        Self {
            context,
            context_updates: Map::new(),
            last_response: None,
        }
    }

    /// Merge a trigger into this escalation: counted per reason, with the
    /// error list capped at the most recent `COALESCED_ERRORS`.
    fn coalesce(&mut self, reason: EscalationReason, error_messages: &[String]) {
        let entry = self
            .context_updates
            .entry("coalesced_triggers")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(counts) = entry {
            let seen = counts
                .get(reason.as_str())
                .and_then(Value::as_u64)
                .unwrap_or(0);
            counts.insert(reason.as_str().to_string(), Value::from(seen + 1));
        }
        for message in error_messages {
            if !self.context.error_messages.contains(message) {
                self.context.error_messages.push(message.clone());
            }
        }
        let excess = self
            .context
            .error_messages
            .len()
            .saturating_sub(COALESCED_ERRORS);
        self.context.error_messages.drain(..excess);
    }

    fn absorb(&mut self, response: &EscalationResponse) {
        for (key, value) in &response.context_updates {
            self.context_updates.insert(key.clone(), value.clone());
        }
        self.last_response = Some(response.clone());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationStats {
    pub active_escalations: usize,
    /// Dispatches still in retained history
    pub total_escalations: usize,
    pub resolved_escalations: usize,
    pub by_reason: BTreeMap<String, usize>,
    pub by_level: BTreeMap<String, usize>,
    pub last_24h: usize,
}

#[derive(Default)]
struct CoordinatorState {
    active: HashMap<String, ActiveEscalation>,
    history: VecDeque<EscalationRecord>,
}

impl CoordinatorState {
    fn record(&mut self, record: EscalationRecord, retention: usize) {
        while self.history.len() >= retention.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }

    fn has_recent_dispatch(&self, agent_id: &str, window: Duration) -> bool {
        let cutoff = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.history
            .iter()
            .any(|r| r.is_dispatch() && r.agent_id == agent_id && r.timestamp >= cutoff)
    }

    fn previous_escalations(&self, agent_id: &str) -> Vec<String> {
        let mut lines: Vec<String> = self
            .history
            .iter()
            .rev()
            .filter(|r| r.is_dispatch() && r.agent_id == agent_id)
            .take(PREVIOUS_ESCALATIONS)
            .map(EscalationRecord::prompt_line)
            .collect();
        lines.reverse();
        lines
    }

    fn is_current(&self, context: &EscalationContext) -> bool {
        self.active
            .get(&context.agent_id)
            .is_some_and(|a| a.context.escalation_id == context.escalation_id)
    }
}

pub struct EscalationCoordinator {
    evaluator: TriggerEvaluator,
    selector: LevelSelector,
    tiers: GuidanceTiers,
    recent_window: Duration,
    history_retention: usize,
    state: Mutex<CoordinatorState>,
    activity: Arc<ActivityLog>,
    on_escalation: Option<EscalationCallback>,
    on_resolution: Option<ResolutionCallback>,
}

impl EscalationCoordinator {
    pub fn new(settings: CoordinatorSettings, tiers: GuidanceTiers) -> Self {
        Self {
            evaluator: TriggerEvaluator::new(settings.thresholds),
            selector: LevelSelector,
            tiers,
            recent_window: window_duration(settings.recent_window_secs),
            history_retention: settings.history_retention,
            state: Mutex::new(CoordinatorState::default()),
            activity: Arc::new(ActivityLog::in_memory()),
            on_escalation: None,
            on_resolution: None,
        }
    }

    pub fn with_activity_log(mut self, activity: Arc<ActivityLog>) -> Self {
        self.activity = activity;
        self
    }

    /// Called synchronously on every dispatch, outside the lock.
    pub fn on_escalation(mut self, callback: EscalationCallback) -> Self {
        self.on_escalation = Some(callback);
        self
    }

    /// Called synchronously when an escalation is resolved, outside the lock.
    pub fn on_resolution(mut self, callback: ResolutionCallback) -> Self {
        self.on_resolution = Some(callback);
        self
    }

    pub fn evaluator(&self) -> &TriggerEvaluator {
        &self.evaluator
    }

    pub fn activity(&self) -> &Arc<ActivityLog> {
        &self.activity
    }

    /// Levels that have a registered producer, in ladder order
    pub fn tiers_configured(&self) -> Vec<EscalationLevel> {
        self.tiers.levels()
    }

    /// Evaluate triggers for `agent_id` and drive any resulting escalation
    /// up the ladder until a tier is satisfied or the ladder ends.
    ///
    /// Never fails: producer errors and panics become failure responses.
    pub async fn process(
        &self,
        agent_id: &str,
        counters: &TriggerCounters,
        snapshot: ContextSnapshot,
    ) -> EscalationOutcome {
        let Some(reason) = self.evaluator.evaluate(counters) else {
            return EscalationOutcome::Quiet;
        };

        let context = {
            let mut state = self.state.lock().await;

            if let Some(active) = state.active.get_mut(agent_id) {
                active.coalesce(reason, &snapshot.error_messages);
                debug!(
                    agent_id,
                    %reason,
                    escalation_id = %active.context.escalation_id,
                    "Trigger coalesced into active escalation"
                );
                return EscalationOutcome::Coalesced {
                    escalation_id: active.context.escalation_id.clone(),
                    reason,
                };
            }

            let input = SelectionInput {
                local_intervention_attempts: 0,
                has_recent_escalation: state.has_recent_dispatch(agent_id, self.recent_window),
            };
            let level = self.selector.select(reason, &input);
            let previous = state.previous_escalations(agent_id);
            let context = EscalationContext::new(agent_id, level, reason, snapshot, previous);

            state
                .active
                .insert(agent_id.to_string(), ActiveEscalation::new(context.clone()));
            state.record(EscalationRecord::dispatched(&context), self.history_retention);
            context
        };

        info!(
            agent_id,
            %reason,
            level = %context.level,
            escalation_id = %context.escalation_id,
            "Escalation triggered"
        );
        self.dispatch(context).await
    }

    async fn dispatch(&self, mut context: EscalationContext) -> EscalationOutcome {
        let mut levels = vec![context.level];

        loop {
            self.fire_escalation(&context);
            let response = self.run_producer(&context).await;
            self.log_response(&context, &response);
            if context.level == EscalationLevel::LocalIntervention && response.success {
                self.activity
                    .intervention(first_line(&response.guidance), context.reason.as_str());
            }

            let still_active = {
                let mut state = self.state.lock().await;
                let current = state.is_current(&context);
                if let Some(active) = state.active.get_mut(&context.agent_id).filter(|_| current) {
                    active.absorb(&response);
                }
                current
            };

            if !response.requires_further_escalation || !still_active {
                return self.handled(context, response, levels);
            }

            if context.level == EscalationLevel::LocalIntervention {
                context.local_intervention_attempts += 1;
            }

            let next = {
                let mut state = self.state.lock().await;
                let input = SelectionInput {
                    local_intervention_attempts: context.local_intervention_attempts,
                    has_recent_escalation: state
                        .has_recent_dispatch(&context.agent_id, self.recent_window),
                };
                let next = self.selector.reselect(context.level, context.reason, &input);
                if let Some(level) = next {
                    context.level = level;
                    if let Some(active) = state.active.get_mut(&context.agent_id) {
                        active.context.level = level;
                        active.context.local_intervention_attempts =
                            context.local_intervention_attempts;
                    }
                    let mut record = EscalationRecord::dispatched(&context);
                    record.timestamp = Utc::now();
                    state.record(record, self.history_retention);
                }
                next
            };

            match next {
                Some(level) => {
                    warn!(
                        agent_id = %context.agent_id,
                        from = %levels[levels.len() - 1],
                        to = %level,
                        "Re-escalating"
                    );
                    levels.push(level);
                }
                None => {
                    warn!(agent_id = %context.agent_id, level = %context.level, "Escalation ladder exhausted");
                    return self.handled(context, response, levels);
                }
            }
        }
    }

    fn handled(
        &self,
        context: EscalationContext,
        response: EscalationResponse,
        levels: Vec<EscalationLevel>,
    ) -> EscalationOutcome {
        EscalationOutcome::Handled {
            escalation_id: context.escalation_id,
            reason: context.reason,
            response,
            levels,
        }
    }

    async fn run_producer(&self, context: &EscalationContext) -> EscalationResponse {
        let level = context.level;
        let Some(producer) = self.tiers.get(level) else {
            return EscalationResponse::failure(
                level,
                format!("No guidance producer configured for {level}"),
            )
            .with_action("Manual intervention required");
        };

        match AssertUnwindSafe(producer.produce(context)).catch_unwind().await {
            Ok(Ok(mut response)) => {
                response.level = level;
                response
            }
            Ok(Err(e)) => {
                error!(agent_id = %context.agent_id, %level, error = %e, "Guidance producer failed");
                system_error(level, &e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(agent_id = %context.agent_id, %level, panic = %message, "Guidance producer panicked");
                system_error(level, &message)
            }
        }
    }

    fn fire_escalation(&self, context: &EscalationContext) {
        let mut details = Map::new();
        details.insert("agent_id".into(), Value::String(context.agent_id.clone()));
        details.insert("description".into(), Value::String(context.description.clone()));
        let importance = if context.level >= EscalationLevel::HumanRequired {
            Importance::Critical
        } else {
            Importance::High
        };
        self.activity
            .escalation(context.level.as_str(), context.reason.as_str(), details, importance);

        if let Some(callback) = &self.on_escalation {
            if std::panic::catch_unwind(AssertUnwindSafe(|| callback(context))).is_err() {
                error!(agent_id = %context.agent_id, "Escalation callback panicked");
            }
        }
    }

    fn log_response(&self, context: &EscalationContext, response: &EscalationResponse) {
        let importance = response_importance(response);
        let mut details = Map::new();
        details.insert("agent_id".into(), Value::String(context.agent_id.clone()));
        details.insert("success".into(), Value::Bool(response.success));
        details.insert(
            "action_items".into(),
            Value::from(response.action_items.clone()),
        );
        self.activity.log(
            crate::activity::ActivityKind::Guidance,
            format!("{} guidance for {}: {}", response.level, context.agent_id, first_line(&response.guidance)),
            details,
            importance,
        );
    }

    /// Close the active escalation for `agent_id`. Unknown agents are a no-op.
    ///
    /// Returns whether an escalation was resolved.
    pub async fn resolve(&self, agent_id: &str, notes: &str) -> bool {
        let context = {
            let mut state = self.state.lock().await;
            let Some(mut active) = state.active.remove(agent_id) else {
                debug!(agent_id, "Resolve for agent without active escalation ignored");
                return false;
            };
            active.context.resolution_attempts.push(notes.to_string());
            state.record(
                EscalationRecord::resolved(&active.context, notes),
                self.history_retention,
            );
            active.context
        };

        info!(agent_id, escalation_id = %context.escalation_id, notes, "Escalation resolved");
        self.activity.resolution(agent_id, notes);
        if let Some(callback) = &self.on_resolution {
            if std::panic::catch_unwind(AssertUnwindSafe(|| callback(&context, notes))).is_err() {
                error!(agent_id, "Resolution callback panicked");
            }
        }
        true
    }

    pub async fn active(&self, agent_id: &str) -> Option<ActiveEscalation> {
        self.state.lock().await.active.get(agent_id).cloned()
    }

    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active.len()
    }

    /// Retained history for one agent, oldest first
    pub async fn history_for(&self, agent_id: &str) -> Vec<EscalationRecord> {
        self.state
            .lock()
            .await
            .history
            .iter()
            .filter(|r| r.agent_id == agent_id)
            .cloned()
            .collect()
    }

    pub async fn stats(&self) -> EscalationStats {
        let state = self.state.lock().await;
        let cutoff = Utc::now() - Duration::hours(24);
        let mut stats = EscalationStats {
            active_escalations: state.active.len(),
            ..Default::default()
        };

        for record in &state.history {
            if !record.is_dispatch() {
                stats.resolved_escalations += 1;
                continue;
            }
            stats.total_escalations += 1;
            *stats.by_reason.entry(record.reason.to_string()).or_default() += 1;
            *stats.by_level.entry(record.level.to_string()).or_default() += 1;
            if record.timestamp >= cutoff {
                stats.last_24h += 1;
            }
        }
        stats
    }
}

/// Seconds as a `Duration`, saturating at `Duration::MAX`
fn window_duration(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// Activity importance for a tier response
pub fn response_importance(response: &EscalationResponse) -> Importance {
    if response.level >= EscalationLevel::HumanRequired {
        Importance::Critical
    } else if !response.success || response.requires_further_escalation {
        Importance::High
    } else {
        Importance::Normal
    }
}

fn system_error(level: EscalationLevel, message: &str) -> EscalationResponse {
    EscalationResponse::failure(level, format!("Escalation system error: {message}"))
        .with_action("Manual intervention required")
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "producer panicked".to_string()
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

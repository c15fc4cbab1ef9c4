//! Integration tests for the escalation pipeline
//!
//! Drives a fully assembled [`Supervisor`] through trigger evaluation, tier
//! selection, re-escalation and resolution, using only public API.

use coordination::escalation::RecordOutcome;
use coordination::{
    ActivityKind, ContextSnapshot, EscalationLevel, EscalationOutcome, EscalationReason,
    Supervisor, SupervisorConfig, TriggerCounters,
};

/// Rule-based local tier, no strong-model key, log-only human notifications
fn offline_config() -> SupervisorConfig {
    SupervisorConfig {
        activity_log_path: None,
        ..Default::default()
    }
}

fn supervisor(config: &SupervisorConfig) -> Supervisor {
    Supervisor::from_config(config).expect("valid config")
}

fn failing(n: u32) -> TriggerCounters {
    TriggerCounters {
        consecutive_failures: n,
        error_messages: vec!["test result: FAILED. 3 passed; 1 failed".to_string()],
        ..Default::default()
    }
}

fn snapshot(errors: &[&str]) -> ContextSnapshot {
    ContextSnapshot {
        current_task: Some("Fix the failing integration test".to_string()),
        error_messages: errors.iter().map(|e| e.to_string()).collect(),
        recent_commands: vec!["cargo test".to_string(), "cargo test -- --nocapture".to_string()],
        ..Default::default()
    }
}

fn handled_levels(outcome: &EscalationOutcome) -> Vec<EscalationLevel> {
    match outcome {
        EscalationOutcome::Handled { levels, .. } => levels.clone(),
        other => panic!("expected a handled escalation, got {other:?}"),
    }
}

/// Test: five consecutive failures start at local intervention
#[tokio::test]
async fn test_repeated_failures_start_locally() {
    let sup = supervisor(&offline_config());
    let coordinator = sup.coordinator();

    let outcome = coordinator
        .process("claude-1", &failing(5), snapshot(&["1 failed"]))
        .await;

    match &outcome {
        EscalationOutcome::Handled { reason, response, levels, .. } => {
            assert_eq!(*reason, EscalationReason::RepeatedFailures);
            assert_eq!(levels[0], EscalationLevel::LocalIntervention);
            assert_eq!(response.level, EscalationLevel::LocalIntervention);
            assert!(response.success);
            assert!(!response.action_items.is_empty());
        }
        other => panic!("expected a handled escalation, got {other:?}"),
    }
    assert_eq!(coordinator.active_count().await, 1);
}

/// Test: below every threshold nothing is escalated
#[tokio::test]
async fn test_quiet_counters_are_ignored() {
    let sup = supervisor(&offline_config());
    let outcome = sup
        .coordinator()
        .process("claude-1", &failing(4), snapshot(&[]))
        .await;

    assert!(outcome.is_quiet());
    assert_eq!(sup.coordinator().stats().await.total_escalations, 0);
}

/// Test: a second escalation inside the recent window skips the local tier
#[tokio::test]
async fn test_recent_escalation_goes_to_strong_model() {
    let sup = supervisor(&offline_config());
    let coordinator = sup.coordinator();

    let first = coordinator
        .process("claude-1", &failing(5), snapshot(&["1 failed"]))
        .await;
    assert_eq!(handled_levels(&first)[0], EscalationLevel::LocalIntervention);
    assert!(coordinator.resolve("claude-1", "fixed the fixture path").await);

    let second = coordinator
        .process("claude-1", &failing(5), snapshot(&["1 failed"]))
        .await;
    let levels = handled_levels(&second);
    assert_eq!(levels[0], EscalationLevel::StrongModelConsultation);

    // No API key: the strong tier fails and the ladder moves on to a human.
    assert_eq!(levels.last(), Some(&EscalationLevel::HumanRequired));
    let response = second.response().unwrap();
    assert_eq!(response.level, EscalationLevel::HumanRequired);
    assert!(response.success);
}

/// Test: segfault output is critical and bypasses the local tier
#[tokio::test]
async fn test_segfault_is_critical() {
    let sup = supervisor(&offline_config());
    let counters = TriggerCounters {
        consecutive_failures: 1,
        failed_attempts: 1,
        error_messages: vec!["Segmentation fault (core dumped)".to_string()],
        ..Default::default()
    };

    let outcome = sup
        .coordinator()
        .process("claude-1", &counters, snapshot(&["Segmentation fault (core dumped)"]))
        .await;

    match &outcome {
        EscalationOutcome::Handled { reason, levels, .. } => {
            assert_eq!(*reason, EscalationReason::CriticalError);
            assert_eq!(levels[0], EscalationLevel::StrongModelConsultation);
        }
        other => panic!("expected a handled escalation, got {other:?}"),
    }
}

/// Test: an unreachable strong-model endpoint yields a failure response, not an error
#[tokio::test]
async fn test_strong_model_connection_error_becomes_failure() {
    let mut config = offline_config();
    config.strong.api_key = Some("sk-test".to_string());
    config.strong.base_url = "http://127.0.0.1:1".to_string();
    config.request_timeout_secs = 2;
    let sup = supervisor(&config);

    let counters = TriggerCounters {
        error_messages: vec!["fatal: repository corrupted".to_string()],
        ..Default::default()
    };
    let outcome = sup
        .coordinator()
        .process("claude-1", &counters, snapshot(&["fatal: repository corrupted"]))
        .await;

    assert_eq!(
        handled_levels(&outcome),
        vec![
            EscalationLevel::StrongModelConsultation,
            EscalationLevel::HumanRequired
        ]
    );

    let failed_guidance: Vec<_> = sup
        .coordinator()
        .activity()
        .by_kind(ActivityKind::Guidance)
        .into_iter()
        .filter(|a| a.details.get("success") == Some(&serde_json::Value::Bool(false)))
        .collect();
    assert_eq!(failed_guidance.len(), 1);
    assert!(failed_guidance[0]
        .description
        .contains("Strong model consultation failed"));
}

/// Test: triggers arriving while an escalation is active are coalesced
#[tokio::test]
async fn test_active_escalation_coalesces_new_triggers() {
    let sup = supervisor(&offline_config());
    let coordinator = sup.coordinator();

    let first = coordinator
        .process("claude-1", &failing(5), snapshot(&[]))
        .await;
    let second = coordinator
        .process("claude-1", &failing(6), snapshot(&[]))
        .await;

    let EscalationOutcome::Handled { escalation_id, .. } = first else {
        panic!("first trigger should dispatch");
    };
    match second {
        EscalationOutcome::Coalesced { escalation_id: id, .. } => assert_eq!(id, escalation_id),
        other => panic!("expected coalesced, got {other:?}"),
    }
    assert_eq!(coordinator.stats().await.total_escalations, 1);
}

/// Test: resolving an agent with nothing active changes nothing
#[tokio::test]
async fn test_resolve_unknown_agent_is_noop() {
    let sup = supervisor(&offline_config());
    let coordinator = sup.coordinator();

    assert!(!coordinator.resolve("ghost", "nothing to see").await);

    let stats = coordinator.stats().await;
    assert_eq!(stats.resolved_escalations, 0);
    assert_eq!(stats.active_escalations, 0);
    assert!(coordinator.history_for("ghost").await.is_empty());
}

/// Test: history keeps both the dispatch and the resolution, per agent
#[tokio::test]
async fn test_history_is_per_agent() {
    let sup = supervisor(&offline_config());
    let coordinator = sup.coordinator();

    coordinator.process("a", &failing(5), snapshot(&[])).await;
    coordinator.process("b", &failing(5), snapshot(&[])).await;
    coordinator.resolve("a", "done").await;

    let history = coordinator.history_for("a").await;
    assert_eq!(history.len(), 2);
    assert!(matches!(history[0].outcome, RecordOutcome::Dispatched));
    assert!(matches!(&history[1].outcome, RecordOutcome::Resolved { notes } if notes == "done"));
    assert_eq!(coordinator.history_for("b").await.len(), 1);

    let stats = coordinator.stats().await;
    assert_eq!(stats.active_escalations, 1);
    assert_eq!(stats.resolved_escalations, 1);
}

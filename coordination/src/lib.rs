//! LeoDock supervision core
//!
//! This library provides:
//! - Threshold-based trigger evaluation over an agent's interaction history
//! - A tiered escalation ladder (local supervisor, strong model, human, remote access)
//! - Guidance producers for each tier, behind async traits
//! - Chat-completion clients for OpenAI-compatible servers and the Anthropic API
//! - An activity log with a bounded ring, file sink and `tracing` output
//!
//! # Usage
//!
//! ```no_run
//! use coordination::{AgentType, Supervisor, SupervisorConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SupervisorConfig::from_env()?;
//! let supervisor = Supervisor::from_config(&config)?;
//! let monitor = supervisor.monitor("claude-1", AgentType::ClaudeCode);
//!
//! let report = monitor
//!     .register_interaction("cargo test", "error[E0308]", vec![], false, Default::default())
//!     .await;
//! println!("{}", serde_json::to_string(&report)?);
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod agent;
pub mod config;
pub mod escalation;
pub mod guidance;
pub mod llm;
pub mod notify;
pub mod supervisor;

pub use activity::{Activity, ActivityKind, ActivityLog, Importance, StatusSummary};
pub use agent::{
    AgentMonitor, AgentStatus, AgentType, InteractionRecord, InteractionReport, Task,
    TaskPriority, TaskSpec, TaskStatus,
};
pub use config::{ConfigError, LocalBackend, SupervisorConfig};
pub use escalation::{
    ContextSnapshot, CoordinatorSettings, EscalationContext, EscalationCoordinator,
    EscalationLevel, EscalationOutcome, EscalationReason, EscalationRecord, EscalationResponse,
    EscalationStats, GuidanceTiers, LevelSelector, SelectionInput, TriggerCounters,
    TriggerEvaluator, TriggerThresholds,
};
pub use guidance::{
    Analysis, GuidanceError, GuidanceProducer, InteractionAnalyzer, InteractionSample, Priority,
    Verdict,
};
pub use llm::{ChatClient, ChatError, ChatMessage, ChatReply, ChatRequest};
pub use notify::{NotificationSink, NotifyError};
pub use supervisor::Supervisor;

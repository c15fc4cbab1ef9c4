//! Guidance producers: one per escalation tier
//!
//! ```text
//! LocalIntervention        RuleBasedSupervisor | LocalModelSupervisor
//!     │                         (falls back to rules on transport failure)
//!     ▼
//! StrongModelConsultation  StrongModelConsultant
//!     │                         (missing key / unreachable → hand upward)
//!     ▼
//! HumanRequired            HumanEscalation → NotificationSink
//!     │
//!     ▼
//! RemoteAccess             RemoteAccessPreparation (dead end)
//! ```
//!
//! Producers recover expected failures themselves and report them as
//! `success = false, requires_further_escalation = true` responses. Only
//! internal defects surface as [`GuidanceError`].

pub mod human;
pub mod local;
pub mod rules;
pub mod strong;
pub mod verdict;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::escalation::state::{EscalationContext, EscalationLevel, EscalationResponse};

pub use human::{HumanEscalation, RemoteAccessPreparation};
pub use local::LocalModelSupervisor;
pub use rules::RuleBasedSupervisor;
pub use strong::StrongModelConsultant;
pub use verdict::{GuidanceAction, Priority, Verdict, VerdictSource};

#[derive(Debug, Error)]
pub enum GuidanceError {
    #[error("guidance producer defect: {0}")]
    Internal(String),
}

/// Produces guidance for one tier of the ladder
#[async_trait]
pub trait GuidanceProducer: Send + Sync {
    /// Tier this producer answers for
    fn level(&self) -> EscalationLevel;

    async fn produce(&self, context: &EscalationContext)
        -> Result<EscalationResponse, GuidanceError>;
}

/// One agent interaction as seen by the passive analyzer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionSample {
    pub command: String,
    pub output: String,
    pub files_modified: Vec<String>,
    pub goals: Vec<String>,
    /// Commands of the most recent interactions, oldest first, including this one
    pub recent_commands: Vec<String>,
}

/// Per-interaction verdict and the way it was obtained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub verdict: Verdict,
    pub source: VerdictSource,
    /// Short note about what was inspected
    pub reasoning: String,
}

/// Passive analysis run on every interaction, escalation or not
#[async_trait]
pub trait InteractionAnalyzer: Send + Sync {
    async fn analyze(&self, sample: &InteractionSample) -> Analysis;
}

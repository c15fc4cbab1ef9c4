//! Escalation pipeline: decides when an agent needs help and from whom
//!
//! Trigger evaluation and level selection are pure; only the guidance
//! producers behind each tier perform I/O.
//!
//! # Escalation Ladder
//!
//! ```text
//! LocalMonitoring            passive analysis of every interaction
//!     │
//!     ├─ trigger fires (repeated failures, stuck, timeout, drift, deps)
//!     ▼
//! LocalIntervention          rule-based or local model guidance
//!     │
//!     ├─ critical error / instability → skip straight to strong model
//!     ├─ prior intervention or escalation within the last hour → skip
//!     ├─ guidance asks for more help → climb
//!     ▼
//! StrongModelConsultation    remote model with full context
//!     │
//!     ├─ not configured / unreachable → climb
//!     ▼
//! HumanRequired              operator notified, awaiting reply
//!     │
//!     ▼
//! RemoteAccess               session prepared, ladder ends here
//! ```

pub mod actions;
pub mod engine;
pub mod selector;
pub mod state;
pub mod triggers;

pub use actions::{extract_action_items, MAX_ACTION_ITEMS};
pub use engine::{
    ActiveEscalation, CoordinatorSettings, EscalationCallback, EscalationCoordinator,
    EscalationOutcome, EscalationStats, GuidanceTiers, ResolutionCallback,
};
pub use selector::{LevelSelector, SelectionInput};
pub use state::{
    ContextSnapshot, EscalationContext, EscalationLevel, EscalationReason, EscalationRecord,
    EscalationResponse, RecordOutcome,
};
pub use triggers::{TriggerCounters, TriggerEvaluator, TriggerThresholds};

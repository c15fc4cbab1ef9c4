//! Structured supervisor verdict and its tolerant parser
//!
//! Local models do not reliably honor format instructions, so decoding is a
//! strict attempt followed by a mandatory keyword fallback:
//!
//! ```text
//! raw text
//!   ├─ whole text is a verdict object         → Parsed
//!   ├─ a {...} object embedded in prose/fence → Parsed
//!   └─ anything else                          → keyword classification (Fallback)
//! ```

use serde::{Deserialize, Serialize};

/// Urgency attached to a verdict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Follow-up a verdict asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidanceAction {
    ProvideGuidance,
    EscalateToStrongModel,
}

/// `{on_track, intervention_needed, guidance, priority}` as returned by a supervisor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(default = "default_true")]
    pub on_track: bool,
    #[serde(default)]
    pub intervention_needed: bool,
    #[serde(default)]
    pub guidance: String,
    #[serde(default)]
    pub priority: Priority,
}

fn default_true() -> bool {
    true
}

impl Default for Verdict {
    fn default() -> Self {
        Self {
            on_track: true,
            intervention_needed: false,
            guidance: CONTINUE_GUIDANCE.to_string(),
            priority: Priority::Low,
        }
    }
}

/// How a verdict was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    Parsed,
    Fallback,
}

pub const CONTINUE_GUIDANCE: &str = "Continue with current approach";

const NEGATIVE_WORDS: [&str; 5] = ["error", "problem", "issue", "fail", "wrong"];
const POSITIVE_WORDS: [&str; 5] = ["success", "good", "correct", "working", "complete"];

impl Verdict {
    /// Follow-up actions implied by this verdict
    pub fn actions(&self) -> Vec<GuidanceAction> {
        if !self.intervention_needed {
            return Vec::new();
        }
        match self.priority {
            Priority::High => vec![GuidanceAction::EscalateToStrongModel],
            Priority::Medium => vec![GuidanceAction::ProvideGuidance],
            Priority::Low => Vec::new(),
        }
    }

    /// Off-track at high priority
    pub fn signals_drift(&self) -> bool {
        !self.on_track && self.priority == Priority::High
    }

    /// Keyword classification of free text.
    ///
    /// Negative words flag an intervention at medium priority; positive words
    /// only change the wording of the guidance.
    pub fn classify_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        let mut verdict = Self::default();

        if NEGATIVE_WORDS.iter().any(|w| lower.contains(w)) {
            verdict.on_track = false;
            verdict.intervention_needed = true;
            verdict.priority = Priority::Medium;
            verdict.guidance = "LEO detected potential issues. Review the output and consider alternative approaches.".to_string();
        }

        if POSITIVE_WORDS.iter().any(|w| lower.contains(w)) {
            verdict.guidance =
                "LEO confirms progress is on track. Continue with current approach.".to_string();
        }

        verdict
    }

    /// Decode a model reply, falling back to keyword classification.
    pub fn parse_or_classify(raw: &str) -> (Self, VerdictSource) {
        match Self::parse_strict(raw) {
            Some(verdict) => (verdict, VerdictSource::Parsed),
            None => (Self::classify_text(raw), VerdictSource::Fallback),
        }
    }

    /// Strict decode of the whole reply, then of the outermost `{...}` span.
    pub fn parse_strict(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if let Ok(verdict) = serde_json::from_str::<Self>(trimmed) {
            return Some(verdict);
        }

        let start = trimmed.find('{')?;
        let end = trimmed.rfind('}')?;
        if end <= start {
            return None;
        }
        serde_json::from_str::<Self>(&trimmed[start..=end]).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exact_json() {
        let raw = r#"{"on_track": false, "intervention_needed": true, "guidance": "stop", "priority": "high"}"#;
        let (v, src) = Verdict::parse_or_classify(raw);
        assert_eq!(src, VerdictSource::Parsed);
        assert!(!v.on_track);
        assert_eq!(v.priority, Priority::High);
        assert_eq!(v.actions(), vec![GuidanceAction::EscalateToStrongModel]);
        assert!(v.signals_drift());
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "Sure!\n```json\n{\"on_track\": true, \"intervention_needed\": false, \"guidance\": \"fine\", \"priority\": \"low\"}\n```";
        let (v, src) = Verdict::parse_or_classify(raw);
        assert_eq!(src, VerdictSource::Parsed);
        assert_eq!(v.guidance, "fine");
        assert!(v.actions().is_empty());
    }

    #[test]
    fn test_malformed_json_falls_back_to_keywords() {
        let raw = "{on_track: nope, the build has an error";
        let (v, src) = Verdict::parse_or_classify(raw);
        assert_eq!(src, VerdictSource::Fallback);
        assert!(!v.on_track);
        assert!(v.intervention_needed);
        assert_eq!(v.priority, Priority::Medium);
        assert_eq!(v.actions(), vec![GuidanceAction::ProvideGuidance]);
    }

    #[test]
    fn test_unknown_priority_falls_back() {
        let raw = r#"{"on_track": true, "priority": "urgent"}"#;
        let (_, src) = Verdict::parse_or_classify(raw);
        assert_eq!(src, VerdictSource::Fallback);
    }

    #[test]
    fn test_positive_prose() {
        let v = Verdict::classify_text("Looks good, tests are working.");
        assert!(v.on_track);
        assert!(!v.intervention_needed);
        assert!(v.guidance.contains("on track"));
    }

    #[test]
    fn test_neutral_prose_defaults() {
        let v = Verdict::classify_text("The agent edited README.md.");
        assert_eq!(v, Verdict::default());
    }
}

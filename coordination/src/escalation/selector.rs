//! Level selection: picks the guidance tier for a fired trigger

use crate::escalation::state::{EscalationLevel, EscalationReason};

/// What the selector needs to know about the agent's escalation history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionInput {
    /// Local interventions already attempted in this escalation cycle
    pub local_intervention_attempts: u32,
    /// Whether the agent had a dispatched escalation inside the recent window
    pub has_recent_escalation: bool,
}

/// Deterministic tier selection
#[derive(Debug, Clone, Copy, Default)]
pub struct LevelSelector;

impl LevelSelector {
    /// Choose the first tier for a new escalation.
    ///
    /// Severe reasons, a prior local intervention, or a recent escalation all
    /// go straight to strong-model consultation; everything else starts at
    /// local intervention.
    pub fn select(&self, reason: EscalationReason, input: &SelectionInput) -> EscalationLevel {
        if reason.is_severe() {
            return EscalationLevel::StrongModelConsultation;
        }

        if input.local_intervention_attempts > 0 {
            return EscalationLevel::StrongModelConsultation;
        }

        if input.has_recent_escalation {
            return EscalationLevel::StrongModelConsultation;
        }

        EscalationLevel::LocalIntervention
    }

    /// Choose the tier after `current` asked for further escalation.
    ///
    /// Always strictly above `current`; `None` once the ladder is exhausted.
    pub fn reselect(
        &self,
        current: EscalationLevel,
        reason: EscalationReason,
        input: &SelectionInput,
    ) -> Option<EscalationLevel> {
        let next = current.next()?;
        Some(self.select(reason, input).max(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_escalation_is_local() {
        let level = LevelSelector.select(
            EscalationReason::RepeatedFailures,
            &SelectionInput::default(),
        );
        assert_eq!(level, EscalationLevel::LocalIntervention);
    }

    #[test]
    fn test_severe_reasons_bypass_local() {
        for reason in [EscalationReason::CriticalError, EscalationReason::SystemInstability] {
            assert_eq!(
                LevelSelector.select(reason, &SelectionInput::default()),
                EscalationLevel::StrongModelConsultation
            );
        }
    }

    #[test]
    fn test_prior_intervention_goes_strong() {
        let input = SelectionInput {
            local_intervention_attempts: 1,
            has_recent_escalation: false,
        };
        assert_eq!(
            LevelSelector.select(EscalationReason::GoalDrift, &input),
            EscalationLevel::StrongModelConsultation
        );
    }

    #[test]
    fn test_recent_escalation_never_local() {
        let input = SelectionInput {
            local_intervention_attempts: 0,
            has_recent_escalation: true,
        };
        for reason in EscalationReason::ALL {
            assert_ne!(
                LevelSelector.select(reason, &input),
                EscalationLevel::LocalIntervention,
                "reason {reason} selected local despite recent escalation"
            );
        }
    }

    #[test]
    fn test_reselect_climbs_the_ladder() {
        let input = SelectionInput {
            local_intervention_attempts: 1,
            has_recent_escalation: true,
        };
        let reason = EscalationReason::StuckOnTask;
        let mut level = EscalationLevel::LocalIntervention;
        let mut visited = vec![level];
        while let Some(next) = LevelSelector.reselect(level, reason, &input) {
            assert!(next > level);
            visited.push(next);
            level = next;
        }
        assert_eq!(
            visited,
            vec![
                EscalationLevel::LocalIntervention,
                EscalationLevel::StrongModelConsultation,
                EscalationLevel::HumanRequired,
                EscalationLevel::RemoteAccess,
            ]
        );
    }
}

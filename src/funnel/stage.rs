//! Funnel stages — which points the conversation can be at.

use serde::{Deserialize, Serialize};

/// The stages of the recruitment funnel.
///
/// Linear with two terminal branches:
/// Intro → CitySelection → RequirementsCheck → { RequirementsFailed |
/// DiscQuestionnaire } → VacancyOffer → { FormHandoff | NoVacancyAvailable }.
///
/// `HumanHandoff` is the escape hatch reached when the re-prompt cap is
/// exceeded; it behaves as terminal afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intro,
    CitySelection,
    RequirementsCheck,
    RequirementsFailed,
    DiscQuestionnaire,
    VacancyOffer,
    FormHandoff,
    NoVacancyAvailable,
    HumanHandoff,
}

impl Stage {
    /// The stage a fresh lead starts at.
    pub fn initial(skip_intro: bool) -> Self {
        if skip_intro {
            Self::CitySelection
        } else {
            Self::Intro
        }
    }

    /// Check if a transition from `self` to `target` is defined in the graph.
    pub fn can_transition_to(&self, target: Stage) -> bool {
        use Stage::*;

        // Any non-terminal stage may escalate to human handoff.
        if target == HumanHandoff {
            return !self.is_terminal();
        }
        matches!(
            (self, target),
            (Intro, CitySelection)
                | (CitySelection, RequirementsCheck)
                | (RequirementsCheck, RequirementsFailed)
                | (RequirementsCheck, DiscQuestionnaire)
                | (DiscQuestionnaire, VacancyOffer)
                | (VacancyOffer, FormHandoff)
                | (VacancyOffer, NoVacancyAvailable)
        )
    }

    /// Whether this stage accepts no further stage-advancing events.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RequirementsFailed
                | Self::FormHandoff
                | Self::NoVacancyAvailable
                | Self::HumanHandoff
        )
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Intro => "intro",
            Self::CitySelection => "city_selection",
            Self::RequirementsCheck => "requirements_check",
            Self::RequirementsFailed => "requirements_failed",
            Self::DiscQuestionnaire => "disc_questionnaire",
            Self::VacancyOffer => "vacancy_offer",
            Self::FormHandoff => "form_handoff",
            Self::NoVacancyAvailable => "no_vacancy_available",
            Self::HumanHandoff => "human_handoff",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_edges() {
        use Stage::*;
        let edges = [
            (Intro, CitySelection),
            (CitySelection, RequirementsCheck),
            (RequirementsCheck, RequirementsFailed),
            (RequirementsCheck, DiscQuestionnaire),
            (DiscQuestionnaire, VacancyOffer),
            (VacancyOffer, FormHandoff),
            (VacancyOffer, NoVacancyAvailable),
        ];
        for (from, to) in edges {
            assert!(from.can_transition_to(to), "{from} should transition to {to}");
        }
    }

    #[test]
    fn invalid_edges() {
        use Stage::*;
        // Skipping stages
        assert!(!Intro.can_transition_to(RequirementsCheck));
        assert!(!CitySelection.can_transition_to(VacancyOffer));
        // Going backward
        assert!(!RequirementsCheck.can_transition_to(CitySelection));
        assert!(!VacancyOffer.can_transition_to(DiscQuestionnaire));
        // Self-transition
        assert!(!CitySelection.can_transition_to(CitySelection));
        // Out of a terminal stage
        assert!(!RequirementsFailed.can_transition_to(DiscQuestionnaire));
        assert!(!FormHandoff.can_transition_to(VacancyOffer));
    }

    #[test]
    fn any_non_terminal_stage_can_escalate() {
        use Stage::*;
        for stage in [Intro, CitySelection, RequirementsCheck, DiscQuestionnaire, VacancyOffer] {
            assert!(stage.can_transition_to(HumanHandoff), "{stage}");
        }
        for stage in [RequirementsFailed, FormHandoff, NoVacancyAvailable, HumanHandoff] {
            assert!(!stage.can_transition_to(HumanHandoff), "{stage}");
        }
    }

    #[test]
    fn terminal_stages() {
        use Stage::*;
        for stage in [RequirementsFailed, FormHandoff, NoVacancyAvailable, HumanHandoff] {
            assert!(stage.is_terminal(), "{stage}");
        }
        for stage in [Intro, CitySelection, RequirementsCheck, DiscQuestionnaire, VacancyOffer] {
            assert!(!stage.is_terminal(), "{stage}");
        }
    }

    #[test]
    fn initial_stage_honors_skip_intro() {
        assert_eq!(Stage::initial(false), Stage::Intro);
        assert_eq!(Stage::initial(true), Stage::CitySelection);
    }

    #[test]
    fn display_matches_serde() {
        use Stage::*;
        for stage in [
            Intro,
            CitySelection,
            RequirementsCheck,
            RequirementsFailed,
            DiscQuestionnaire,
            VacancyOffer,
            FormHandoff,
            NoVacancyAvailable,
            HumanHandoff,
        ] {
            let display = format!("{stage}");
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(format!("\"{display}\""), json);
        }
    }
}

//! Per-lead conversation context — the only mutable state in the system.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::disc::{DiscAnswer, DiscResult};
use crate::funnel::Stage;

/// Outcome of the requirements check so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    Unknown,
    Passed,
    Failed,
}

impl Default for TriState {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Versioned, persisted state for one candidate.
///
/// Fetched and stored explicitly per request; mutated only by the funnel
/// state machine through the orchestrator. Concurrent writers serialize
/// through the `version` field: every successful write increments it, and a
/// write against a stale version is rejected by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadContext {
    /// Stable sender identity (phone number).
    pub sender_id: String,
    /// Current funnel stage.
    pub stage: Stage,
    /// Selected city, once chosen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Whether the eligibility requirements passed.
    #[serde(default)]
    pub requirements_passed: TriState,
    /// Ordered yes/no answers to the requirement questions.
    #[serde(default)]
    pub requirement_answers: Vec<bool>,
    /// Ordered questionnaire answers recorded so far.
    #[serde(default)]
    pub disc_answers: Vec<DiscAnswer>,
    /// Finalized behavioral profile, set once on questionnaire completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disc_result: Option<DiscResult>,
    /// Vacancies already presented to this lead.
    #[serde(default)]
    pub offered_vacancy_ids: BTreeSet<String>,
    /// Opaque handoff token, immutable once issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_token: Option<String>,
    /// Consecutive re-prompts in the current stage visit. Reset on advance.
    #[serde(default)]
    pub reprompt_count: u32,
    /// Optimistic-concurrency version; strictly increases on every write.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeadContext {
    /// Fresh context for a first-time sender, at the given initial stage.
    pub fn new(sender_id: &str, initial_stage: Stage) -> Self {
        let now = Utc::now();
        Self {
            sender_id: sender_id.to_string(),
            stage: initial_stage,
            city: None,
            requirements_passed: TriState::Unknown,
            requirement_answers: Vec::new(),
            disc_answers: Vec::new(),
            disc_result: None,
            offered_vacancy_ids: BTreeSet::new(),
            form_token: None,
            reprompt_count: 0,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `target`, resetting the re-prompt counter for the new visit.
    ///
    /// Callers must have validated the edge via [`Stage::can_transition_to`];
    /// this only applies the bookkeeping shared by every advance.
    pub fn advance_to(&mut self, target: Stage) {
        self.stage = target;
        self.reprompt_count = 0;
    }

    /// Stamp a successful mutation: bump version and touch `updated_at`.
    pub fn mark_mutated(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disc::DiscDimension;

    #[test]
    fn new_context_starts_at_version_one() {
        let ctx = LeadContext::new("+5511999990001", Stage::Intro);
        assert_eq!(ctx.version, 1);
        assert_eq!(ctx.stage, Stage::Intro);
        assert_eq!(ctx.requirements_passed, TriState::Unknown);
        assert!(ctx.city.is_none());
        assert!(ctx.form_token.is_none());
        assert!(ctx.disc_answers.is_empty());
    }

    #[test]
    fn advance_resets_reprompt_counter() {
        let mut ctx = LeadContext::new("+5511999990001", Stage::CitySelection);
        ctx.reprompt_count = 2;
        ctx.advance_to(Stage::RequirementsCheck);
        assert_eq!(ctx.stage, Stage::RequirementsCheck);
        assert_eq!(ctx.reprompt_count, 0);
    }

    #[test]
    fn mark_mutated_bumps_version() {
        let mut ctx = LeadContext::new("+5511999990001", Stage::Intro);
        let before = ctx.updated_at;
        ctx.mark_mutated();
        assert_eq!(ctx.version, 2);
        assert!(ctx.updated_at >= before);
    }

    #[test]
    fn serde_roundtrip_preserves_all_fields() {
        let mut ctx = LeadContext::new("+5511999990001", Stage::VacancyOffer);
        ctx.city = Some("Recife".into());
        ctx.requirements_passed = TriState::Passed;
        ctx.requirement_answers = vec![true, true, true];
        ctx.disc_answers.push(DiscAnswer {
            question_index: 0,
            option_id: "disc:0:a".into(),
        });
        ctx.disc_result = Some(DiscResult {
            dominant: DiscDimension::Influence,
            scores: [1, 3, 1, 1],
        });
        ctx.offered_vacancy_ids.insert("V-1".into());
        ctx.form_token = Some("tok-123".into());
        ctx.version = 9;

        let json = serde_json::to_string(&ctx).unwrap();
        let parsed: LeadContext = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.city.as_deref(), Some("Recife"));
        assert_eq!(parsed.requirements_passed, TriState::Passed);
        assert_eq!(parsed.requirement_answers, vec![true, true, true]);
        assert_eq!(parsed.disc_answers.len(), 1);
        assert_eq!(
            parsed.disc_result.as_ref().unwrap().dominant,
            DiscDimension::Influence
        );
        assert!(parsed.offered_vacancy_ids.contains("V-1"));
        assert_eq!(parsed.form_token.as_deref(), Some("tok-123"));
        assert_eq!(parsed.version, 9);
    }

    #[test]
    fn missing_optional_fields_deserialize_to_defaults() {
        // A minimal durable record from an older schema still loads.
        let json = r#"{
            "sender_id": "+5511999990001",
            "stage": "city_selection",
            "version": 3,
            "created_at": "2026-01-10T12:00:00Z",
            "updated_at": "2026-01-10T12:05:00Z"
        }"#;
        let ctx: LeadContext = serde_json::from_str(json).unwrap();
        assert_eq!(ctx.stage, Stage::CitySelection);
        assert_eq!(ctx.requirements_passed, TriState::Unknown);
        assert!(ctx.requirement_answers.is_empty());
        assert!(ctx.offered_vacancy_ids.is_empty());
        assert_eq!(ctx.reprompt_count, 0);
    }
}

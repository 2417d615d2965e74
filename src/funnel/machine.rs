//! The funnel state machine.
//!
//! Pure decision logic: takes the current context and one inbound event,
//! returns the updated context plus the outbound intents to emit. No
//! persistence here — the orchestrator owns the read-decide-write cycle —
//! and no stage ever advances on an error path.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::classifier::IntentClassifier;
use crate::context::{LeadContext, TriState};
use crate::disc::{self, AnswerOutcome};
use crate::error::Error;
use crate::event::{InboundEvent, InboundPayload, MenuOption, OutboundIntent};
use crate::funnel::Stage;
use crate::script::FunnelScript;
use crate::vacancy::VacancySource;

/// What evaluating one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageAction {
    /// The funnel moved to a new stage.
    Advanced(Stage),
    /// Recognized input progressed within the current stage (next question).
    Progressed,
    /// Unrecognized input; the current stage's prompt was re-presented.
    Reprompted,
    /// Idempotent replay of an already-recorded answer; prompt re-sent.
    Replayed,
    /// Inbound at a terminal stage; fixed acknowledgment sent.
    TerminalAck,
    /// Re-prompt cap exceeded; escalated to human handoff.
    Escalated,
}

/// Result of evaluating one event against one context.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// The (possibly) updated context. Version is untouched here; the
    /// orchestrator stamps it when `mutated` and persists via CAS.
    pub context: LeadContext,
    /// Whether the context changed and must be persisted.
    pub mutated: bool,
    pub action: StageAction,
    pub intents: Vec<OutboundIntent>,
}

impl Evaluation {
    fn unchanged(ctx: &LeadContext, action: StageAction, intents: Vec<OutboundIntent>) -> Self {
        Self {
            context: ctx.clone(),
            mutated: false,
            action,
            intents,
        }
    }
}

/// The conversation driver.
pub struct FunnelMachine {
    script: Arc<FunnelScript>,
    vacancies: Arc<dyn VacancySource>,
    classifier: Option<Arc<dyn IntentClassifier>>,
    skip_intro: bool,
    max_reprompts: u32,
}

impl FunnelMachine {
    pub fn new(
        script: Arc<FunnelScript>,
        vacancies: Arc<dyn VacancySource>,
        skip_intro: bool,
        max_reprompts: u32,
    ) -> Self {
        Self {
            script,
            vacancies,
            classifier: None,
            skip_intro,
            max_reprompts,
        }
    }

    /// Install a free-text intent classifier. Its suggestions go through the
    /// same validity checks as direct selections.
    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Stage a fresh lead starts at.
    pub fn initial_stage(&self) -> Stage {
        Stage::initial(self.skip_intro)
    }

    /// Entry action for a lead's very first inbound event. The triggering
    /// event only opens the conversation; it is not interpreted as an answer.
    pub async fn first_contact(&self, ctx: &LeadContext) -> Result<Vec<OutboundIntent>, Error> {
        self.entry_intents(ctx).await
    }

    /// Evaluate one inbound event against the lead's current stage.
    pub async fn evaluate(
        &self,
        ctx: &LeadContext,
        event: &InboundEvent,
    ) -> Result<Evaluation, Error> {
        debug!(
            sender_id = %ctx.sender_id,
            stage = %ctx.stage,
            message_id = %event.message_id,
            "Evaluating inbound event"
        );

        if ctx.stage.is_terminal() {
            return self.handle_terminal(ctx, event).await;
        }

        match ctx.stage {
            Stage::Intro => self.advance(ctx, Stage::CitySelection).await,
            Stage::CitySelection => self.handle_city_selection(ctx, event).await,
            Stage::RequirementsCheck => self.handle_requirements(ctx, event).await,
            Stage::DiscQuestionnaire => self.handle_disc(ctx, event).await,
            Stage::VacancyOffer => self.handle_vacancy_offer(ctx, event).await,
            // Terminal stages are handled above; reaching here means the
            // graph and the dispatch disagree. Re-prompt instead of crashing.
            stage => {
                warn!(sender_id = %ctx.sender_id, %stage, "Event for undefined stage edge");
                self.reprompt(ctx).await
            }
        }
    }

    /// Generic acknowledgment for a fatally failed request.
    pub fn retry_ack(&self, recipient: &str) -> OutboundIntent {
        OutboundIntent::text(recipient, self.script.messages.retry_later.clone())
    }

    // ── Stage handlers ──────────────────────────────────────────────

    async fn handle_terminal(
        &self,
        ctx: &LeadContext,
        event: &InboundEvent,
    ) -> Result<Evaluation, Error> {
        // Re-selecting a vacancy after handoff re-sends the existing link;
        // the token is never reissued.
        if ctx.stage == Stage::FormHandoff
            && let Some(id) = event.payload.selection_id()
            && ctx.offered_vacancy_ids.contains(id)
            && let Some(ref token) = ctx.form_token
        {
            let link = self.script.form_link(token);
            let body = self.script.messages.form_handoff.replace("{link}", &link);
            return Ok(Evaluation::unchanged(
                ctx,
                StageAction::TerminalAck,
                vec![OutboundIntent::text(&ctx.sender_id, body)],
            ));
        }

        Ok(Evaluation::unchanged(
            ctx,
            StageAction::TerminalAck,
            vec![OutboundIntent::text(
                &ctx.sender_id,
                self.script.messages.already_concluded.clone(),
            )],
        ))
    }

    async fn handle_city_selection(
        &self,
        ctx: &LeadContext,
        event: &InboundEvent,
    ) -> Result<Evaluation, Error> {
        let cities = self.vacancies.cities().await?;
        let options = city_options(&cities);
        let Some(selected) = self.resolve_selection(ctx.stage, &event.payload, &options).await
        else {
            return self.reprompt(ctx).await;
        };

        let name = selected.strip_prefix("city:").unwrap_or(&selected);
        let Some(canonical) = cities.iter().find(|c| c.eq_ignore_ascii_case(name)) else {
            debug!(sender_id = %ctx.sender_id, selected = %selected, "Unknown city selection");
            return self.reprompt(ctx).await;
        };

        let mut next = ctx.clone();
        next.city = Some(canonical.clone());
        next.advance_to(Stage::RequirementsCheck);
        let intents = self.entry_intents(&next).await?;
        Ok(Evaluation {
            context: next,
            mutated: true,
            action: StageAction::Advanced(Stage::RequirementsCheck),
            intents,
        })
    }

    async fn handle_requirements(
        &self,
        ctx: &LeadContext,
        event: &InboundEvent,
    ) -> Result<Evaluation, Error> {
        let current = ctx.requirement_answers.len();
        let options = self.requirement_options(current);
        let Some(selected) = self.resolve_selection(ctx.stage, &event.payload, &options).await
        else {
            return self.reprompt(ctx).await;
        };
        let Some((index, answer)) = parse_requirement_id(&selected) else {
            return self.reprompt(ctx).await;
        };

        // Redelivered answer for an already-recorded index: no-op replay.
        if index < current {
            if ctx.requirement_answers[index] == answer {
                let intents = self.entry_intents(ctx).await?;
                return Ok(Evaluation::unchanged(ctx, StageAction::Replayed, intents));
            }
            debug!(sender_id = %ctx.sender_id, index, "Conflicting requirement re-answer");
            return self.reprompt(ctx).await;
        }
        if index != current {
            warn!(sender_id = %ctx.sender_id, index, current, "Requirement answer out of order");
            return self.reprompt(ctx).await;
        }

        let mut next = ctx.clone();
        next.requirement_answers.push(answer);
        next.reprompt_count = 0;

        // First negative short-circuits; remaining questions are never asked.
        if !answer {
            next.requirements_passed = TriState::Failed;
            next.advance_to(Stage::RequirementsFailed);
            return Ok(Evaluation {
                context: next,
                mutated: true,
                action: StageAction::Advanced(Stage::RequirementsFailed),
                intents: vec![OutboundIntent::text(
                    &ctx.sender_id,
                    self.script.messages.requirements_failed.clone(),
                )],
            });
        }

        if next.requirement_answers.len() < self.script.requirements.len() {
            let intents = self.entry_intents(&next).await?;
            return Ok(Evaluation {
                context: next,
                mutated: true,
                action: StageAction::Progressed,
                intents,
            });
        }

        // All affirmative: requirements pass, questionnaire starts.
        next.requirements_passed = TriState::Passed;
        next.advance_to(Stage::DiscQuestionnaire);
        let intents = self.entry_intents(&next).await?;
        Ok(Evaluation {
            context: next,
            mutated: true,
            action: StageAction::Advanced(Stage::DiscQuestionnaire),
            intents,
        })
    }

    async fn handle_disc(
        &self,
        ctx: &LeadContext,
        event: &InboundEvent,
    ) -> Result<Evaluation, Error> {
        let questions = &self.script.disc_questions;
        let options = self.disc_options(ctx);
        let Some(selected) = self.resolve_selection(ctx.stage, &event.payload, &options).await
        else {
            return self.reprompt(ctx).await;
        };

        // Option ids are unique across the questionnaire; find the question
        // the selection belongs to so replays of earlier answers resolve.
        let Some(question_index) = questions
            .iter()
            .position(|q| q.options.iter().any(|o| o.id == selected))
        else {
            return self.reprompt(ctx).await;
        };

        let mut next = ctx.clone();
        match disc::apply_answer(questions, &mut next, question_index, &selected) {
            AnswerOutcome::Replayed => {
                let intents = self.entry_intents(ctx).await?;
                Ok(Evaluation::unchanged(ctx, StageAction::Replayed, intents))
            }
            AnswerOutcome::Rejected => self.reprompt(ctx).await,
            AnswerOutcome::Recorded { complete: false } => {
                next.reprompt_count = 0;
                let intents = self.entry_intents(&next).await?;
                Ok(Evaluation {
                    context: next,
                    mutated: true,
                    action: StageAction::Progressed,
                    intents,
                })
            }
            AnswerOutcome::Recorded { complete: true } => self.enter_vacancy_offer(next).await,
        }
    }

    /// Questionnaire done: offer open positions, or conclude if there are none.
    async fn enter_vacancy_offer(&self, mut next: LeadContext) -> Result<Evaluation, Error> {
        let city = next.city.clone().unwrap_or_default();
        let open = self.vacancies.list_open(&city).await?;

        if open.is_empty() {
            next.advance_to(Stage::NoVacancyAvailable);
            let intents = vec![OutboundIntent::text(
                &next.sender_id,
                self.script.messages.no_vacancy.clone(),
            )];
            return Ok(Evaluation {
                context: next,
                mutated: true,
                action: StageAction::Advanced(Stage::NoVacancyAvailable),
                intents,
            });
        }

        for vacancy in &open {
            next.offered_vacancy_ids.insert(vacancy.id.clone());
        }
        next.advance_to(Stage::VacancyOffer);
        let intents = vec![OutboundIntent::menu(
            &next.sender_id,
            self.script.vacancy_prompt.clone(),
            vacancy_menu_options(&open),
        )];
        Ok(Evaluation {
            context: next,
            mutated: true,
            action: StageAction::Advanced(Stage::VacancyOffer),
            intents,
        })
    }

    async fn handle_vacancy_offer(
        &self,
        ctx: &LeadContext,
        event: &InboundEvent,
    ) -> Result<Evaluation, Error> {
        let city = ctx.city.clone().unwrap_or_default();
        let open = self.vacancies.list_open(&city).await?;
        let options = vacancy_menu_options(&open);

        if let Some(selected) = self.resolve_selection(ctx.stage, &event.payload, &options).await
            && ctx.offered_vacancy_ids.contains(&selected)
        {
            // Token is issued exactly once; issuance and the stage advance
            // are one CAS write, so they cannot diverge.
            if let Some(ref token) = ctx.form_token {
                let link = self.script.form_link(token);
                let body = self.script.messages.form_handoff.replace("{link}", &link);
                return Ok(Evaluation::unchanged(
                    ctx,
                    StageAction::Replayed,
                    vec![OutboundIntent::text(&ctx.sender_id, body)],
                ));
            }

            let token = Uuid::new_v4().to_string();
            let link = self.script.form_link(&token);
            let mut next = ctx.clone();
            next.form_token = Some(token);
            next.advance_to(Stage::FormHandoff);
            let body = self.script.messages.form_handoff.replace("{link}", &link);
            return Ok(Evaluation {
                context: next,
                mutated: true,
                action: StageAction::Advanced(Stage::FormHandoff),
                intents: vec![OutboundIntent::text(&ctx.sender_id, body)],
            });
        }

        // The catalog may have drained since the offer was presented; that
        // re-applies the entry rule, it is not an invalid-input advance.
        if open.is_empty() {
            let mut next = ctx.clone();
            next.advance_to(Stage::NoVacancyAvailable);
            return Ok(Evaluation {
                context: next,
                mutated: true,
                action: StageAction::Advanced(Stage::NoVacancyAvailable),
                intents: vec![OutboundIntent::text(
                    &ctx.sender_id,
                    self.script.messages.no_vacancy.clone(),
                )],
            });
        }

        // Re-prompting re-presents everything currently open; positions that
        // appeared since the first offer become selectable too.
        let mut refreshed = ctx.clone();
        for vacancy in &open {
            refreshed.offered_vacancy_ids.insert(vacancy.id.clone());
        }
        self.reprompt(&refreshed).await
    }

    // ── Re-prompt policy ────────────────────────────────────────────

    /// Unrecognized input: re-present the current stage once, escalating to
    /// human handoff when the consecutive cap is exceeded.
    async fn reprompt(&self, ctx: &LeadContext) -> Result<Evaluation, Error> {
        let mut next = ctx.clone();
        next.reprompt_count += 1;

        if next.reprompt_count > self.max_reprompts {
            warn!(
                sender_id = %ctx.sender_id,
                stage = %ctx.stage,
                reprompts = next.reprompt_count,
                "Re-prompt cap exceeded; escalating to human handoff"
            );
            next.advance_to(Stage::HumanHandoff);
            return Ok(Evaluation {
                context: next,
                mutated: true,
                action: StageAction::Escalated,
                intents: vec![OutboundIntent::text(
                    &ctx.sender_id,
                    self.script.messages.escalation.clone(),
                )],
            });
        }

        let intents = self.entry_intents(&next).await?;
        Ok(Evaluation {
            context: next,
            mutated: true,
            action: StageAction::Reprompted,
            intents,
        })
    }

    // ── Entry actions ───────────────────────────────────────────────

    /// The messages that present a stage: intro fragments, the city menu,
    /// the pending requirement question, the pending DISC scenario, or the
    /// vacancy menu. Also what a re-prompt re-sends.
    async fn entry_intents(&self, ctx: &LeadContext) -> Result<Vec<OutboundIntent>, Error> {
        let to = ctx.sender_id.as_str();
        match ctx.stage {
            Stage::Intro => Ok(self
                .script
                .intro
                .iter()
                .map(|fragment| OutboundIntent::text(to, fragment.clone()))
                .collect()),
            Stage::CitySelection => {
                let cities = self.vacancies.cities().await?;
                Ok(vec![OutboundIntent::menu(
                    to,
                    self.script.city_prompt.clone(),
                    city_options(&cities),
                )])
            }
            Stage::RequirementsCheck => {
                let index = ctx.requirement_answers.len();
                let question = &self.script.requirements[index.min(self.script.requirements.len() - 1)];
                let mut intents = Vec::new();
                if index == 0 {
                    intents.push(OutboundIntent::text(
                        to,
                        self.script.requirements_preamble.clone(),
                    ));
                }
                intents.push(OutboundIntent::menu(
                    to,
                    question.text.clone(),
                    self.requirement_options(index),
                ));
                Ok(intents)
            }
            Stage::DiscQuestionnaire => {
                let Some((index, question)) =
                    disc::next_question(&self.script.disc_questions, ctx)
                else {
                    // Complete questionnaire never re-enters this stage.
                    return Ok(vec![]);
                };
                let mut intents = Vec::new();
                if index == 0 && ctx.reprompt_count == 0 {
                    intents.push(OutboundIntent::text(to, self.script.disc_preamble.clone()));
                }
                let mut body = format!("Scenario: {}\n\nHow would you act?\n", question.text);
                for (i, option) in question.options.iter().enumerate() {
                    let letter = (b'A' + i as u8) as char;
                    body.push_str(&format!("{letter}) {}\n", option.label));
                }
                intents.push(OutboundIntent::text(to, body));
                intents.push(OutboundIntent::menu(
                    to,
                    "Pick an option below:",
                    self.disc_options(ctx),
                ));
                Ok(intents)
            }
            Stage::VacancyOffer => {
                let city = ctx.city.clone().unwrap_or_default();
                let open = self.vacancies.list_open(&city).await?;
                Ok(vec![OutboundIntent::menu(
                    to,
                    self.script.vacancy_prompt.clone(),
                    vacancy_menu_options(&open),
                )])
            }
            _ => Ok(vec![OutboundIntent::text(
                to,
                self.script.messages.already_concluded.clone(),
            )]),
        }
    }

    // ── Selection plumbing ──────────────────────────────────────────

    /// Normalize a payload into a selection id. Direct selections pass
    /// through; free text goes to the classifier when one is installed,
    /// otherwise to an exact label/id match. Either way the result is
    /// validated by the caller — a suggestion is never trusted blindly.
    async fn resolve_selection(
        &self,
        stage: Stage,
        payload: &InboundPayload,
        options: &[MenuOption],
    ) -> Option<String> {
        match payload {
            InboundPayload::ButtonTap { id } | InboundPayload::ListSelection { id } => {
                Some(id.clone())
            }
            InboundPayload::FreeText { text } => match self.classifier {
                Some(ref classifier) => classifier.classify(stage, text, options).await,
                None => options
                    .iter()
                    .find(|o| o.id == *text || o.label.eq_ignore_ascii_case(text.trim()))
                    .map(|o| o.id.clone()),
            },
        }
    }

    fn requirement_options(&self, index: usize) -> Vec<MenuOption> {
        vec![
            MenuOption::new(
                format!("req:{index}:yes"),
                self.script.messages.yes_label.clone(),
            ),
            MenuOption::new(
                format!("req:{index}:no"),
                self.script.messages.no_label.clone(),
            ),
        ]
    }

    fn disc_options(&self, ctx: &LeadContext) -> Vec<MenuOption> {
        let Some((_, question)) = disc::next_question(&self.script.disc_questions, ctx) else {
            return vec![];
        };
        question
            .options
            .iter()
            .enumerate()
            .map(|(i, option)| {
                let letter = (b'A' + i as u8) as char;
                MenuOption::new(option.id.clone(), format!("Option {letter}"))
            })
            .collect()
    }

    async fn advance(&self, ctx: &LeadContext, target: Stage) -> Result<Evaluation, Error> {
        if !ctx.stage.can_transition_to(target) {
            // Defined edges only; anything else downgrades to a re-prompt.
            let err = crate::error::FunnelError::InvalidTransition {
                from: ctx.stage.to_string(),
                to: target.to_string(),
            };
            warn!(sender_id = %ctx.sender_id, error = %err, "Treating as unrecognized input");
            return self.reprompt(ctx).await;
        }
        let mut next = ctx.clone();
        next.advance_to(target);
        let intents = self.entry_intents(&next).await?;
        Ok(Evaluation {
            context: next,
            mutated: true,
            action: StageAction::Advanced(target),
            intents,
        })
    }
}

fn city_options(cities: &[String]) -> Vec<MenuOption> {
    cities
        .iter()
        .map(|city| MenuOption::new(format!("city:{city}"), city.clone()))
        .collect()
}

fn vacancy_menu_options(open: &[crate::vacancy::Vacancy]) -> Vec<MenuOption> {
    open.iter()
        .map(|v| {
            MenuOption::new(v.id.clone(), v.title.clone())
                .with_description(v.menu_description())
        })
        .collect()
}

/// Parse a `req:{index}:{yes|no}` button id.
fn parse_requirement_id(id: &str) -> Option<(usize, bool)> {
    let rest = id.strip_prefix("req:")?;
    let (index, answer) = rest.split_once(':')?;
    let index: usize = index.parse().ok()?;
    match answer {
        "yes" => Some((index, true)),
        "no" => Some((index, false)),
        _ => None,
    }
}

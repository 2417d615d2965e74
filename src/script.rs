//! Static conversation content.
//!
//! Everything the funnel says is supplied here — intro fragments,
//! requirement questions, DISC scenarios, menu prompts, and fixed reply
//! templates. The engine never generates text at request time; deployments
//! swap this wholesale (typically loaded from a JSON file).

use serde::{Deserialize, Serialize};

use crate::disc::{DiscDimension, DiscOption, DiscQuestion};
use crate::error::ConfigError;

/// One yes/no eligibility question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementQuestion {
    /// Stable key, used in button ids and reports.
    pub key: String,
    /// Question text.
    pub text: String,
}

/// Fixed reply templates, keyed by field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Messages {
    /// Sent for any inbound message at a terminal stage.
    pub already_concluded: String,
    /// Generic acknowledgment when the request failed fatally.
    pub retry_later: String,
    /// Sent when a requirement answer is negative.
    pub requirements_failed: String,
    /// Sent when no open vacancies exist for the selected city.
    pub no_vacancy: String,
    /// Sent when the re-prompt cap is exceeded and a human takes over.
    pub escalation: String,
    /// Sent with the form link; `{link}` is substituted.
    pub form_handoff: String,
    /// Label of the affirmative button.
    pub yes_label: String,
    /// Label of the negative button.
    pub no_label: String,
}

/// The full funnel script. Read-only input, not part of the mutable model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelScript {
    /// Ordered intro fragments, sent as separate messages.
    pub intro: Vec<String>,
    /// City selection menu prompt (also the re-prompt).
    pub city_prompt: String,
    /// Short preamble sent once before the first requirement question.
    pub requirements_preamble: String,
    /// Ordered yes/no eligibility questions.
    pub requirements: Vec<RequirementQuestion>,
    /// Short preamble sent once before the first DISC scenario.
    pub disc_preamble: String,
    /// Ordered DISC scenarios.
    pub disc_questions: Vec<DiscQuestion>,
    /// Vacancy selection menu prompt.
    pub vacancy_prompt: String,
    /// Base URL for the downstream form; the handoff token is appended.
    pub form_link_base: String,
    pub messages: Messages,
}

impl FunnelScript {
    /// Load a script from JSON and validate it.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let script: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        script.validate()?;
        Ok(script)
    }

    /// Structural checks: the funnel cannot run with empty question sets or
    /// colliding option ids.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.requirements.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "requirements".into(),
                message: "at least one requirement question is required".into(),
            });
        }
        if self.disc_questions.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "disc_questions".into(),
                message: "at least one DISC question is required".into(),
            });
        }
        for (idx, question) in self.disc_questions.iter().enumerate() {
            if question.options.len() < 2 {
                return Err(ConfigError::InvalidValue {
                    key: format!("disc_questions[{idx}]"),
                    message: "each DISC question needs at least two options".into(),
                });
            }
            let mut seen = std::collections::HashSet::new();
            for option in &question.options {
                if !seen.insert(option.id.as_str()) {
                    return Err(ConfigError::InvalidValue {
                        key: format!("disc_questions[{idx}]"),
                        message: format!("duplicate option id '{}'", option.id),
                    });
                }
            }
        }
        Ok(())
    }

    /// The link sent at form handoff for a given token.
    pub fn form_link(&self, token: &str) -> String {
        format!("{}?token={token}", self.form_link_base)
    }

    /// Built-in courier-recruitment script, used by tests and local runs.
    pub fn builtin() -> Self {
        use DiscDimension::*;

        let disc_questions = vec![
            disc_question(
                0,
                "A high-priority pickup appears near your route and would force a detour.",
                &[
                    (Dominance, "Take it on immediately, even if other stops slip."),
                    (Influence, "Call dispatch and work out the best split with a colleague."),
                    (Steadiness, "Check the impact on the rest of the route before adjusting."),
                    (Compliance, "Follow the routing policy and only deviate if it allows it."),
                ],
            ),
            disc_question(
                1,
                "A customer asks you to leave the package with a neighbor, off procedure.",
                &[
                    (Dominance, "Leave it with the neighbor and note it so the day keeps moving."),
                    (Influence, "Suggest the customer authorize the change in the app while you wait."),
                    (Steadiness, "Wait a few minutes for the customer to arrive."),
                    (Compliance, "Stick to the standard procedure and deliver only as addressed."),
                ],
            ),
            disc_question(
                2,
                "Heavy rain starts mid-shift, cutting visibility.",
                &[
                    (Dominance, "Keep pace carefully so no deadline is missed."),
                    (Influence, "Notify dispatch and customers about likely delays."),
                    (Steadiness, "Slow down and increase following distance."),
                    (Compliance, "Stop somewhere safe until conditions are within policy."),
                ],
            ),
            disc_question(
                3,
                "At pickup you notice a fragile package is badly sealed.",
                &[
                    (Dominance, "Reinforce it yourself and go — no time lost."),
                    (Influence, "Ask the customer how they want to proceed."),
                    (Steadiness, "Handle it with extra care along the whole route."),
                    (Compliance, "Ask the shop to reseal it before accepting the handover."),
                ],
            ),
            disc_question(
                4,
                "Two pickups are scheduled nearly at the same time, in different places.",
                &[
                    (Dominance, "Take the system's order and push to make both windows."),
                    (Influence, "Call both shops and negotiate the pickup order."),
                    (Steadiness, "Ask dispatch to hand one pickup to another courier."),
                    (Compliance, "Map the fastest compliant route and flag the likely delay."),
                ],
            ),
        ];

        Self {
            intro: vec![
                "Hi! I'm the recruitment assistant for our courier cooperative.".into(),
                "I'll ask a few quick questions to match you with an open position. \
                 Reply with anything to get started."
                    .into(),
            ],
            city_prompt: "Which city do you work in? Pick one from the menu below.".into(),
            requirements_preamble:
                "Great! Before we continue, I need to confirm a few quick requirements.".into(),
            requirements: vec![
                RequirementQuestion {
                    key: "motorcycle".into(),
                    text: "Do you own a motorcycle with up-to-date paperwork?".into(),
                },
                RequirementQuestion {
                    key: "license".into(),
                    text: "Do you hold an active category-A driver's license?".into(),
                },
                RequirementQuestion {
                    key: "android".into(),
                    text: "Do you have an Android device to work with?".into(),
                },
            ],
            disc_preamble:
                "Excellent! Now a short scenario questionnaire to understand your work style."
                    .into(),
            disc_questions,
            vacancy_prompt: "These positions are open in your city. Pick one from the menu below."
                .into(),
            form_link_base: "https://forms.example.com/courier-signup".into(),
            messages: Messages {
                already_concluded:
                    "This conversation has concluded. Our team will reach out through the \
                     official channels."
                        .into(),
                retry_later: "I couldn't process your message right now. Please try again in a \
                              few minutes."
                    .into(),
                requirements_failed:
                    "Thanks for your interest! The position requires all the items we asked \
                     about, so we can't move forward right now. We'll keep your contact for \
                     future openings."
                        .into(),
                no_vacancy: "Thanks! There are no open positions in your city at the moment. \
                             We'll keep your profile for future openings."
                    .into(),
                escalation: "No problem — I'll ask a teammate to continue from here. You'll be \
                             contacted shortly."
                    .into(),
                form_handoff: "Your interest is registered! To finish your application, fill in \
                               the form: {link}"
                    .into(),
                yes_label: "Yes".into(),
                no_label: "No".into(),
            },
        }
    }
}

fn disc_question(
    idx: usize,
    text: &str,
    options: &[(DiscDimension, &str)],
) -> DiscQuestion {
    DiscQuestion {
        text: text.to_string(),
        options: options
            .iter()
            .enumerate()
            .map(|(i, (dimension, label))| DiscOption {
                id: format!("disc:{idx}:{i}"),
                label: (*label).to_string(),
                dimension: *dimension,
            })
            .collect(),
    }
}

//! DISC questionnaire scoring.
//!
//! One question at a time, one point per answer to exactly one of the four
//! dimension counters. The dominant dimension is the strictly highest
//! counter; ties resolve by the fixed precedence D > I > S > C, never
//! randomly.

use serde::{Deserialize, Serialize};

use crate::context::LeadContext;

/// The four behavioral dimensions, in tie-break precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscDimension {
    Dominance,
    Influence,
    Steadiness,
    Compliance,
}

impl DiscDimension {
    /// All dimensions in precedence order (highest first on ties).
    pub const ALL: [DiscDimension; 4] = [
        Self::Dominance,
        Self::Influence,
        Self::Steadiness,
        Self::Compliance,
    ];

    /// Index into a score vector.
    pub fn index(self) -> usize {
        match self {
            Self::Dominance => 0,
            Self::Influence => 1,
            Self::Steadiness => 2,
            Self::Compliance => 3,
        }
    }

    /// Single-letter label used in reports.
    pub fn letter(self) -> char {
        match self {
            Self::Dominance => 'D',
            Self::Influence => 'I',
            Self::Steadiness => 'S',
            Self::Compliance => 'C',
        }
    }
}

impl std::fmt::Display for DiscDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// One selectable option of a questionnaire scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscOption {
    /// Stable option id, also used as the button id on the wire.
    pub id: String,
    /// Full option text shown to the candidate.
    pub label: String,
    /// The single dimension this option scores.
    pub dimension: DiscDimension,
}

/// A questionnaire scenario with its options. Static configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscQuestion {
    /// Scenario text.
    pub text: String,
    pub options: Vec<DiscOption>,
}

/// A recorded answer: which question, which option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscAnswer {
    pub question_index: usize,
    pub option_id: String,
}

/// Finalized profile: dominant dimension plus the full count vector,
/// indexed by [`DiscDimension::index`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscResult {
    pub dominant: DiscDimension,
    pub scores: [u32; 4],
}

impl DiscResult {
    pub fn score(&self, dim: DiscDimension) -> u32 {
        self.scores[dim.index()]
    }
}

/// What applying an answer did to the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// Answer recorded; `complete` is true when it was the last question.
    Recorded { complete: bool },
    /// Same answer for an already-answered question — idempotent no-op.
    Replayed,
    /// Wrong question index, unknown option, or a conflicting re-answer.
    Rejected,
}

/// The next unanswered question, or `None` once the questionnaire is done.
pub fn next_question<'a>(
    questions: &'a [DiscQuestion],
    ctx: &LeadContext,
) -> Option<(usize, &'a DiscQuestion)> {
    let idx = ctx.disc_answers.len();
    questions.get(idx).map(|q| (idx, q))
}

/// Record an answer for `question_index`, enforcing order and idempotency.
///
/// On completion the result is computed and stored in `ctx.disc_result`
/// exactly once; it is never recomputed afterwards.
pub fn apply_answer(
    questions: &[DiscQuestion],
    ctx: &mut LeadContext,
    question_index: usize,
    option_id: &str,
) -> AnswerOutcome {
    // Replay of an already-recorded answer is a no-op, not a duplicate advance.
    if let Some(recorded) = ctx.disc_answers.get(question_index) {
        if recorded.option_id == option_id {
            return AnswerOutcome::Replayed;
        }
        return AnswerOutcome::Rejected;
    }

    let expected = ctx.disc_answers.len();
    if question_index != expected || ctx.disc_result.is_some() {
        return AnswerOutcome::Rejected;
    }
    let Some(question) = questions.get(question_index) else {
        return AnswerOutcome::Rejected;
    };
    if !question.options.iter().any(|o| o.id == option_id) {
        return AnswerOutcome::Rejected;
    }

    ctx.disc_answers.push(DiscAnswer {
        question_index,
        option_id: option_id.to_string(),
    });

    let complete = ctx.disc_answers.len() == questions.len();
    if complete {
        ctx.disc_result = Some(score(questions, &ctx.disc_answers));
    }
    AnswerOutcome::Recorded { complete }
}

/// Compute the count vector and dominant dimension for a full answer set.
pub fn score(questions: &[DiscQuestion], answers: &[DiscAnswer]) -> DiscResult {
    let mut scores = [0u32; 4];
    for answer in answers {
        let dim = questions
            .get(answer.question_index)
            .and_then(|q| q.options.iter().find(|o| o.id == answer.option_id))
            .map(|o| o.dimension);
        if let Some(dim) = dim {
            scores[dim.index()] += 1;
        }
    }

    // Precedence order means the first max wins ties: D > I > S > C.
    let mut dominant = DiscDimension::Dominance;
    for dim in DiscDimension::ALL {
        if scores[dim.index()] > scores[dominant.index()] {
            dominant = dim;
        }
    }

    DiscResult { dominant, scores }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::Stage;

    fn question(idx: usize, dims: &[DiscDimension]) -> DiscQuestion {
        DiscQuestion {
            text: format!("Scenario {idx}"),
            options: dims
                .iter()
                .enumerate()
                .map(|(i, &dimension)| DiscOption {
                    id: format!("disc:{idx}:{i}"),
                    label: format!("Option {i}"),
                    dimension,
                })
                .collect(),
        }
    }

    fn questionnaire() -> Vec<DiscQuestion> {
        use DiscDimension::*;
        (0..6)
            .map(|idx| question(idx, &[Dominance, Influence, Steadiness, Compliance]))
            .collect()
    }

    fn ctx() -> LeadContext {
        LeadContext::new("+5511999990001", Stage::DiscQuestionnaire)
    }

    #[test]
    fn next_question_walks_in_order() {
        let questions = questionnaire();
        let mut ctx = ctx();
        for expected in 0..questions.len() {
            let (idx, _) = next_question(&questions, &ctx).unwrap();
            assert_eq!(idx, expected);
            let option = format!("disc:{expected}:0");
            assert_eq!(
                apply_answer(&questions, &mut ctx, expected, &option),
                AnswerOutcome::Recorded {
                    complete: expected == questions.len() - 1
                }
            );
        }
        assert!(next_question(&questions, &ctx).is_none());
    }

    #[test]
    fn answers_score_their_single_dimension() {
        let questions = questionnaire();
        let mut ctx = ctx();
        // Options 0..4 map to D, I, S, C in order; pick I three times.
        let picks = [1usize, 1, 1, 0, 2, 3];
        for (idx, pick) in picks.iter().enumerate() {
            apply_answer(&questions, &mut ctx, idx, &format!("disc:{idx}:{pick}"));
        }
        let result = ctx.disc_result.expect("complete questionnaire");
        assert_eq!(result.score(DiscDimension::Dominance), 1);
        assert_eq!(result.score(DiscDimension::Influence), 3);
        assert_eq!(result.score(DiscDimension::Steadiness), 1);
        assert_eq!(result.score(DiscDimension::Compliance), 1);
        assert_eq!(result.dominant, DiscDimension::Influence);
    }

    #[test]
    fn tie_resolves_by_fixed_precedence() {
        use DiscDimension::*;
        let questions = questionnaire();

        // Full four-way tie is impossible with 6 answers; use 4.
        let four: Vec<DiscQuestion> = questions[..4].to_vec();
        let answers: Vec<DiscAnswer> = (0..4)
            .map(|idx| DiscAnswer {
                question_index: idx,
                option_id: format!("disc:{idx}:{idx}"),
            })
            .collect();
        let result = score(&four, &answers);
        assert_eq!(result.scores, [1, 1, 1, 1]);
        assert_eq!(result.dominant, Dominance);

        // S and C tied at 2, everything else lower: S wins by precedence.
        let answers: Vec<DiscAnswer> = [2usize, 2, 3, 3]
            .iter()
            .enumerate()
            .map(|(idx, pick)| DiscAnswer {
                question_index: idx,
                option_id: format!("disc:{idx}:{pick}"),
            })
            .collect();
        assert_eq!(score(&four, &answers).dominant, Steadiness);
    }

    #[test]
    fn scoring_is_deterministic() {
        let questions = questionnaire();
        let answers: Vec<DiscAnswer> = (0..6)
            .map(|idx| DiscAnswer {
                question_index: idx,
                option_id: format!("disc:{idx}:{}", idx % 4),
            })
            .collect();
        let first = score(&questions, &answers);
        for _ in 0..10 {
            assert_eq!(score(&questions, &answers), first);
        }
    }

    #[test]
    fn replay_of_recorded_answer_is_noop() {
        let questions = questionnaire();
        let mut ctx = ctx();
        apply_answer(&questions, &mut ctx, 0, "disc:0:1");
        assert_eq!(ctx.disc_answers.len(), 1);

        assert_eq!(
            apply_answer(&questions, &mut ctx, 0, "disc:0:1"),
            AnswerOutcome::Replayed
        );
        assert_eq!(ctx.disc_answers.len(), 1);
        assert!(ctx.disc_result.is_none());
    }

    #[test]
    fn conflicting_reanswer_is_rejected() {
        let questions = questionnaire();
        let mut ctx = ctx();
        apply_answer(&questions, &mut ctx, 0, "disc:0:1");
        assert_eq!(
            apply_answer(&questions, &mut ctx, 0, "disc:0:2"),
            AnswerOutcome::Rejected
        );
        assert_eq!(ctx.disc_answers[0].option_id, "disc:0:1");
    }

    #[test]
    fn out_of_order_and_unknown_options_rejected() {
        let questions = questionnaire();
        let mut ctx = ctx();
        assert_eq!(
            apply_answer(&questions, &mut ctx, 2, "disc:2:0"),
            AnswerOutcome::Rejected
        );
        assert_eq!(
            apply_answer(&questions, &mut ctx, 0, "disc:0:99"),
            AnswerOutcome::Rejected
        );
        assert!(ctx.disc_answers.is_empty());
    }

    #[test]
    fn result_is_stored_once_and_never_recomputed() {
        let questions = questionnaire();
        let mut ctx = ctx();
        for idx in 0..6 {
            apply_answer(&questions, &mut ctx, idx, &format!("disc:{idx}:0"));
        }
        let result = ctx.disc_result.clone().unwrap();

        // Any further answer attempt is rejected and leaves the result alone.
        assert_eq!(
            apply_answer(&questions, &mut ctx, 6, "disc:6:0"),
            AnswerOutcome::Rejected
        );
        assert_eq!(ctx.disc_result.unwrap(), result);
    }
}

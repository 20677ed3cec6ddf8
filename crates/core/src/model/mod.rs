mod ids;
mod question;
mod result;
mod session;
mod snapshot;

pub use ids::{ParseIdError, QuestionId, QuestionSetId, SessionId};
pub use question::{Difficulty, Question, QuestionDraft, QuestionError, QuestionKind};
pub use result::{
    AnswerOutcome, QuestionReview, ResultSummary, ResultSummaryError, SimulationResult, Tally,
    percent_half_up, score,
};
pub use session::{
    Feedback, IndexKind, SessionError, SessionMode, SessionProgress, SessionState, SessionStatus,
    TerminationReason, TickOutcome,
};
pub use snapshot::{SessionSnapshot, SnapshotError};

#[cfg(test)]
pub(crate) mod test_support {
    use super::{Difficulty, Question, QuestionDraft, QuestionId, QuestionKind, QuestionSetId};

    /// Three-option questions whose correct options are `correct[i]`.
    pub(crate) fn questions_with_answers(correct: &[usize]) -> Vec<Question> {
        correct
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                QuestionDraft {
                    id: QuestionId::new(i as u64 + 1),
                    set_id: QuestionSetId::new(1),
                    prompt: format!("Question {}", i + 1),
                    options: vec!["A".into(), "B".into(), "C".into()],
                    correct_option: c,
                    explanation: None,
                    difficulty: if i % 2 == 0 {
                        Difficulty::Easy
                    } else {
                        Difficulty::Hard
                    },
                    kind: QuestionKind::Restatement,
                    passage: None,
                }
                .validate()
                .unwrap()
            })
            .collect()
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::ids::SessionId;
use crate::model::question::{Difficulty, Question, QuestionKind};
use crate::model::session::{SessionError, SessionMode, SessionState, TerminationReason};

//
// ─── ANSWER OUTCOME ────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    Correct,
    Incorrect,
    Unanswered,
}

impl AnswerOutcome {
    #[must_use]
    pub fn classify(question: &Question, chosen: Option<usize>) -> Self {
        match chosen {
            None => AnswerOutcome::Unanswered,
            Some(option) if question.is_correct(option) => AnswerOutcome::Correct,
            Some(_) => AnswerOutcome::Incorrect,
        }
    }
}

//
// ─── RESULT ────────────────────────────────────────────────────────────────────
//

/// One row of the result review list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionReview {
    pub question: Question,
    pub chosen: Option<usize>,
    pub outcome: AnswerOutcome,
    pub flagged: bool,
}

/// Correct/total tally for a tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub total: u32,
    pub correct: u32,
}

/// Immutable scoring result of a terminal session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationResult {
    session_id: SessionId,
    mode: SessionMode,
    reason: TerminationReason,
    score_percent: u8,
    correct_count: u32,
    incorrect_count: u32,
    unanswered_count: u32,
    elapsed_seconds: u32,
    review: Vec<QuestionReview>,
}

/// Score a terminal session.
///
/// Pure and deterministic: the same state always yields the same result.
///
/// # Errors
///
/// Returns `SessionError::NotTerminal` while the session is still active.
pub fn score(state: &SessionState) -> Result<SimulationResult, SessionError> {
    let Some(reason) = state.termination_reason() else {
        return Err(SessionError::NotTerminal);
    };

    let mut correct_count = 0u32;
    let mut incorrect_count = 0u32;
    let mut unanswered_count = 0u32;

    let review: Vec<QuestionReview> = state
        .questions()
        .iter()
        .enumerate()
        .map(|(i, question)| {
            let chosen = state.answer(i);
            let outcome = AnswerOutcome::classify(question, chosen);
            match outcome {
                AnswerOutcome::Correct => correct_count += 1,
                AnswerOutcome::Incorrect => incorrect_count += 1,
                AnswerOutcome::Unanswered => unanswered_count += 1,
            }
            QuestionReview {
                question: question.clone(),
                chosen,
                outcome,
                flagged: state.is_flagged(i),
            }
        })
        .collect();

    let total = correct_count + incorrect_count + unanswered_count;
    Ok(SimulationResult {
        session_id: state.id(),
        mode: state.mode(),
        reason,
        score_percent: percent_half_up(correct_count, total),
        correct_count,
        incorrect_count,
        unanswered_count,
        elapsed_seconds: state.elapsed_seconds(),
        review,
    })
}

/// `round(100 * part / total)` with halves rounded up, in integer arithmetic.
#[must_use]
pub fn percent_half_up(part: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let part = u64::from(part.min(total));
    let total = u64::from(total);
    let pct = (200 * part + total) / (2 * total);
    u8::try_from(pct).unwrap_or(100)
}

impl SimulationResult {
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    #[must_use]
    pub fn reason(&self) -> TerminationReason {
        self.reason
    }

    #[must_use]
    pub fn score_percent(&self) -> u8 {
        self.score_percent
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    #[must_use]
    pub fn incorrect_count(&self) -> u32 {
        self.incorrect_count
    }

    #[must_use]
    pub fn unanswered_count(&self) -> u32 {
        self.unanswered_count
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.correct_count + self.incorrect_count + self.unanswered_count
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> u32 {
        self.elapsed_seconds
    }

    #[must_use]
    pub fn review(&self) -> &[QuestionReview] {
        &self.review
    }

    #[must_use]
    pub fn breakdown_by_kind(&self) -> BTreeMap<QuestionKind, Tally> {
        self.breakdown(|q| q.kind())
    }

    #[must_use]
    pub fn breakdown_by_difficulty(&self) -> BTreeMap<Difficulty, Tally> {
        self.breakdown(|q| q.difficulty())
    }

    fn breakdown<K: Ord>(&self, key: impl Fn(&Question) -> K) -> BTreeMap<K, Tally> {
        let mut out: BTreeMap<K, Tally> = BTreeMap::new();
        for row in &self.review {
            let tally = out.entry(key(&row.question)).or_default();
            tally.total += 1;
            if row.outcome == AnswerOutcome::Correct {
                tally.correct += 1;
            }
        }
        out
    }

    /// Persistable projection of this result.
    #[must_use]
    pub fn summary(&self, completed_at: DateTime<Utc>) -> ResultSummary {
        ResultSummary {
            session_id: self.session_id,
            mode: self.mode,
            reason: self.reason,
            completed_at,
            total_questions: self.total_questions(),
            correct: self.correct_count,
            incorrect: self.incorrect_count,
            unanswered: self.unanswered_count,
            score_percent: self.score_percent,
            elapsed_seconds: self.elapsed_seconds,
        }
    }
}

//
// ─── SUMMARY ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResultSummaryError {
    #[error("total questions ({total}) does not match outcome counts ({sum})")]
    CountMismatch { total: u32, sum: u32 },

    #[error("score {0} is above 100")]
    InvalidScore(u8),
}

/// Aggregate counts kept in the result history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSummary {
    session_id: SessionId,
    mode: SessionMode,
    reason: TerminationReason,
    completed_at: DateTime<Utc>,
    total_questions: u32,
    correct: u32,
    incorrect: u32,
    unanswered: u32,
    score_percent: u8,
    elapsed_seconds: u32,
}

impl ResultSummary {
    /// Rehydrate a result summary from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ResultSummaryError` if counts do not add up or the score is invalid.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        session_id: SessionId,
        mode: SessionMode,
        reason: TerminationReason,
        completed_at: DateTime<Utc>,
        total_questions: u32,
        correct: u32,
        incorrect: u32,
        unanswered: u32,
        score_percent: u8,
        elapsed_seconds: u32,
    ) -> Result<Self, ResultSummaryError> {
        let sum = correct + incorrect + unanswered;
        if sum != total_questions {
            return Err(ResultSummaryError::CountMismatch {
                total: total_questions,
                sum,
            });
        }
        if score_percent > 100 {
            return Err(ResultSummaryError::InvalidScore(score_percent));
        }

        Ok(Self {
            session_id,
            mode,
            reason,
            completed_at,
            total_questions,
            correct,
            incorrect,
            unanswered,
            score_percent,
            elapsed_seconds,
        })
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    #[must_use]
    pub fn reason(&self) -> TerminationReason {
        self.reason
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn correct(&self) -> u32 {
        self.correct
    }

    #[must_use]
    pub fn incorrect(&self) -> u32 {
        self.incorrect
    }

    #[must_use]
    pub fn unanswered(&self) -> u32 {
        self.unanswered
    }

    #[must_use]
    pub fn score_percent(&self) -> u8 {
        self.score_percent
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> u32 {
        self.elapsed_seconds
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

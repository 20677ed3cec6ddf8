use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::SessionId;
use crate::model::question::Question;
use crate::model::session::{SessionMode, SessionState, SessionStatus};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SnapshotError {
    #[error("snapshot has no questions")]
    NoQuestions,

    #[error("snapshot {field} has {actual} entries, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("current index {index} is out of range for {len} questions")]
    CurrentIndexOutOfRange { index: usize, len: usize },

    #[error("answer for question {question} is option {option}, which does not exist")]
    AnswerOutOfRange { question: usize, option: usize },

    #[error("remaining time {remaining}s exceeds duration {duration}s")]
    RemainingExceedsDuration { remaining: u32, duration: u32 },

    #[error("active snapshot has no remaining time")]
    ActiveWithoutTime,
}

/// Serializable projection of a [`SessionState`], sufficient to rebuild it exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub mode: SessionMode,
    pub questions: Vec<Question>,
    pub current_index: usize,
    pub answers: Vec<Option<usize>>,
    pub flags: Vec<bool>,
    #[serde(default)]
    pub revealed: Vec<bool>,
    pub duration_seconds: u32,
    pub remaining_seconds: u32,
    pub status: SessionStatus,
    pub revision: u64,
    pub saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn capture(state: &SessionState, saved_at: DateTime<Utc>) -> Self {
        Self {
            session_id: state.id,
            mode: state.mode,
            questions: state.questions.clone(),
            current_index: state.current_index,
            answers: state.answers.clone(),
            flags: state.flags.clone(),
            revealed: state.revealed.clone(),
            duration_seconds: state.duration_seconds,
            remaining_seconds: state.remaining_seconds,
            status: state.status,
            revision: state.revision,
            saved_at,
        }
    }

    /// Rebuild the session this snapshot was captured from.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` if the snapshot breaks a session invariant.
    pub fn restore(self) -> Result<SessionState, SnapshotError> {
        let len = self.questions.len();
        if len == 0 {
            return Err(SnapshotError::NoQuestions);
        }
        check_len("answers", len, self.answers.len())?;
        check_len("flags", len, self.flags.len())?;
        // Older checkpoints predate practice reveal tracking.
        let revealed = if self.revealed.is_empty() {
            vec![false; len]
        } else {
            check_len("revealed", len, self.revealed.len())?;
            self.revealed
        };
        if self.current_index >= len {
            return Err(SnapshotError::CurrentIndexOutOfRange {
                index: self.current_index,
                len,
            });
        }
        for (question, (answer, q)) in self.answers.iter().zip(&self.questions).enumerate() {
            if let Some(option) = *answer {
                if option >= q.option_count() {
                    return Err(SnapshotError::AnswerOutOfRange { question, option });
                }
            }
        }
        if self.remaining_seconds > self.duration_seconds {
            return Err(SnapshotError::RemainingExceedsDuration {
                remaining: self.remaining_seconds,
                duration: self.duration_seconds,
            });
        }
        if self.status == SessionStatus::Active && self.remaining_seconds == 0 {
            return Err(SnapshotError::ActiveWithoutTime);
        }

        Ok(SessionState {
            id: self.session_id,
            mode: self.mode,
            questions: self.questions,
            current_index: self.current_index,
            answers: self.answers,
            flags: self.flags,
            revealed,
            duration_seconds: self.duration_seconds,
            remaining_seconds: self.remaining_seconds,
            status: self.status,
            revision: self.revision,
        })
    }
}

fn check_len(field: &'static str, expected: usize, actual: usize) -> Result<(), SnapshotError> {
    if expected != actual {
        return Err(SnapshotError::LengthMismatch {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::SessionId;
use crate::model::question::Question;
use crate::model::result::AnswerOutcome;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Which index an `OutOfRange` error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Question,
    Option,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Question => f.write_str("question"),
            IndexKind::Option => f.write_str("option"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("invalid session configuration: {0}")]
    InvalidConfiguration(String),

    #[error("{kind} index {index} is out of range (len {len})")]
    OutOfRange {
        kind: IndexKind,
        index: usize,
        len: usize,
    },

    #[error("session has already been submitted")]
    SessionTerminated,

    #[error("exam mode does not allow going back from question {current} to {requested}")]
    BackwardNavigationForbidden { current: usize, requested: usize },

    #[error("session is still active")]
    NotTerminal,

    #[error("answers cannot be revealed in exam mode")]
    RevealForbidden,
}

//
// ─── MODE & STATUS ─────────────────────────────────────────────────────────────
//

/// Session policy.
///
/// - `Practice`: free navigation, answers may be revealed immediately.
/// - `Exam`: forward-only navigation, no reveal until the result screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Practice,
    Exam,
}

impl SessionMode {
    #[must_use]
    pub fn allows_backward_navigation(self) -> bool {
        matches!(self, SessionMode::Practice)
    }

    #[must_use]
    pub fn allows_reveal(self) -> bool {
        matches!(self, SessionMode::Practice)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::Practice => "practice",
            SessionMode::Exam => "exam",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "practice" => Ok(Self::Practice),
            "exam" => Ok(Self::Exam),
            other => Err(SessionError::InvalidConfiguration(format!(
                "unknown session mode: {other}"
            ))),
        }
    }
}

/// Why a session stopped accepting input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Submitted,
    TimedOut,
}

impl TerminationReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TerminationReason::Submitted => "submitted",
            TerminationReason::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TerminationReason {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(Self::Submitted),
            "timed_out" => Ok(Self::TimedOut),
            other => Err(SessionError::InvalidConfiguration(format!(
                "unknown termination reason: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum SessionStatus {
    Active,
    Terminal(TerminationReason),
}

//
// ─── OPERATION OUTPUTS ─────────────────────────────────────────────────────────
//

/// Outcome of applying elapsed time to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running { remaining_seconds: u32 },
    /// This call moved the session to `Terminal(TimedOut)`.
    Expired,
}

/// Practice-mode feedback for a single question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub question_index: usize,
    pub correct_option: usize,
    pub chosen: Option<usize>,
    pub outcome: AnswerOutcome,
    pub explanation: Option<String>,
}

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub flagged: usize,
    pub current_index: usize,
    pub remaining_seconds: u32,
    pub is_complete: bool,
}

//
// ─── SESSION STATE ─────────────────────────────────────────────────────────────
//

/// Single source of truth for an in-progress simulation.
///
/// Every mutating operation validates its input and either applies fully or
/// returns an error without touching state. Once the session is terminal
/// nothing but `submit` (a no-op) is accepted.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionState {
    pub(crate) id: SessionId,
    pub(crate) mode: SessionMode,
    pub(crate) questions: Vec<Question>,
    pub(crate) current_index: usize,
    pub(crate) answers: Vec<Option<usize>>,
    pub(crate) flags: Vec<bool>,
    pub(crate) revealed: Vec<bool>,
    pub(crate) duration_seconds: u32,
    pub(crate) remaining_seconds: u32,
    pub(crate) status: SessionStatus,
    pub(crate) revision: u64,
}

impl SessionState {
    /// Start a new session over `questions`, preserving their order.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidConfiguration` if `questions` is empty or
    /// `duration_seconds` is zero.
    pub fn initialize(
        questions: Vec<Question>,
        mode: SessionMode,
        duration_seconds: u32,
    ) -> Result<Self, SessionError> {
        if questions.is_empty() {
            return Err(SessionError::InvalidConfiguration(
                "a session needs at least one question".into(),
            ));
        }
        if duration_seconds == 0 {
            return Err(SessionError::InvalidConfiguration(
                "duration must be greater than zero".into(),
            ));
        }

        let len = questions.len();
        Ok(Self {
            id: SessionId::generate(),
            mode,
            questions,
            current_index: 0,
            answers: vec![None; len],
            flags: vec![false; len],
            revealed: vec![false; len],
            duration_seconds,
            remaining_seconds: duration_seconds,
            status: SessionStatus::Active,
            revision: 0,
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn current_question(&self) -> &Question {
        &self.questions[self.current_index]
    }

    #[must_use]
    pub fn answers(&self) -> &[Option<usize>] {
        &self.answers
    }

    #[must_use]
    pub fn answer(&self, question_index: usize) -> Option<usize> {
        self.answers.get(question_index).copied().flatten()
    }

    #[must_use]
    pub fn flags(&self) -> &[bool] {
        &self.flags
    }

    #[must_use]
    pub fn is_flagged(&self, question_index: usize) -> bool {
        self.flags.get(question_index).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn is_revealed(&self, question_index: usize) -> bool {
        self.revealed.get(question_index).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn flagged_indices(&self) -> Vec<usize> {
        self.flags
            .iter()
            .enumerate()
            .filter_map(|(i, flagged)| flagged.then_some(i))
            .collect()
    }

    #[must_use]
    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> u32 {
        self.duration_seconds.saturating_sub(self.remaining_seconds)
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Monotonic counter bumped on every applied mutation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn is_timer_active(&self) -> bool {
        matches!(self.status, SessionStatus::Active)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.is_timer_active()
    }

    #[must_use]
    pub fn termination_reason(&self) -> Option<TerminationReason> {
        match self.status {
            SessionStatus::Active => None,
            SessionStatus::Terminal(reason) => Some(reason),
        }
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_some()).count()
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            total: self.total_questions(),
            answered: self.answered_count(),
            flagged: self.flags.iter().filter(|f| **f).count(),
            current_index: self.current_index,
            remaining_seconds: self.remaining_seconds,
            is_complete: self.is_terminal(),
        }
    }

    /// Record `option_index` as the answer to `question_index`, replacing any
    /// previous answer.
    ///
    /// In exam mode questions behind `current_index` are locked.
    ///
    /// # Errors
    ///
    /// Returns `SessionTerminated`, `OutOfRange`, or
    /// `BackwardNavigationForbidden` for a locked exam question.
    pub fn select_answer(
        &mut self,
        question_index: usize,
        option_index: usize,
    ) -> Result<(), SessionError> {
        self.ensure_active()?;
        let question = self.question_at(question_index)?;
        if option_index >= question.option_count() {
            return Err(SessionError::OutOfRange {
                kind: IndexKind::Option,
                index: option_index,
                len: question.option_count(),
            });
        }
        self.ensure_reachable(question_index)?;

        self.answers[question_index] = Some(option_index);
        self.bump();
        Ok(())
    }

    /// Flip the review flag on `question_index` and return the new value.
    ///
    /// # Errors
    ///
    /// Returns `SessionTerminated` or `OutOfRange`.
    pub fn toggle_flag(&mut self, question_index: usize) -> Result<bool, SessionError> {
        self.ensure_active()?;
        self.question_at(question_index)?;

        let flagged = !self.flags[question_index];
        self.flags[question_index] = flagged;
        self.bump();
        Ok(flagged)
    }

    /// Move to `question_index`.
    ///
    /// # Errors
    ///
    /// Returns `SessionTerminated`, `OutOfRange`, or
    /// `BackwardNavigationForbidden` when going back in exam mode.
    pub fn navigate_to(&mut self, question_index: usize) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.question_at(question_index)?;
        self.ensure_reachable(question_index)?;

        if question_index != self.current_index {
            self.current_index = question_index;
            self.bump();
        }
        Ok(())
    }

    /// Move one question forward.
    ///
    /// # Errors
    ///
    /// Same as [`SessionState::navigate_to`]; `OutOfRange` on the last question.
    pub fn next(&mut self) -> Result<(), SessionError> {
        self.navigate_to(self.current_index + 1)
    }

    /// Move one question back.
    ///
    /// # Errors
    ///
    /// Same as [`SessionState::navigate_to`]; `OutOfRange` on the first question.
    pub fn previous(&mut self) -> Result<(), SessionError> {
        self.ensure_active()?;
        let Some(target) = self.current_index.checked_sub(1) else {
            return Err(SessionError::OutOfRange {
                kind: IndexKind::Question,
                index: 0,
                len: self.questions.len(),
            });
        };
        self.navigate_to(target)
    }

    /// Practice-mode immediate feedback for `question_index`.
    ///
    /// # Errors
    ///
    /// Returns `SessionTerminated`, `RevealForbidden` in exam mode, or `OutOfRange`.
    pub fn reveal(&mut self, question_index: usize) -> Result<Feedback, SessionError> {
        self.ensure_active()?;
        if !self.mode.allows_reveal() {
            return Err(SessionError::RevealForbidden);
        }
        let question = self.question_at(question_index)?;
        let chosen = self.answers[question_index];
        let feedback = Feedback {
            question_index,
            correct_option: question.correct_option(),
            chosen,
            outcome: AnswerOutcome::classify(question, chosen),
            explanation: question.explanation().map(str::to_owned),
        };

        if !self.revealed[question_index] {
            self.revealed[question_index] = true;
            self.bump();
        }
        Ok(feedback)
    }

    /// Apply one elapsed second.
    ///
    /// # Errors
    ///
    /// Returns `SessionTerminated` if the session already ended.
    pub fn tick(&mut self) -> Result<TickOutcome, SessionError> {
        self.elapse(1)
    }

    /// Apply `seconds` of elapsed time at once.
    ///
    /// The countdown saturates at zero, and the session times out exactly once.
    ///
    /// # Errors
    ///
    /// Returns `SessionTerminated` if the session already ended.
    pub fn elapse(&mut self, seconds: u32) -> Result<TickOutcome, SessionError> {
        self.ensure_active()?;
        if seconds == 0 {
            return Ok(TickOutcome::Running {
                remaining_seconds: self.remaining_seconds,
            });
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(seconds);
        self.bump();
        if self.remaining_seconds == 0 {
            self.status = SessionStatus::Terminal(TerminationReason::TimedOut);
            return Ok(TickOutcome::Expired);
        }
        Ok(TickOutcome::Running {
            remaining_seconds: self.remaining_seconds,
        })
    }

    /// End the session. Returns `true` if this call performed the transition.
    pub fn submit(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = SessionStatus::Terminal(TerminationReason::Submitted);
        self.bump();
        true
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.is_terminal() {
            return Err(SessionError::SessionTerminated);
        }
        Ok(())
    }

    fn ensure_reachable(&self, question_index: usize) -> Result<(), SessionError> {
        if question_index < self.current_index && !self.mode.allows_backward_navigation() {
            return Err(SessionError::BackwardNavigationForbidden {
                current: self.current_index,
                requested: question_index,
            });
        }
        Ok(())
    }

    fn question_at(&self, question_index: usize) -> Result<&Question, SessionError> {
        self.questions
            .get(question_index)
            .ok_or(SessionError::OutOfRange {
                kind: IndexKind::Question,
                index: question_index,
                len: self.questions.len(),
            })
    }

    fn bump(&mut self) {
        self.revision += 1;
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("questions_len", &self.questions.len())
            .field("current_index", &self.current_index)
            .field("answered", &self.answered_count())
            .field("remaining_seconds", &self.remaining_seconds)
            .field("status", &self.status)
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

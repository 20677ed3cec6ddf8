use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{QuestionId, QuestionSetId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("question needs at least two options, got {count}")]
    TooFewOptions { count: usize },

    #[error("option {index} is empty")]
    EmptyOption { index: usize },

    #[error("correct option {index} is out of bounds for {len} options")]
    CorrectOptionOutOfBounds { index: usize, len: usize },

    #[error("unknown difficulty: {0}")]
    UnknownDifficulty(String),

    #[error("unknown question kind: {0}")]
    UnknownKind(String),
}

//
// ─── TAGS ──────────────────────────────────────────────────────────────────────
//

/// Difficulty tag attached to every question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(QuestionError::UnknownDifficulty(other.to_string())),
        }
    }
}

/// Question type tag.
///
/// Mirrors the sections of the psychometric English exam the question bank
/// is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SentenceCompletion,
    Restatement,
    ReadingComprehension,
    Vocabulary,
}

impl QuestionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::SentenceCompletion => "sentence_completion",
            QuestionKind::Restatement => "restatement",
            QuestionKind::ReadingComprehension => "reading_comprehension",
            QuestionKind::Vocabulary => "vocabulary",
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionKind {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sentence_completion" => Ok(Self::SentenceCompletion),
            "restatement" => Ok(Self::Restatement),
            "reading_comprehension" => Ok(Self::ReadingComprehension),
            "vocabulary" => Ok(Self::Vocabulary),
            other => Err(QuestionError::UnknownKind(other.to_string())),
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A single multiple-choice question, read-only to the session.
///
/// Construct through [`QuestionDraft::validate`] so that the correct option
/// index is always within bounds of `options`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuestionDraft", into = "QuestionDraft")]
pub struct Question {
    id: QuestionId,
    set_id: QuestionSetId,
    prompt: String,
    options: Vec<String>,
    correct_option: usize,
    explanation: Option<String>,
    difficulty: Difficulty,
    kind: QuestionKind,
    passage: Option<String>,
}

/// Unvalidated question shape, as read from an import file or a database row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub id: QuestionId,
    pub set_id: QuestionSetId,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option: usize,
    #[serde(default)]
    pub explanation: Option<String>,
    pub difficulty: Difficulty,
    pub kind: QuestionKind,
    #[serde(default)]
    pub passage: Option<String>,
}

impl QuestionDraft {
    /// Validate the draft into a `Question`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt or an option is blank, fewer than
    /// two options are given, or `correct_option` is out of bounds.
    pub fn validate(self) -> Result<Question, QuestionError> {
        if self.prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        if self.options.len() < 2 {
            return Err(QuestionError::TooFewOptions {
                count: self.options.len(),
            });
        }
        if let Some(index) = self.options.iter().position(|o| o.trim().is_empty()) {
            return Err(QuestionError::EmptyOption { index });
        }
        if self.correct_option >= self.options.len() {
            return Err(QuestionError::CorrectOptionOutOfBounds {
                index: self.correct_option,
                len: self.options.len(),
            });
        }

        Ok(Question {
            id: self.id,
            set_id: self.set_id,
            prompt: self.prompt,
            options: self.options,
            correct_option: self.correct_option,
            explanation: self.explanation.filter(|e| !e.trim().is_empty()),
            difficulty: self.difficulty,
            kind: self.kind,
            passage: self.passage.filter(|p| !p.trim().is_empty()),
        })
    }
}

impl TryFrom<QuestionDraft> for Question {
    type Error = QuestionError;

    fn try_from(draft: QuestionDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl From<Question> for QuestionDraft {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            set_id: q.set_id,
            prompt: q.prompt,
            options: q.options,
            correct_option: q.correct_option,
            explanation: q.explanation,
            difficulty: q.difficulty,
            kind: q.kind,
            passage: q.passage,
        }
    }
}

impl Question {
    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn set_id(&self) -> QuestionSetId {
        self.set_id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    #[must_use]
    pub fn correct_option(&self) -> usize {
        self.correct_option
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    #[must_use]
    pub fn passage(&self) -> Option<&str> {
        self.passage.as_deref()
    }

    #[must_use]
    pub fn is_correct(&self, option: usize) -> bool {
        option == self.correct_option
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> QuestionDraft {
        QuestionDraft {
            id: QuestionId::new(1),
            set_id: QuestionSetId::new(7),
            prompt: "The committee ____ the proposal.".into(),
            options: vec!["rejected".into(), "rejecting".into(), "reject".into()],
            correct_option: 0,
            explanation: Some("Past tense fits the sentence.".into()),
            difficulty: Difficulty::Medium,
            kind: QuestionKind::SentenceCompletion,
            passage: None,
        }
    }

    #[test]
    fn valid_draft_builds_question() {
        let q = draft().validate().unwrap();
        assert_eq!(q.option_count(), 3);
        assert!(q.is_correct(0));
        assert!(!q.is_correct(2));
        assert_eq!(q.explanation(), Some("Past tense fits the sentence."));
    }

    #[test]
    fn correct_option_must_be_in_bounds() {
        let mut d = draft();
        d.correct_option = 3;
        assert_eq!(
            d.validate().unwrap_err(),
            QuestionError::CorrectOptionOutOfBounds { index: 3, len: 3 }
        );
    }

    #[test]
    fn blank_prompt_is_rejected() {
        let mut d = draft();
        d.prompt = "  ".into();
        assert_eq!(d.validate().unwrap_err(), QuestionError::EmptyPrompt);
    }

    #[test]
    fn blank_option_is_rejected() {
        let mut d = draft();
        d.options[1] = String::new();
        assert_eq!(
            d.validate().unwrap_err(),
            QuestionError::EmptyOption { index: 1 }
        );
    }

    #[test]
    fn single_option_is_rejected() {
        let mut d = draft();
        d.options.truncate(1);
        assert_eq!(
            d.validate().unwrap_err(),
            QuestionError::TooFewOptions { count: 1 }
        );
    }

    #[test]
    fn blank_explanation_is_dropped() {
        let mut d = draft();
        d.explanation = Some(" ".into());
        assert_eq!(d.validate().unwrap().explanation(), None);
    }

    #[test]
    fn tags_parse_from_storage_strings() {
        assert_eq!("HARD".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert_eq!(
            "reading_comprehension".parse::<QuestionKind>().unwrap(),
            QuestionKind::ReadingComprehension
        );
        assert!("trivia".parse::<QuestionKind>().is_err());
    }

    #[test]
    fn deserializing_invalid_question_fails() {
        let raw = r#"{
            "id": 1, "set_id": 1, "prompt": "Q", "options": ["a", "b"],
            "correct_option": 5, "difficulty": "easy", "kind": "vocabulary"
        }"#;
        let parsed: Result<Question, _> = serde_json::from_str(raw);
        assert!(parsed.is_err());
    }
}

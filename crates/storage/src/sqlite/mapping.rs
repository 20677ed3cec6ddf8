use exam_core::model::{
    Question, QuestionDraft, QuestionId, QuestionSetId, ResultSummary, SessionId, SessionMode,
    TerminationReason,
};
use sqlx::Row;

use crate::repository::{ResultRow, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn usize_from_i64(field: &'static str, v: i64) -> Result<usize, StorageError> {
    usize::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn session_id_from_str(raw: &str) -> Result<SessionId, StorageError> {
    raw.parse::<SessionId>().map_err(ser)
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let options_json: String = row.try_get("options").map_err(ser)?;
    let options: Vec<String> = serde_json::from_str(&options_json).map_err(ser)?;
    let difficulty: String = row.try_get("difficulty").map_err(ser)?;
    let kind: String = row.try_get("kind").map_err(ser)?;

    QuestionDraft {
        id: QuestionId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        set_id: QuestionSetId::new(i64_to_u64("set_id", row.try_get("set_id").map_err(ser)?)?),
        prompt: row.try_get("prompt").map_err(ser)?,
        options,
        correct_option: usize_from_i64(
            "correct_option",
            row.try_get("correct_option").map_err(ser)?,
        )?,
        explanation: row.try_get("explanation").map_err(ser)?,
        difficulty: difficulty.parse().map_err(ser)?,
        kind: kind.parse().map_err(ser)?,
        passage: row.try_get("passage").map_err(ser)?,
    }
    .validate()
    .map_err(ser)
}

pub(crate) fn map_result_row(row: &sqlx::sqlite::SqliteRow) -> Result<ResultRow, StorageError> {
    let id: i64 = row.try_get("id").map_err(ser)?;
    let session_id = session_id_from_str(&row.try_get::<String, _>("session_id").map_err(ser)?)?;
    let mode: SessionMode = row
        .try_get::<String, _>("mode")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let reason: TerminationReason = row
        .try_get::<String, _>("reason")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let score: i64 = row.try_get("score_percent").map_err(ser)?;
    let score = u8::try_from(score)
        .map_err(|_| StorageError::Serialization(format!("invalid score_percent: {score}")))?;

    let summary = ResultSummary::from_persisted(
        session_id,
        mode,
        reason,
        row.try_get("completed_at").map_err(ser)?,
        u32_from_i64("total_questions", row.try_get("total_questions").map_err(ser)?)?,
        u32_from_i64("correct", row.try_get("correct").map_err(ser)?)?,
        u32_from_i64("incorrect", row.try_get("incorrect").map_err(ser)?)?,
        u32_from_i64("unanswered", row.try_get("unanswered").map_err(ser)?)?,
        score,
        u32_from_i64("elapsed_seconds", row.try_get("elapsed_seconds").map_err(ser)?)?,
    )
    .map_err(ser)?;

    Ok(ResultRow::new(id, summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_ids_are_rejected() {
        assert!(i64_to_u64("id", -1).is_err());
        assert_eq!(i64_to_u64("id", 7).unwrap(), 7);
    }

    #[test]
    fn oversized_ids_are_rejected() {
        assert!(id_i64("id", u64::MAX).is_err());
    }

    #[test]
    fn session_id_parse_errors_are_serialization_errors() {
        assert!(matches!(
            session_id_from_str("nope"),
            Err(StorageError::Serialization(_))
        ));
    }
}

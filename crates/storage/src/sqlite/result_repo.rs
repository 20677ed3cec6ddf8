use async_trait::async_trait;
use exam_core::model::ResultSummary;

use super::SqliteRepository;
use super::mapping::{conn, map_result_row};
use crate::repository::{ResultRepository, ResultRow, StorageError};

const RESULT_COLUMNS: &str = r"
    id, session_id, mode, reason, completed_at, total_questions,
    correct, incorrect, unanswered, score_percent, elapsed_seconds
";

#[async_trait]
impl ResultRepository for SqliteRepository {
    async fn append_result(&self, summary: &ResultSummary) -> Result<i64, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO simulation_results (
                    session_id, mode, reason, completed_at, total_questions,
                    correct, incorrect, unanswered, score_percent, elapsed_seconds
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
        )
        .bind(summary.session_id().to_string())
        .bind(summary.mode().as_str())
        .bind(summary.reason().as_str())
        .bind(summary.completed_at())
        .bind(i64::from(summary.total_questions()))
        .bind(i64::from(summary.correct()))
        .bind(i64::from(summary.incorrect()))
        .bind(i64::from(summary.unanswered()))
        .bind(i64::from(summary.score_percent()))
        .bind(i64::from(summary.elapsed_seconds()))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(res.last_insert_rowid())
    }

    async fn get_result(&self, id: i64) -> Result<ResultSummary, StorageError> {
        let sql = format!("SELECT {RESULT_COLUMNS} FROM simulation_results WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        Ok(map_result_row(&row)?.summary)
    }

    async fn list_results(&self, limit: u32) -> Result<Vec<ResultRow>, StorageError> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM simulation_results \
             ORDER BY completed_at DESC, id DESC LIMIT ?1"
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_result_row(&row)?);
        }
        Ok(out)
    }
}

use async_trait::async_trait;
use exam_core::model::{Question, QuestionSetId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_question_row, ser};
use crate::repository::{QuestionCatalog, QuestionSelector, QuestionSupply, StorageError};

#[async_trait]
impl QuestionSupply for SqliteRepository {
    async fn fetch(&self, selector: &QuestionSelector) -> Result<Vec<Question>, StorageError> {
        let mut sql = String::from(
            r"
                SELECT
                    id, set_id, prompt, options, correct_option,
                    explanation, difficulty, kind, passage
                FROM questions
                WHERE 1 = 1
            ",
        );

        let mut bind_index = 1;
        if selector.set_id.is_some() {
            sql.push_str(" AND set_id = ?");
            sql.push_str(&bind_index.to_string());
            bind_index += 1;
        }
        if selector.kind.is_some() {
            sql.push_str(" AND kind = ?");
            sql.push_str(&bind_index.to_string());
            bind_index += 1;
        }
        if selector.difficulty.is_some() {
            sql.push_str(" AND difficulty = ?");
            sql.push_str(&bind_index.to_string());
            bind_index += 1;
        }
        sql.push_str(" ORDER BY set_id ASC, position ASC, id ASC");
        if selector.limit.is_some() {
            sql.push_str(" LIMIT ?");
            sql.push_str(&bind_index.to_string());
        }

        let mut query = sqlx::query(&sql);
        if let Some(set_id) = selector.set_id {
            query = query.bind(id_i64("set_id", set_id.value())?);
        }
        if let Some(kind) = selector.kind {
            query = query.bind(kind.as_str());
        }
        if let Some(difficulty) = selector.difficulty {
            query = query.bind(difficulty.as_str());
        }
        if let Some(limit) = selector.limit {
            query = query.bind(i64::from(limit));
        }

        let rows = query.fetch_all(&self.pool).await.map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_question_row(&row)?);
        }
        Ok(out)
    }
}

#[async_trait]
impl QuestionCatalog for SqliteRepository {
    async fn upsert_question(&self, question: &Question, position: u32) -> Result<(), StorageError> {
        let options = serde_json::to_string(question.options()).map_err(ser)?;
        let correct_option = i64::try_from(question.correct_option())
            .map_err(|_| StorageError::Serialization("correct_option overflow".into()))?;

        sqlx::query(
            r"
                INSERT INTO questions (
                    id, set_id, position, prompt, options, correct_option,
                    explanation, difficulty, kind, passage
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(id) DO UPDATE SET
                    set_id = excluded.set_id,
                    position = excluded.position,
                    prompt = excluded.prompt,
                    options = excluded.options,
                    correct_option = excluded.correct_option,
                    explanation = excluded.explanation,
                    difficulty = excluded.difficulty,
                    kind = excluded.kind,
                    passage = excluded.passage
            ",
        )
        .bind(id_i64("id", question.id().value())?)
        .bind(id_i64("set_id", question.set_id().value())?)
        .bind(i64::from(position))
        .bind(question.prompt())
        .bind(options)
        .bind(correct_option)
        .bind(question.explanation())
        .bind(question.difficulty().as_str())
        .bind(question.kind().as_str())
        .bind(question.passage())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn count_questions(&self, set_id: QuestionSetId) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM questions WHERE set_id = ?1")
            .bind(id_i64("set_id", set_id.value())?)
            .fetch_one(&self.pool)
            .await
            .map_err(conn)?;
        let n: i64 = row.try_get("n").map_err(ser)?;
        u64::try_from(n).map_err(ser)
    }
}

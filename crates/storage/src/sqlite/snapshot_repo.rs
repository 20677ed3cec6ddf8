use async_trait::async_trait;
use exam_core::model::{SessionId, SessionSnapshot, SessionStatus};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, ser};
use crate::repository::{SnapshotRepository, StorageError};

fn status_label(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Active => "active",
        SessionStatus::Terminal(reason) => reason.as_str(),
    }
}

#[async_trait]
impl SnapshotRepository for SqliteRepository {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let payload = serde_json::to_string(snapshot).map_err(ser)?;
        let revision = i64::try_from(snapshot.revision)
            .map_err(|_| StorageError::Serialization("revision overflow".into()))?;

        // Writes that arrive out of order must not roll a checkpoint back.
        let res = sqlx::query(
            r"
                INSERT INTO session_snapshots (session_id, revision, status, saved_at, payload)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(session_id) DO UPDATE SET
                    revision = excluded.revision,
                    status = excluded.status,
                    saved_at = excluded.saved_at,
                    payload = excluded.payload
                WHERE excluded.revision >= session_snapshots.revision
            ",
        )
        .bind(snapshot.session_id.to_string())
        .bind(revision)
        .bind(status_label(snapshot.status))
        .bind(snapshot.saved_at)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            tracing::debug!(
                session_id = %snapshot.session_id,
                revision = snapshot.revision,
                "skipped stale checkpoint"
            );
        }
        Ok(())
    }

    async fn load(&self, id: SessionId) -> Result<Option<SessionSnapshot>, StorageError> {
        let row = sqlx::query("SELECT payload FROM session_snapshots WHERE session_id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payload: String = row.try_get("payload").map_err(ser)?;
        let snapshot: SessionSnapshot = serde_json::from_str(&payload).map_err(ser)?;
        Ok(Some(snapshot))
    }

    async fn delete(&self, id: SessionId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM session_snapshots WHERE session_id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::TerminationReason;

    #[test]
    fn status_labels_match_reason_names() {
        assert_eq!(status_label(SessionStatus::Active), "active");
        assert_eq!(
            status_label(SessionStatus::Terminal(TerminationReason::TimedOut)),
            "timed_out"
        );
    }
}

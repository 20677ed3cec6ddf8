use async_trait::async_trait;
use exam_core::model::{
    Difficulty, Question, QuestionId, QuestionKind, QuestionSetId, ResultSummary, SessionId,
    SessionSnapshot,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── QUESTION SUPPLY ───────────────────────────────────────────────────────────
//

/// Which questions a simulation is built from.
///
/// Unset filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionSelector {
    pub set_id: Option<QuestionSetId>,
    pub kind: Option<QuestionKind>,
    pub difficulty: Option<Difficulty>,
    pub limit: Option<u32>,
}

impl QuestionSelector {
    #[must_use]
    pub fn for_set(set_id: QuestionSetId) -> Self {
        Self {
            set_id: Some(set_id),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: QuestionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn matches(&self, question: &Question) -> bool {
        self.set_id.is_none_or(|id| question.set_id() == id)
            && self.kind.is_none_or(|k| question.kind() == k)
            && self.difficulty.is_none_or(|d| question.difficulty() == d)
    }
}

/// Question Supply contract: an ordered question list for a selector.
///
/// The returned order is significant and is kept as-is by the session.
/// An empty result is not an error here.
#[async_trait]
pub trait QuestionSupply: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be queried.
    async fn fetch(&self, selector: &QuestionSelector) -> Result<Vec<Question>, StorageError>;
}

/// Write side of the question bank, used by imports.
#[async_trait]
pub trait QuestionCatalog: Send + Sync {
    /// Persist or replace a question at `position` within its set.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question, position: u32) -> Result<(), StorageError>;

    /// Count questions in a set.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be queried.
    async fn count_questions(&self, set_id: QuestionSetId) -> Result<u64, StorageError>;
}

//
// ─── PERSISTENCE ADAPTER ───────────────────────────────────────────────────────
//

/// Checkpoint storage for in-progress sessions.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Store `snapshot`, unless a newer revision of the same session is already stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be written.
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails or the stored payload is unreadable.
    async fn load(&self, id: SessionId) -> Result<Option<SessionSnapshot>, StorageError>;

    /// Discard the checkpoint for `id`. Missing checkpoints are not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails.
    async fn delete(&self, id: SessionId) -> Result<(), StorageError>;
}

/// Stored result summary with its storage ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub id: i64,
    pub summary: ResultSummary,
}

impl ResultRow {
    #[must_use]
    pub fn new(id: i64, summary: ResultSummary) -> Self {
        Self { id, summary }
    }
}

/// Append-only history of finished simulations.
#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the summary cannot be stored.
    async fn append_result(&self, summary: &ResultSummary) -> Result<i64, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_result(&self, id: i64) -> Result<ResultSummary, StorageError>;

    /// Most recent results first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be queried.
    async fn list_results(&self, limit: u32) -> Result<Vec<ResultRow>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    questions: Arc<Mutex<HashMap<QuestionId, (u32, Question)>>>,
    snapshots: Arc<Mutex<HashMap<SessionId, SessionSnapshot>>>,
    results: Arc<Mutex<Vec<ResultSummary>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_err<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl QuestionSupply for InMemoryRepository {
    async fn fetch(&self, selector: &QuestionSelector) -> Result<Vec<Question>, StorageError> {
        let guard = self.questions.lock().map_err(lock_err)?;
        let mut matching: Vec<&(u32, Question)> = guard
            .values()
            .filter(|(_, q)| selector.matches(q))
            .collect();
        matching.sort_by_key(|(position, q)| (q.set_id(), *position, q.id()));

        let limit = selector
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        Ok(matching
            .into_iter()
            .take(limit)
            .map(|(_, q)| q.clone())
            .collect())
    }
}

#[async_trait]
impl QuestionCatalog for InMemoryRepository {
    async fn upsert_question(&self, question: &Question, position: u32) -> Result<(), StorageError> {
        let mut guard = self.questions.lock().map_err(lock_err)?;
        guard.insert(question.id(), (position, question.clone()));
        Ok(())
    }

    async fn count_questions(&self, set_id: QuestionSetId) -> Result<u64, StorageError> {
        let guard = self.questions.lock().map_err(lock_err)?;
        Ok(guard.values().filter(|(_, q)| q.set_id() == set_id).count() as u64)
    }
}

#[async_trait]
impl SnapshotRepository for InMemoryRepository {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let mut guard = self.snapshots.lock().map_err(lock_err)?;
        let stale = guard
            .get(&snapshot.session_id)
            .is_some_and(|existing| existing.revision > snapshot.revision);
        if !stale {
            guard.insert(snapshot.session_id, snapshot.clone());
        }
        Ok(())
    }

    async fn load(&self, id: SessionId) -> Result<Option<SessionSnapshot>, StorageError> {
        let guard = self.snapshots.lock().map_err(lock_err)?;
        Ok(guard.get(&id).cloned())
    }

    async fn delete(&self, id: SessionId) -> Result<(), StorageError> {
        let mut guard = self.snapshots.lock().map_err(lock_err)?;
        guard.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl ResultRepository for InMemoryRepository {
    async fn append_result(&self, summary: &ResultSummary) -> Result<i64, StorageError> {
        let mut guard = self.results.lock().map_err(lock_err)?;
        guard.push(summary.clone());
        i64::try_from(guard.len()).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn get_result(&self, id: i64) -> Result<ResultSummary, StorageError> {
        let guard = self.results.lock().map_err(lock_err)?;
        usize::try_from(id)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| guard.get(i))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn list_results(&self, limit: u32) -> Result<Vec<ResultRow>, StorageError> {
        let guard = self.results.lock().map_err(lock_err)?;
        let mut rows: Vec<ResultRow> = guard
            .iter()
            .enumerate()
            .map(|(i, summary)| ResultRow::new(i as i64 + 1, summary.clone()))
            .collect();
        rows.sort_by(|a, b| {
            b.summary
                .completed_at()
                .cmp(&a.summary.completed_at())
                .then(b.id.cmp(&a.id))
        });
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }
}

/// Aggregates the collaborator contracts behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionSupply>,
    pub catalog: Arc<dyn QuestionCatalog>,
    pub snapshots: Arc<dyn SnapshotRepository>,
    pub results: Arc<dyn ResultRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            questions: Arc::new(repo.clone()),
            catalog: Arc::new(repo.clone()),
            snapshots: Arc::new(repo.clone()),
            results: Arc::new(repo),
        }
    }
}

use std::sync::Arc;

use exam_core::model::{SessionId, SessionMode, SessionState, SimulationResult};
use storage::repository::{
    QuestionSelector, QuestionSupply, ResultRepository, ResultRow, SnapshotRepository,
};

use super::checkpoint::Checkpointer;
use super::handle::SimulationSession;
use super::timer::{TimerController, TimerExit};
use crate::Clock;
use crate::config::SimulationConfig;
use crate::error::SimulationError;

/// A live session together with the timer driving it.
#[derive(Debug)]
pub struct RunningSimulation {
    session: SimulationSession,
    timer: Option<TimerController>,
}

impl RunningSimulation {
    #[must_use]
    pub fn session(&self) -> &SimulationSession {
        &self.session
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.session.id()
    }

    #[must_use]
    pub fn is_timer_running(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }
}

/// Outcome of `SimulationLoopService::finish`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedSimulation {
    pub result: SimulationResult,
    pub result_id: i64,
}

/// Orchestrates start, resume and finish of timed simulations.
#[derive(Clone)]
pub struct SimulationLoopService {
    clock: Clock,
    config: SimulationConfig,
    questions: Arc<dyn QuestionSupply>,
    snapshots: Arc<dyn SnapshotRepository>,
    results: Arc<dyn ResultRepository>,
    checkpoints: Checkpointer,
}

impl SimulationLoopService {
    /// Build the service and spawn its checkpoint writer.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        clock: Clock,
        config: SimulationConfig,
        questions: Arc<dyn QuestionSupply>,
        snapshots: Arc<dyn SnapshotRepository>,
        results: Arc<dyn ResultRepository>,
    ) -> Self {
        let checkpoints = Checkpointer::spawn(Arc::clone(&snapshots), config.checkpoint());
        Self {
            clock,
            config,
            questions,
            snapshots,
            results,
            checkpoints,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Start a new simulation over the selected questions.
    ///
    /// `duration_seconds` overrides the configured default for `mode`.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError::NoQuestions` if nothing matches `selector`,
    /// `SimulationError::Storage` if the supply fails, or
    /// `SimulationError::Session` for an invalid configuration.
    pub async fn start(
        &self,
        selector: &QuestionSelector,
        mode: SessionMode,
        duration_seconds: Option<u32>,
    ) -> Result<RunningSimulation, SimulationError> {
        let questions = self.questions.fetch(selector).await?;
        if questions.is_empty() {
            return Err(SimulationError::NoQuestions);
        }

        let duration = duration_seconds.unwrap_or_else(|| self.config.duration_for(mode));
        let state = SessionState::initialize(questions, mode, duration)?;
        let session = SimulationSession::new(state, self.checkpoints.clone(), self.clock);
        session.checkpoint_now()?;

        tracing::info!(
            session_id = %session.id(),
            set_id = ?selector.set_id,
            %mode,
            duration,
            "simulation started"
        );
        let timer = Some(TimerController::spawn(session.clone()));
        Ok(RunningSimulation { session, timer })
    }

    /// Rebuild a session from its last checkpoint.
    ///
    /// The timer restarts only if the session is still active. With
    /// `charge_offline_time` set, wall-clock time since the checkpoint is
    /// deducted first and may time the session out.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError::UnknownSession` if no checkpoint exists,
    /// `SimulationError::Snapshot` if it cannot be restored, or storage errors.
    pub async fn resume(&self, id: SessionId) -> Result<RunningSimulation, SimulationError> {
        let snapshot = self
            .snapshots
            .load(id)
            .await?
            .ok_or(SimulationError::UnknownSession(id))?;
        let saved_at = snapshot.saved_at;
        let mut state = snapshot.restore()?;

        if self.config.charge_offline_time() && !state.is_terminal() {
            let offline = self.clock.seconds_since(saved_at);
            if offline > 0 {
                let outcome = state.elapse(offline)?;
                tracing::debug!(session_id = %id, offline, ?outcome, "charged offline time");
            }
        }

        let session = SimulationSession::new(state, self.checkpoints.clone(), self.clock);
        session.checkpoint_now()?;
        let progress = session.progress()?;
        tracing::info!(
            session_id = %id,
            remaining = progress.remaining_seconds,
            answered = progress.answered,
            "simulation resumed"
        );

        let timer = (!session.is_terminal()?).then(|| TimerController::spawn(session.clone()));
        Ok(RunningSimulation { session, timer })
    }

    /// Submit (if still active), score, and persist the result.
    ///
    /// The checkpoint is deleted only after the result is stored, so a failed
    /// append leaves the session resumable.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError::Storage` if persisting fails.
    pub async fn finish(
        &self,
        running: RunningSimulation,
    ) -> Result<FinishedSimulation, SimulationError> {
        let RunningSimulation { session, timer } = running;
        session.submit()?;
        if let Some(timer) = timer {
            let exit = timer.shutdown().await;
            if exit == TimerExit::Failed {
                tracing::warn!(session_id = %session.id(), "timer ended abnormally");
            }
        }

        let result = session.score()?;
        let result_id = self
            .results
            .append_result(&result.summary(self.clock.now()))
            .await?;
        tracing::info!(
            session_id = %session.id(),
            result_id,
            score = result.score_percent(),
            reason = %result.reason(),
            "simulation finished"
        );

        self.checkpoints.flush().await;
        self.snapshots.delete(session.id()).await?;
        Ok(FinishedSimulation { result, result_id })
    }

    /// Most recent stored results, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError::Storage` if the backend cannot be queried.
    pub async fn history(&self, limit: u32) -> Result<Vec<ResultRow>, SimulationError> {
        Ok(self.results.list_results(limit).await?)
    }

    /// Wait until every checkpoint queued so far has been written or dropped.
    pub async fn flush_checkpoints(&self) {
        self.checkpoints.flush().await;
    }
}

use std::fmt;
use std::sync::{Arc, Mutex};

use exam_core::Clock;
use exam_core::model::{
    Feedback, SessionError, SessionId, SessionProgress, SessionSnapshot, SessionState,
    SessionStatus, SimulationResult, TickOutcome, score,
};
use tokio::sync::watch;

use super::checkpoint::Checkpointer;
use crate::error::SimulationError;

/// Shared handle to one in-progress simulation.
///
/// User actions and timer wakeups go through the same mutex, so exactly one
/// of them decides when the session becomes terminal. Every applied change is
/// handed to the checkpoint writer after the lock is released.
#[derive(Clone)]
pub struct SimulationSession {
    id: SessionId,
    state: Arc<Mutex<SessionState>>,
    status: Arc<watch::Sender<SessionStatus>>,
    checkpoints: Checkpointer,
    clock: Clock,
}

impl SimulationSession {
    #[must_use]
    pub fn new(state: SessionState, checkpoints: Checkpointer, clock: Clock) -> Self {
        let (status, _) = watch::channel(state.status());
        Self {
            id: state.id(),
            state: Arc::new(Mutex::new(state)),
            status: Arc::new(status),
            checkpoints,
            clock,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Subscribe to status changes (`Active` → `Terminal`).
    #[must_use]
    pub fn status_watch(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Run `f` against a read-only view of the state.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError::Lock` if the state mutex is poisoned.
    pub fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> Result<R, SimulationError> {
        let guard = self.state.lock().map_err(|_| SimulationError::Lock)?;
        Ok(f(&guard))
    }

    /// # Errors
    ///
    /// Returns `SimulationError::Lock` if the state mutex is poisoned.
    pub fn progress(&self) -> Result<SessionProgress, SimulationError> {
        self.read(SessionState::progress)
    }

    /// # Errors
    ///
    /// Returns `SimulationError::Lock` if the state mutex is poisoned.
    pub fn is_terminal(&self) -> Result<bool, SimulationError> {
        self.read(SessionState::is_terminal)
    }

    /// # Errors
    ///
    /// Returns the `SessionError` from the state machine, or `Lock`.
    pub fn select_answer(
        &self,
        question_index: usize,
        option_index: usize,
    ) -> Result<(), SimulationError> {
        self.mutate(|s| s.select_answer(question_index, option_index))
    }

    /// # Errors
    ///
    /// Returns the `SessionError` from the state machine, or `Lock`.
    pub fn toggle_flag(&self, question_index: usize) -> Result<bool, SimulationError> {
        self.mutate(|s| s.toggle_flag(question_index))
    }

    /// # Errors
    ///
    /// Returns the `SessionError` from the state machine, or `Lock`.
    pub fn navigate_to(&self, question_index: usize) -> Result<(), SimulationError> {
        self.mutate(|s| s.navigate_to(question_index))
    }

    /// # Errors
    ///
    /// Returns the `SessionError` from the state machine, or `Lock`.
    pub fn next(&self) -> Result<(), SimulationError> {
        self.mutate(SessionState::next)
    }

    /// # Errors
    ///
    /// Returns the `SessionError` from the state machine, or `Lock`.
    pub fn previous(&self) -> Result<(), SimulationError> {
        self.mutate(SessionState::previous)
    }

    /// # Errors
    ///
    /// Returns the `SessionError` from the state machine, or `Lock`.
    pub fn reveal(&self, question_index: usize) -> Result<Feedback, SimulationError> {
        self.mutate(|s| s.reveal(question_index))
    }

    /// Submit the session. Returns `true` if this call ended it.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError::Lock` if the state mutex is poisoned.
    pub fn submit(&self) -> Result<bool, SimulationError> {
        let submitted = self.mutate(|s| Ok::<_, SessionError>(s.submit()))?;
        if submitted {
            tracing::info!(session_id = %self.id, "session submitted");
        }
        Ok(submitted)
    }

    /// # Errors
    ///
    /// Returns `NotTerminal` while the session is active, or `Lock`.
    pub fn score(&self) -> Result<SimulationResult, SimulationError> {
        Ok(self.read(score)??)
    }

    /// Apply timer-measured elapsed seconds.
    ///
    /// Returns `Ok(None)` when the session already ended; the late wakeup is dropped.
    pub(crate) fn apply_elapsed(
        &self,
        seconds: u32,
    ) -> Result<Option<TickOutcome>, SimulationError> {
        match self.mutate(|s| s.elapse(seconds)) {
            Ok(outcome) => Ok(Some(outcome)),
            Err(SimulationError::Session(SessionError::SessionTerminated)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn checkpoint_now(&self) -> Result<(), SimulationError> {
        let snapshot = self.read(|s| SessionSnapshot::capture(s, self.clock.now()))?;
        self.checkpoints.enqueue(snapshot);
        Ok(())
    }

    fn mutate<R, E>(
        &self,
        op: impl FnOnce(&mut SessionState) -> Result<R, E>,
    ) -> Result<R, SimulationError>
    where
        SimulationError: From<E>,
    {
        let (out, snapshot) = {
            let mut guard = self.state.lock().map_err(|_| SimulationError::Lock)?;
            let before = guard.revision();
            let out = op(&mut *guard)?;
            let snapshot = (guard.revision() != before)
                .then(|| SessionSnapshot::capture(&guard, self.clock.now()));

            // Published under the lock so watchers see transitions in state order.
            let status = guard.status();
            self.status.send_if_modified(|current| {
                let changed = *current != status;
                *current = status;
                changed
            });
            (out, snapshot)
        };

        if let Some(snapshot) = snapshot {
            tracing::trace!(session_id = %self.id, revision = snapshot.revision, "state changed");
            self.checkpoints.enqueue(snapshot);
        }
        Ok(out)
    }
}

impl fmt::Debug for SimulationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationSession")
            .field("id", &self.id)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckpointPolicy;
    use crate::sessions::test_support::questions;
    use exam_core::model::{SessionMode, TerminationReason};
    use exam_core::time::fixed_clock;
    use proptest::prelude::*;
    use std::sync::Barrier;
    use storage::repository::{InMemoryRepository, SnapshotRepository};

    fn session(repo: &InMemoryRepository, mode: SessionMode) -> SimulationSession {
        let checkpoints = Checkpointer::spawn(Arc::new(repo.clone()), CheckpointPolicy::default());
        let state = SessionState::initialize(questions(&[0, 1, 2]), mode, 120).unwrap();
        SimulationSession::new(state, checkpoints, fixed_clock())
    }

    fn timed(repo: &InMemoryRepository, duration: u32) -> SimulationSession {
        let checkpoints = Checkpointer::spawn(Arc::new(repo.clone()), CheckpointPolicy::default());
        let state =
            SessionState::initialize(questions(&[0, 1, 2]), SessionMode::Exam, duration).unwrap();
        SimulationSession::new(state, checkpoints, fixed_clock())
    }

    #[tokio::test]
    async fn user_actions_are_checkpointed() {
        let repo = InMemoryRepository::new();
        let sim = session(&repo, SessionMode::Practice);
        sim.select_answer(0, 0).unwrap();
        sim.toggle_flag(2).unwrap();
        sim.checkpoints.flush().await;

        let snap = repo.load(sim.id()).await.unwrap().unwrap();
        assert_eq!(snap.answers[0], Some(0));
        assert!(snap.flags[2]);
        assert_eq!(snap.revision, 2);
    }

    #[tokio::test]
    async fn rejected_actions_leave_no_checkpoint() {
        let repo = InMemoryRepository::new();
        let sim = session(&repo, SessionMode::Exam);
        sim.navigate_to(2).unwrap();
        let err = sim.navigate_to(0).unwrap_err();
        assert!(matches!(
            err,
            SimulationError::Session(SessionError::BackwardNavigationForbidden { .. })
        ));
        assert!(matches!(
            sim.reveal(2).unwrap_err(),
            SimulationError::Session(SessionError::RevealForbidden)
        ));
        sim.checkpoints.flush().await;
        assert_eq!(repo.load(sim.id()).await.unwrap().unwrap().revision, 1);
    }

    #[tokio::test]
    async fn submit_notifies_watchers_once() {
        let repo = InMemoryRepository::new();
        let sim = session(&repo, SessionMode::Exam);
        let mut status = sim.status_watch();

        assert!(sim.submit().unwrap());
        status.changed().await.unwrap();
        assert_eq!(
            *status.borrow_and_update(),
            SessionStatus::Terminal(TerminationReason::Submitted)
        );

        assert!(!sim.submit().unwrap());
        assert!(!status.has_changed().unwrap());
        assert_eq!(sim.apply_elapsed(5).unwrap(), None);
    }

    #[tokio::test]
    async fn score_requires_terminal_session() {
        let repo = InMemoryRepository::new();
        let sim = session(&repo, SessionMode::Practice);
        assert!(matches!(
            sim.score().unwrap_err(),
            SimulationError::Session(SessionError::NotTerminal)
        ));
        sim.select_answer(1, 1).unwrap();
        sim.submit().unwrap();
        assert_eq!(sim.score().unwrap().correct_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn status_watch_never_leaves_terminal_under_contention() {
        let repo = InMemoryRepository::new();
        for _ in 0..500 {
            let sim = timed(&repo, 1);
            let barrier = Arc::new(Barrier::new(2));
            let (user, gate) = (sim.clone(), Arc::clone(&barrier));
            let flipper = std::thread::spawn(move || {
                gate.wait();
                while user.toggle_flag(0).is_ok() {}
            });

            barrier.wait();
            assert_eq!(sim.apply_elapsed(1).unwrap(), Some(TickOutcome::Expired));
            flipper.join().unwrap();
            assert_eq!(
                *sim.status_watch().borrow(),
                SessionStatus::Terminal(TerminationReason::TimedOut)
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn submit_racing_expiry_terminates_exactly_once() {
        let repo = InMemoryRepository::new();
        for _ in 0..500 {
            let sim = timed(&repo, 1);
            let barrier = Arc::new(Barrier::new(2));
            let (user, gate) = (sim.clone(), Arc::clone(&barrier));
            let submitter = std::thread::spawn(move || {
                gate.wait();
                user.submit().unwrap()
            });

            barrier.wait();
            let expired = sim.apply_elapsed(1).unwrap() == Some(TickOutcome::Expired);
            let submitted = submitter.join().unwrap();
            assert!(submitted != expired, "submitted={submitted} expired={expired}");

            let expected = if submitted {
                TerminationReason::Submitted
            } else {
                TerminationReason::TimedOut
            };
            assert_eq!(*sim.status_watch().borrow(), SessionStatus::Terminal(expected));
            assert_eq!(sim.score().unwrap().reason(), expected);
        }
    }

    #[derive(Debug, Clone)]
    enum Action {
        Answer(usize, usize),
        Flag(usize),
        Goto(usize),
        Elapse(u32),
        Submit,
    }

    fn action() -> impl Strategy<Value = Action> {
        prop_oneof![
            (0..4usize, 0..4usize).prop_map(|(q, o)| Action::Answer(q, o)),
            (0..4usize).prop_map(Action::Flag),
            (0..4usize).prop_map(Action::Goto),
            (0..5u32).prop_map(Action::Elapse),
            Just(Action::Submit),
        ]
    }

    proptest! {
        #[test]
        fn watch_matches_state_through_any_interleaving(
            actions in prop::collection::vec(action(), 1..40),
            exam in any::<bool>(),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let _guard = rt.enter();
            let repo = InMemoryRepository::new();
            let mode = if exam { SessionMode::Exam } else { SessionMode::Practice };
            let checkpoints =
                Checkpointer::spawn(Arc::new(repo), CheckpointPolicy::default());
            let state = SessionState::initialize(questions(&[0, 1, 2]), mode, 10).unwrap();
            let sim = SimulationSession::new(state, checkpoints, fixed_clock());
            let watch = sim.status_watch();

            let mut last_remaining = 10;
            let mut last_revision = 0;
            let mut terminal_seen = false;
            for action in actions {
                let _ = match action {
                    Action::Answer(q, o) => sim.select_answer(q, o),
                    Action::Flag(q) => sim.toggle_flag(q).map(|_| ()),
                    Action::Goto(q) => sim.navigate_to(q),
                    Action::Elapse(secs) => sim.apply_elapsed(secs).map(|_| ()),
                    Action::Submit => sim.submit().map(|_| ()),
                };
                let (status, remaining, revision) = sim
                    .read(|s| (s.status(), s.remaining_seconds(), s.revision()))
                    .unwrap();

                prop_assert_eq!(*watch.borrow(), status);
                prop_assert!(remaining <= last_remaining);
                prop_assert!(revision >= last_revision);
                prop_assert!(!terminal_seen || status != SessionStatus::Active);

                terminal_seen = status != SessionStatus::Active;
                last_remaining = remaining;
                last_revision = revision;
            }
        }
    }
}

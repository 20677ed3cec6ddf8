use std::time::Duration;

use exam_core::model::{SessionStatus, TickOutcome};
use exam_core::timer::TickReconciler;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::handle::SimulationSession;

const TICK: Duration = Duration::from_secs(1);

/// Why the timer task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerExit {
    /// The countdown reached zero and this task timed the session out.
    Expired,
    /// The session ended some other way (user submit).
    SessionEnded,
    /// `stop` was called or the controller was dropped.
    Stopped,
    /// The session state became unusable.
    Failed,
}

/// Drives the session countdown from a tokio task.
///
/// Each wakeup measures real elapsed time and applies it under the session
/// lock, so a late or skipped wakeup catches up instead of drifting. The task
/// exits as soon as the session turns terminal; wakeups racing a submit are
/// discarded by the session itself.
#[derive(Debug)]
pub struct TimerController {
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<TimerExit>>,
}

impl TimerController {
    /// Start ticking `session` on the current tokio runtime.
    #[must_use]
    pub fn spawn(session: SimulationSession) -> Self {
        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_timer(session, stop_rx));
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Ask the task to stop. Idempotent.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(mut self) -> TimerExit {
        self.stop();
        self.join_inner().await
    }

    /// Wait for the task to exit on its own (expiry or session end).
    pub async fn join(mut self) -> TimerExit {
        self.join_inner().await
    }

    async fn join_inner(&mut self) -> TimerExit {
        let Some(handle) = self.handle.take() else {
            return TimerExit::Stopped;
        };
        handle.await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "timer task did not finish cleanly");
            TimerExit::Failed
        })
    }
}

impl Drop for TimerController {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run_timer(session: SimulationSession, mut stop: watch::Receiver<bool>) -> TimerExit {
    let mut status = session.status_watch();
    if *status.borrow_and_update() != SessionStatus::Active {
        return TimerExit::SessionEnded;
    }

    let mut reconciler = TickReconciler::new();
    let mut last = Instant::now();
    let mut interval = tokio::time::interval_at(last + TICK, TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(session_id = %session.id(), "timer started");
    let exit = loop {
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break TimerExit::Stopped;
                }
            }
            changed = status.changed() => {
                if changed.is_err() || *status.borrow_and_update() != SessionStatus::Active {
                    break TimerExit::SessionEnded;
                }
            }
            _ = interval.tick() => {
                let now = Instant::now();
                let due = reconciler.absorb(now.saturating_duration_since(last));
                last = now;
                if due == 0 {
                    continue;
                }
                if due > 1 {
                    tracing::debug!(session_id = %session.id(), seconds = due, "timer catching up");
                }
                match session.apply_elapsed(due) {
                    Ok(Some(TickOutcome::Expired)) => {
                        tracing::info!(session_id = %session.id(), "session timed out");
                        break TimerExit::Expired;
                    }
                    Ok(Some(TickOutcome::Running { .. })) => {}
                    Ok(None) => break TimerExit::SessionEnded,
                    Err(err) => {
                        tracing::warn!(session_id = %session.id(), error = %err, "timer stopped");
                        break TimerExit::Failed;
                    }
                }
            }
        }
    };
    tracing::debug!(session_id = %session.id(), ?exit, "timer finished");
    exit
}

use std::collections::HashMap;
use std::sync::Arc;

use exam_core::model::{SessionId, SessionSnapshot};
use storage::repository::SnapshotRepository;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::CheckpointPolicy;

enum Command {
    Save(Box<SessionSnapshot>),
    Flush(oneshot::Sender<()>),
}

/// Best-effort checkpoint writer.
///
/// Sessions hand snapshots over without waiting. A single background task
/// writes them in order, keeps only the newest pending snapshot per session,
/// retries failed saves per `CheckpointPolicy`, and logs what it gives up on.
#[derive(Clone)]
pub struct Checkpointer {
    tx: mpsc::UnboundedSender<Command>,
    writer: Arc<JoinHandle<()>>,
}

impl Checkpointer {
    /// Spawn the writer task on the current tokio runtime.
    #[must_use]
    pub fn spawn(repo: Arc<dyn SnapshotRepository>, policy: CheckpointPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_writer(repo, policy, rx));
        Self {
            tx,
            writer: Arc::new(writer),
        }
    }

    /// Queue `snapshot` for saving. Never blocks and never fails.
    pub fn enqueue(&self, snapshot: SessionSnapshot) {
        let session_id = snapshot.session_id;
        if self.tx.send(Command::Save(Box::new(snapshot))).is_err() {
            tracing::warn!(%session_id, "checkpoint writer is gone; snapshot dropped");
        }
    }

    /// Wait until every snapshot queued before this call has been handled.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.await;
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.writer.is_finished()
    }
}

async fn run_writer(
    repo: Arc<dyn SnapshotRepository>,
    policy: CheckpointPolicy,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    while let Some(first) = rx.recv().await {
        let mut pending: HashMap<SessionId, Box<SessionSnapshot>> = HashMap::new();
        let mut acks = Vec::new();

        let mut next = Some(first);
        while let Some(command) = next {
            match command {
                Command::Save(snapshot) => {
                    let keep = pending
                        .get(&snapshot.session_id)
                        .is_none_or(|queued| queued.revision <= snapshot.revision);
                    if keep {
                        pending.insert(snapshot.session_id, snapshot);
                    }
                }
                Command::Flush(ack) => acks.push(ack),
            }
            next = rx.try_recv().ok();
        }

        for snapshot in pending.into_values() {
            save_with_retry(repo.as_ref(), &snapshot, policy).await;
        }
        for ack in acks {
            let _ = ack.send(());
        }
    }
    tracing::debug!("checkpoint writer stopped");
}

async fn save_with_retry(
    repo: &dyn SnapshotRepository,
    snapshot: &SessionSnapshot,
    policy: CheckpointPolicy,
) {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match repo.save(snapshot).await {
            Ok(()) => {
                tracing::debug!(
                    session_id = %snapshot.session_id,
                    revision = snapshot.revision,
                    attempt,
                    "checkpoint saved"
                );
                return;
            }
            Err(err) if attempt < attempts => {
                tracing::debug!(
                    session_id = %snapshot.session_id,
                    attempt,
                    error = %err,
                    "checkpoint save failed; retrying"
                );
                tokio::time::sleep(policy.retry_delay).await;
            }
            Err(err) => {
                tracing::warn!(
                    session_id = %snapshot.session_id,
                    revision = snapshot.revision,
                    error = %err,
                    "giving up on checkpoint"
                );
            }
        }
    }
}

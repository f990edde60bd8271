//! Ordered background writer
//!
//! The engine never awaits bookkeeping writes on its hot path. Operations
//! are queued here and applied one at a time, in submission order, by a
//! single task. Failures are logged and dropped.

use super::Store;
use crate::model::{RequestRecord, RequestStatus, TrackId, TrackStatus};
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// One deferred write
#[derive(Debug)]
pub enum PersistOp {
    InsertRequest(RequestRecord),
    RequestStatus {
        id: Uuid,
        status: RequestStatus,
        played_at: Option<DateTime<Utc>>,
    },
    TrackStatus {
        id: TrackId,
        status: TrackStatus,
    },
    TrackPlayed {
        id: TrackId,
        at: DateTime<Utc>,
    },
    TrackSkipped {
        id: TrackId,
    },
    /// Completes once every earlier operation has been applied
    Barrier(oneshot::Sender<()>),
}

impl PersistOp {
    fn name(&self) -> &'static str {
        match self {
            PersistOp::InsertRequest(_) => "insert_request",
            PersistOp::RequestStatus { .. } => "request_status",
            PersistOp::TrackStatus { .. } => "track_status",
            PersistOp::TrackPlayed { .. } => "track_played",
            PersistOp::TrackSkipped { .. } => "track_skipped",
            PersistOp::Barrier(_) => "barrier",
        }
    }
}

/// Handle to the writer task
///
/// The task exits after every handle is dropped and the queue is drained.
#[derive(Clone)]
pub struct Persister {
    tx: mpsc::UnboundedSender<PersistOp>,
}

impl Persister {
    pub fn spawn(store: Arc<dyn Store>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(store, rx));
        (Self { tx }, handle)
    }

    /// Queue an operation; silently dropped if the writer has exited
    pub fn submit(&self, op: PersistOp) {
        if let Err(e) = self.tx.send(op) {
            warn!(op = e.0.name(), "Persister stopped, write dropped");
        }
    }

    pub fn request_status(&self, id: Uuid, status: RequestStatus, played_at: Option<DateTime<Utc>>) {
        self.submit(PersistOp::RequestStatus {
            id,
            status,
            played_at,
        });
    }

    pub fn track_status(&self, id: &TrackId, status: TrackStatus) {
        self.submit(PersistOp::TrackStatus {
            id: id.clone(),
            status,
        });
    }

    /// Resolves after all previously submitted operations are applied
    pub fn barrier(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.submit(PersistOp::Barrier(tx));
        rx
    }
}

async fn run(store: Arc<dyn Store>, mut rx: mpsc::UnboundedReceiver<PersistOp>) {
    while let Some(op) = rx.recv().await {
        let name = op.name();
        if let Err(e) = apply(store.as_ref(), op).await {
            warn!(op = name, error = %e, "Background write failed");
        }
    }
    debug!("Persister drained and stopped");
}

async fn apply(store: &dyn Store, op: PersistOp) -> Result<()> {
    match op {
        PersistOp::InsertRequest(record) => store.insert_request(&record).await,
        PersistOp::RequestStatus {
            id,
            status,
            played_at,
        } => store.update_request_status(id, status, played_at).await,
        PersistOp::TrackStatus { id, status } => store.set_track_status(&id, status).await,
        PersistOp::TrackPlayed { id, at } => store.record_track_play(&id, at).await,
        PersistOp::TrackSkipped { id } => store.record_track_skip(&id).await,
        PersistOp::Barrier(done) => {
            let _ = done.send(());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MediaInfo;
    use crate::db::SqliteStore;
    use crate::model::{QueueItem, Requester, Track};

    #[tokio::test]
    async fn test_operations_applied_in_order() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let track = Track::from_info(
            TrackId::new("a"),
            &MediaInfo {
                title: "A".to_string(),
                duration_secs: 100.0,
                thumbnail: None,
                channel_id: None,
            },
        );
        store.upsert_track(&track).await.unwrap();

        let (persister, handle) = Persister::spawn(store.clone());
        let item = QueueItem::for_user(&track, Requester::user("u1", "alice"));

        persister.submit(PersistOp::InsertRequest(item.request_record()));
        persister.request_status(item.request_id, RequestStatus::Playing, Some(Utc::now()));
        persister.request_status(item.request_id, RequestStatus::Skipped, None);
        persister.submit(PersistOp::TrackSkipped { id: track.id.clone() });
        persister.barrier().await.unwrap();

        let record = store.get_request(item.request_id).await.unwrap().unwrap();
        assert_eq!(record.status, RequestStatus::Skipped);
        assert_eq!(store.get_track(&track.id).await.unwrap().unwrap().skip_count, 1);

        drop(persister);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_write_does_not_stop_writer() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let (persister, _handle) = Persister::spawn(store.clone());

        sqlx::query("DROP TABLE requests")
            .execute(store.pool())
            .await
            .unwrap();
        persister.request_status(Uuid::new_v4(), RequestStatus::Expired, None);
        persister.barrier().await.unwrap();
    }
}

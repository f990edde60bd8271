//! State publisher
//!
//! The engine hands over a full snapshot whenever something changes. The
//! publisher coalesces bursts over a debounce window and forwards a
//! snapshot to the event bus only when it differs meaningfully from the
//! last one sent: status, current track, queue order, volume, autoplay
//! flag, or a position jump of at least `position_delta_secs`.

use crate::config::PublisherConfig;
use chrono::Utc;
use miu_common::events::{EngineEvent, EngineSnapshot, EventBus};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Decides whether a snapshot is worth sending
#[derive(Debug)]
pub struct PublishGate {
    last: Option<EngineSnapshot>,
    position_delta: f64,
}

impl PublishGate {
    pub fn new(position_delta: f64) -> Self {
        Self {
            last: None,
            position_delta,
        }
    }

    pub fn should_emit(&self, next: &EngineSnapshot) -> bool {
        let Some(last) = &self.last else {
            return true;
        };
        last.status != next.status
            || last.current_track_id() != next.current_track_id()
            || last.queue_ids() != next.queue_ids()
            || last.volume != next.volume
            || last.autoplay != next.autoplay
            || (next.position - last.position).abs() >= self.position_delta
    }

    /// Accept `next` if it passes the gate, remembering it as last sent
    pub fn offer(&mut self, next: EngineSnapshot) -> Option<EngineSnapshot> {
        if !self.should_emit(&next) {
            return None;
        }
        self.last = Some(next.clone());
        Some(next)
    }
}

pub struct StatePublisher {
    tx: watch::Sender<Option<EngineSnapshot>>,
}

impl StatePublisher {
    pub fn spawn(
        events: EventBus,
        config: &PublisherConfig,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = watch::channel(None);
        let handle = tokio::spawn(run(
            events,
            rx,
            config.debounce(),
            PublishGate::new(config.position_delta_secs),
            cancel,
        ));
        (Self { tx }, handle)
    }

    /// Replace the pending snapshot; never blocks
    pub fn publish(&self, snapshot: EngineSnapshot) {
        self.tx.send_replace(Some(snapshot));
    }

    /// Most recent snapshot handed over (sent or not)
    pub fn latest(&self) -> Option<EngineSnapshot> {
        self.tx.borrow().clone()
    }
}

async fn run(
    events: EventBus,
    mut rx: watch::Receiver<Option<EngineSnapshot>>,
    debounce: Duration,
    mut gate: PublishGate,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        // Let the rest of the burst land before sampling
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(debounce) => {}
        }

        let latest = rx.borrow_and_update().clone();
        emit_if_changed(&events, &mut gate, latest);
    }

    // Final flush so observers see the shutdown state
    let latest = rx.borrow_and_update().clone();
    emit_if_changed(&events, &mut gate, latest);
    debug!("State publisher stopped");
}

fn emit_if_changed(events: &EventBus, gate: &mut PublishGate, latest: Option<EngineSnapshot>) {
    if let Some(snapshot) = latest.and_then(|s| gate.offer(s)) {
        events.emit_lossy(EngineEvent::StateSnapshot {
            snapshot,
            timestamp: Utc::now(),
        });
    }
}

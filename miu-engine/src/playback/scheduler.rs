//! Timer scheduler
//!
//! Every delayed or periodic action the engine owns goes through here so
//! shutdown can cancel all of them at once. Actions are plain closures;
//! the engine's closures only send a message to its own command channel.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cancels one scheduled action
#[derive(Debug, Clone)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug)]
pub struct Scheduler {
    root: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Timers are children of `root`; cancelling it cancels them all
    pub fn new(root: CancellationToken) -> Self {
        Self {
            root,
            tasks: Vec::new(),
        }
    }

    /// Run `action` once after `delay` unless cancelled first
    pub fn after<F>(&mut self, delay: Duration, action: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let token = self.root.child_token();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {}
                _ = tokio::time::sleep(delay) => action(),
            }
        });
        self.track(handle);
        TimerHandle { token }
    }

    /// Run `action` every `period`, first after one full period
    pub fn every<F>(&mut self, period: Duration, mut action: F) -> TimerHandle
    where
        F: FnMut() + Send + 'static,
    {
        let token = self.root.child_token();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = interval.tick() => action(),
                }
            }
        });
        self.track(handle);
        TimerHandle { token }
    }

    /// Cancel and abort every timer
    pub fn shutdown(&mut self) {
        self.root.cancel();
        let count = self.tasks.len();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!(count, "Scheduler stopped");
    }

    /// Timers that have not yet completed
    pub fn active_count(&mut self) -> usize {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.len()
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(handle);
    }
}

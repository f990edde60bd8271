//! Listener presence policy
//!
//! When the last listener leaves, playback pauses after a grace period.
//! When someone returns, playback resumes, but only if the pause was ours.
//! The policy stays dormant until the first listener update arrives, so an
//! engine with no presence feed plays normally.

use super::scheduler::TimerHandle;
use std::time::Duration;

/// What the engine should do after a listener update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceAction {
    Nothing,
    /// Channel emptied: (re)arm the grace timer
    StartGrace,
    /// Listeners present: resume a presence pause
    Resume,
}

#[derive(Debug)]
pub struct PresenceMonitor {
    enabled: bool,
    grace: Duration,
    listeners: Option<Vec<String>>,
    timer: Option<TimerHandle>,
}

impl PresenceMonitor {
    pub fn new(enabled: bool, grace: Duration) -> Self {
        Self {
            enabled,
            grace,
            listeners: None,
            timer: None,
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Known listener ids (empty until the first update)
    pub fn listeners(&self) -> &[String] {
        self.listeners.as_deref().unwrap_or(&[])
    }

    /// True once an update has reported an empty channel
    pub fn channel_empty(&self) -> bool {
        self.enabled && matches!(&self.listeners, Some(l) if l.is_empty())
    }

    pub fn update(&mut self, mut listeners: Vec<String>) -> PresenceAction {
        listeners.sort();
        listeners.dedup();
        self.listeners = Some(listeners);
        self.disarm();

        if !self.enabled {
            PresenceAction::Nothing
        } else if self.channel_empty() {
            PresenceAction::StartGrace
        } else {
            PresenceAction::Resume
        }
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    pub fn arm(&mut self, timer: TimerHandle) {
        self.disarm();
        self.timer = Some(timer);
    }

    pub fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    /// Grace timer fired; true if the channel is still empty
    pub fn grace_elapsed(&mut self) -> bool {
        self.timer = None;
        self.channel_empty()
    }
}

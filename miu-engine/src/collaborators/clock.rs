//! Dry-run voice transport
//!
//! Plays nothing; a timer stands in for the resource and reports `Finished`
//! once the track's duration has elapsed. Pausing freezes the remaining
//! time. Useful for headless deployments and for exercising the engine.

use super::transport::{
    PlayResource, PlaybackId, TransportError, TransportEvent, VoiceConnection, VoiceTransport,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Transport whose connections are timers
#[derive(Debug, Default, Clone)]
pub struct ClockTransport;

impl ClockTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VoiceTransport for ClockTransport {
    async fn connect(
        &self,
        channel: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn VoiceConnection>, TransportError> {
        info!(channel, "Clock transport connected");
        Ok(Box::new(ClockConnection {
            channel: channel.to_string(),
            events,
            current: None,
            volume: 1.0,
        }))
    }
}

struct ClockPlayback {
    playback_id: PlaybackId,
    remaining: Duration,
    resumed_at: Instant,
    timer: Option<JoinHandle<()>>,
}

struct ClockConnection {
    channel: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    current: Option<ClockPlayback>,
    volume: f32,
}

impl ClockConnection {
    fn arm(&self, playback_id: PlaybackId, after: Duration) -> JoinHandle<()> {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = events.send(TransportEvent::Finished { playback_id });
        })
    }

    fn cancel_current(&mut self) {
        if let Some(playback) = self.current.take() {
            if let Some(timer) = playback.timer {
                timer.abort();
            }
        }
    }
}

#[async_trait]
impl VoiceConnection for ClockConnection {
    async fn play(
        &mut self,
        resource: PlayResource,
        playback_id: PlaybackId,
    ) -> Result<(), TransportError> {
        self.cancel_current();

        let secs = if resource.duration_secs.is_finite() {
            resource.duration_secs.max(0.0)
        } else {
            0.0
        };
        let remaining = Duration::from_secs_f64(secs);

        debug!(
            channel = %self.channel,
            track_id = %resource.track_id,
            playback_id,
            secs,
            volume = self.volume,
            "Clock playback started"
        );

        let timer = self.arm(playback_id, remaining);
        self.current = Some(ClockPlayback {
            playback_id,
            remaining,
            resumed_at: Instant::now(),
            timer: Some(timer),
        });
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), TransportError> {
        if let Some(playback) = self.current.as_mut() {
            if let Some(timer) = playback.timer.take() {
                timer.abort();
                playback.remaining = playback
                    .remaining
                    .saturating_sub(playback.resumed_at.elapsed());
            }
        }
        Ok(())
    }

    async fn unpause(&mut self) -> Result<(), TransportError> {
        let rearm = match self.current.as_ref() {
            Some(playback) if playback.timer.is_none() => {
                Some((playback.playback_id, playback.remaining))
            }
            _ => None,
        };

        if let Some((playback_id, remaining)) = rearm {
            let timer = self.arm(playback_id, remaining);
            if let Some(playback) = self.current.as_mut() {
                playback.resumed_at = Instant::now();
                playback.timer = Some(timer);
            }
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), TransportError> {
        self.cancel_current();
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    async fn disconnect(&mut self) {
        self.cancel_current();
        info!(channel = %self.channel, "Clock transport disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrackId;
    use std::path::PathBuf;

    fn resource(secs: f64) -> PlayResource {
        PlayResource {
            track_id: TrackId::new("a"),
            path: PathBuf::from("/tmp/a.opus"),
            duration_secs: secs,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_finishes_after_duration() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut conn = ClockTransport::new().connect("main", tx).await.unwrap();

        conn.play(resource(3.0), 7).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            TransportEvent::Finished { playback_id: 7 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_freezes_remaining_time() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut conn = ClockTransport::new().connect("main", tx).await.unwrap();

        conn.play(resource(2.0), 1).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        conn.pause().await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err(), "paused playback must not finish");

        conn.unpause().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            TransportEvent::Finished { playback_id: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_suppresses_finished() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut conn = ClockTransport::new().connect("main", tx).await.unwrap();

        conn.play(resource(1.0), 1).await.unwrap();
        conn.stop().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }
}

//! Scripted collaborators
//!
//! `FakeResolver::download` writes the track's duration into the file as
//! text and `ContentProbe` reads it back, so a test controls the "real"
//! duration of any cached file just by writing a number into it.

use async_trait::async_trait;
use miu_engine::collaborators::{
    DurationProbe, MediaInfo, MediaResolver, PlayResource, PlaybackId, ResolverError,
    TransportError, TransportEvent, VoiceConnection, VoiceTransport,
};
use miu_engine::model::TrackId;
use miu_engine::Result;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeResolver {
    infos: Mutex<HashMap<TrackId, MediaInfo>>,
    unavailable: Mutex<HashSet<TrackId>>,
    /// Remaining transient failures per id
    transient: Mutex<HashMap<TrackId, u32>>,
    recommendations: Mutex<HashMap<TrackId, Vec<TrackId>>>,
    download_delay: Mutex<Duration>,
    downloads: Mutex<HashMap<TrackId, usize>>,
    recommendation_calls: AtomicUsize,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: &str, duration_secs: f64) {
        self.infos.lock().unwrap().insert(
            TrackId::new(id),
            MediaInfo {
                title: format!("Title {id}"),
                duration_secs,
                thumbnail: None,
                channel_id: None,
            },
        );
    }

    pub fn make_unavailable(&self, id: &str) {
        self.unavailable.lock().unwrap().insert(TrackId::new(id));
    }

    pub fn fail_transiently(&self, id: &str, times: u32) {
        self.transient.lock().unwrap().insert(TrackId::new(id), times);
    }

    pub fn recommend(&self, seed: &str, ids: &[&str]) {
        self.recommendations.lock().unwrap().insert(
            TrackId::new(seed),
            ids.iter().map(|id| TrackId::new(*id)).collect(),
        );
    }

    pub fn set_download_delay(&self, delay: Duration) {
        *self.download_delay.lock().unwrap() = delay;
    }

    pub fn download_count(&self, id: &str) -> usize {
        self.downloads
            .lock()
            .unwrap()
            .get(&TrackId::new(id))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_downloads(&self) -> usize {
        self.downloads.lock().unwrap().values().sum()
    }

    pub fn recommendation_calls(&self) -> usize {
        self.recommendation_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self, id: &TrackId) -> std::result::Result<(), ResolverError> {
        if self.unavailable.lock().unwrap().contains(id) {
            return Err(ResolverError::Unavailable(format!("{id} was removed")));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaResolver for FakeResolver {
    async fn get_info(&self, id: &TrackId) -> std::result::Result<MediaInfo, ResolverError> {
        self.check_available(id)?;
        self.infos
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| ResolverError::Unavailable(format!("unknown id {id}")))
    }

    async fn download(&self, id: &TrackId, dest: &Path) -> std::result::Result<(), ResolverError> {
        *self.downloads.lock().unwrap().entry(id.clone()).or_default() += 1;

        let delay = *self.download_delay.lock().unwrap();
        if !delay.is_zero() {
            // Slow downloads show up on disk while still in progress
            tokio::fs::write(dest, b"")
                .await
                .map_err(|e| ResolverError::Transient(e.to_string()))?;
            tokio::time::sleep(delay).await;
        }

        self.check_available(id)?;
        {
            let mut transient = self.transient.lock().unwrap();
            if let Some(remaining) = transient.get_mut(id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ResolverError::Transient("connection reset".to_string()));
                }
            }
        }

        let duration = self
            .infos
            .lock()
            .unwrap()
            .get(id)
            .map(|info| info.duration_secs)
            .unwrap_or(180.0);
        tokio::fs::write(dest, duration.to_string())
            .await
            .map_err(|e| ResolverError::Transient(e.to_string()))
    }

    async fn get_recommendations(
        &self,
        seed: &TrackId,
    ) -> std::result::Result<Vec<TrackId>, ResolverError> {
        self.recommendation_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .recommendations
            .lock()
            .unwrap()
            .get(seed)
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

/// Reads the duration written into the file as text
#[derive(Default)]
pub struct ContentProbe;

#[async_trait]
impl DurationProbe for ContentProbe {
    async fn probe(&self, path: &Path) -> Result<Option<f64>> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(text.trim().parse().ok())
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TransportState {
    connects: usize,
    failing_connects: u32,
    failing_plays: u32,
    plays: Vec<(TrackId, PlaybackId)>,
    pauses: usize,
    unpauses: usize,
    stops: usize,
    disconnects: usize,
    volume: Option<f32>,
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
}

/// Transport that only records calls; completions are triggered by the test
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<TransportState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track ids handed to `play`, in order
    pub fn played(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .plays
            .iter()
            .map(|(id, _)| id.to_string())
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn pauses(&self) -> usize {
        self.state.lock().unwrap().pauses
    }

    pub fn unpauses(&self) -> usize {
        self.state.lock().unwrap().unpauses
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().unwrap().disconnects
    }

    pub fn volume(&self) -> Option<f32> {
        self.state.lock().unwrap().volume
    }

    pub fn fail_connects(&self, times: u32) {
        self.state.lock().unwrap().failing_connects = times;
    }

    pub fn fail_plays(&self, times: u32) {
        self.state.lock().unwrap().failing_plays = times;
    }

    fn last_playback_id(&self) -> PlaybackId {
        self.state
            .lock()
            .unwrap()
            .plays
            .last()
            .map(|(_, pid)| *pid)
            .expect("nothing has been played")
    }

    fn send(&self, event: TransportEvent) {
        let state = self.state.lock().unwrap();
        let events = state.events.as_ref().expect("transport never connected");
        events.send(event).expect("engine dropped transport events");
    }

    /// Report the most recent resource as played to its end
    pub fn finish_current(&self) {
        let playback_id = self.last_playback_id();
        self.send(TransportEvent::Finished { playback_id });
    }

    /// Report a completion for an arbitrary playback id
    pub fn finish(&self, playback_id: PlaybackId) {
        self.send(TransportEvent::Finished { playback_id });
    }

    pub fn error_current(&self, message: &str) {
        let playback_id = self.last_playback_id();
        self.send(TransportEvent::Error {
            playback_id,
            message: message.to_string(),
        });
    }

    pub fn drop_connection(&self) {
        self.send(TransportEvent::Disconnected);
    }

    pub fn current_playback_id(&self) -> PlaybackId {
        self.last_playback_id()
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(
        &self,
        _channel: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> std::result::Result<Box<dyn VoiceConnection>, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(TransportError::Connect("channel unreachable".to_string()));
        }
        state.connects += 1;
        state.events = Some(events);
        Ok(Box::new(FakeConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeConnection {
    state: Arc<Mutex<TransportState>>,
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    async fn play(
        &mut self,
        resource: PlayResource,
        playback_id: PlaybackId,
    ) -> std::result::Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_plays > 0 {
            state.failing_plays -= 1;
            return Err(TransportError::Playback("decoder crashed".to_string()));
        }
        state.plays.push((resource.track_id, playback_id));
        Ok(())
    }

    async fn pause(&mut self) -> std::result::Result<(), TransportError> {
        self.state.lock().unwrap().pauses += 1;
        Ok(())
    }

    async fn unpause(&mut self) -> std::result::Result<(), TransportError> {
        self.state.lock().unwrap().unpauses += 1;
        Ok(())
    }

    async fn stop(&mut self) -> std::result::Result<(), TransportError> {
        self.state.lock().unwrap().stops += 1;
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.lock().unwrap().volume = Some(volume);
    }

    async fn disconnect(&mut self) {
        self.state.lock().unwrap().disconnects += 1;
    }
}

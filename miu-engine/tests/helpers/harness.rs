//! Engine test harness

use super::{ContentProbe, FakeResolver, FakeTransport, MemoryStore};
use miu_common::events::{EngineEvent, EngineSnapshot, EventBus};
use miu_engine::{Engine, EngineConfig, EngineDeps, EngineHandle};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Configuration with short delays and autoplay off
pub fn test_config(data_dir: &std::path::Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.storage.data_dir = Some(data_dir.to_path_buf());
    config.playback.autoplay = false;
    config.playback.error_retry_delay_ms = 20;
    config.playback.reconnect_delay_ms = 20;
    config.cache.retry_backoff_ms = 10;
    config.publisher.debounce_ms = 10;
    config.selector.rng_seed = Some(7);
    config
}

pub struct TestEngine {
    pub handle: EngineHandle,
    pub store: Arc<MemoryStore>,
    pub resolver: Arc<FakeResolver>,
    pub transport: FakeTransport,
    pub events: EventBus,
    pub data_dir: TempDir,
}

impl TestEngine {
    /// Start with a fresh store, resolver and transport
    pub async fn start(configure: impl FnOnce(&mut EngineConfig)) -> Self {
        let data_dir = tempfile::tempdir().unwrap();
        Self::start_with(
            data_dir,
            Arc::new(MemoryStore::new()),
            Arc::new(FakeResolver::new()),
            configure,
        )
        .await
    }

    /// Start over pre-populated collaborators
    pub async fn start_with(
        data_dir: TempDir,
        store: Arc<MemoryStore>,
        resolver: Arc<FakeResolver>,
        configure: impl FnOnce(&mut EngineConfig),
    ) -> Self {
        let mut config = test_config(data_dir.path());
        configure(&mut config);

        let transport = FakeTransport::new();
        let events = EventBus::new(256);
        let deps = EngineDeps {
            store: store.clone(),
            resolver: resolver.clone(),
            transport: Arc::new(transport.clone()),
            tracking: store.clone(),
            probe: Arc::new(ContentProbe),
            events: events.clone(),
        };
        let handle = Engine::start(deps, config).await.unwrap();

        Self {
            handle,
            store,
            resolver,
            transport,
            events,
            data_dir,
        }
    }

    /// Add a track to both the store and the resolver
    pub fn add_track(&self, id: &str, duration_secs: f64) {
        self.store.add_track(id, duration_secs);
        self.resolver.add(id, duration_secs);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> EngineSnapshot {
        self.handle.get_state().await.unwrap()
    }

    /// Poll the engine state until `pred` holds (panics after ~5s)
    pub async fn wait_for_state<F>(&self, what: &str, pred: F) -> EngineSnapshot
    where
        F: Fn(&EngineSnapshot) -> bool,
    {
        for _ in 0..500 {
            let state = self.state().await;
            if pred(&state) {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}: {:?}", self.state().await);
    }

    /// Poll until the transport has been asked to play `count` resources
    pub async fn wait_for_plays(&self, count: usize) -> Vec<String> {
        for _ in 0..500 {
            let played = self.transport.played();
            if played.len() >= count {
                return played;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "timed out waiting for {count} plays, saw {:?}",
            self.transport.played()
        );
    }

    /// Poll a condition on the collaborators
    pub async fn wait_until<F>(&self, what: &str, pred: F)
    where
        F: Fn() -> bool,
    {
        for _ in 0..500 {
            if pred() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    /// Flush pending writes, then stop the engine
    pub async fn shutdown(&self) {
        self.handle.flush().await.unwrap();
        self.handle.shutdown().await.unwrap();
    }
}

/// Next event matching `pred`, skipping others (panics after ~5s)
pub async fn next_event<F>(rx: &mut broadcast::Receiver<EngineEvent>, pred: F) -> EngineEvent
where
    F: Fn(&EngineEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(event)) if pred(&event) => return event,
            Ok(Ok(_)) => continue,
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(e)) => panic!("event bus closed: {e}"),
            Err(_) => panic!("timed out waiting for event"),
        }
    }
}

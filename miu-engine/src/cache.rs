//! Audio cache manager
//!
//! Guarantees a validated local file exists for a track before playback.
//!
//! **Responsibilities:**
//! - `ensure_local`: return a cached file or download one, at most one
//!   download per track id at a time
//! - Validate cached files against the stored duration (once per process
//!   per track); mismatches are deleted and downloaded again
//! - Retry transient resolver failures; mark unavailable media inactive
//! - `prefetch`: background `ensure_local` for upcoming items
//! - `validate_and_prune`: startup/periodic sweep of partial downloads,
//!   orphan files, missing files and corrupt entries
//!
//! Downloads land in `{stem}.part` and are renamed to `{stem}.{ext}` only once
//! complete, so a crash never leaves a truncated file under a final name.
//! Stems are an escaped, reversible form of the track id (see
//! [`TrackId::file_stem`]), so the sweep can map every file back to the id
//! whose gate guards it.

use crate::collaborators::{DurationProbe, MediaResolver, ResolverError};
use crate::config::CacheConfig;
use crate::db::Store;
use crate::model::{AudioCacheEntry, TrackId};
use crate::{Error, Result};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Extension of in-progress downloads
const PARTIAL_EXTENSION: &str = "part";

/// Outcome of a validate-and-prune sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub partials_removed: usize,
    pub orphans_removed: usize,
    pub missing_entries: usize,
    pub invalid_removed: usize,
    pub validated: usize,
}

pub struct AudioCacheManager {
    cache_dir: PathBuf,
    config: CacheConfig,
    store: Arc<dyn Store>,
    resolver: Arc<dyn MediaResolver>,
    probe: Arc<dyn DurationProbe>,
    /// Per-id gate; holders of the inner lock own that id's cache slot
    in_flight: Mutex<HashMap<TrackId, Arc<Mutex<()>>>>,
    /// Ids already validated by this process
    validated: Mutex<HashSet<TrackId>>,
}

impl AudioCacheManager {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        config: CacheConfig,
        store: Arc<dyn Store>,
        resolver: Arc<dyn MediaResolver>,
        probe: Arc<dyn DurationProbe>,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            config,
            store,
            resolver,
            probe,
            in_flight: Mutex::new(HashMap::new()),
            validated: Mutex::new(HashSet::new()),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Validated local path for `id`, downloading if needed
    ///
    /// `Ok(None)` means the media is unavailable (the track has been marked
    /// inactive). Concurrent calls for one id share a single download.
    pub async fn ensure_local(&self, id: &TrackId) -> Result<Option<PathBuf>> {
        let gate = self.gate_for(id).await;
        let result = {
            let _slot = gate.lock().await;
            match self.lookup_valid(id).await? {
                Some(path) => Ok(Some(path)),
                None => self.download_with_retry(id).await,
            }
        };
        self.release_gate(id, &gate).await;
        result
    }

    /// Start `ensure_local` in the background unless already in flight
    pub fn prefetch(self: &Arc<Self>, id: TrackId) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if this.is_in_flight(&id).await {
                debug!(track_id = %id, "Prefetch skipped, already in flight");
                return;
            }
            match this.ensure_local(&id).await {
                Ok(Some(_)) => debug!(track_id = %id, "Prefetch complete"),
                Ok(None) => info!(track_id = %id, "Prefetch found media unavailable"),
                Err(e) => warn!(track_id = %id, error = %e, "Prefetch failed"),
            }
        });
    }

    pub async fn is_in_flight(&self, id: &TrackId) -> bool {
        self.in_flight.lock().await.contains_key(id)
    }

    /// Sweep the cache directory and entries
    pub async fn validate_and_prune(self: &Arc<Self>) -> Result<PruneReport> {
        let mut report = PruneReport::default();
        tokio::fs::create_dir_all(&self.cache_dir).await?;

        let mut dir = tokio::fs::read_dir(&self.cache_dir).await?;
        while let Some(dir_entry) = dir.next_entry().await? {
            if !dir_entry.file_type().await?.is_file() {
                continue;
            }
            let path = dir_entry.path();
            let is_partial = path.extension().and_then(|e| e.to_str()) == Some(PARTIAL_EXTENSION);
            let owner = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(TrackId::from_file_stem);

            let Some(id) = owner else {
                if remove_quietly(&path).await {
                    if is_partial {
                        report.partials_removed += 1;
                    } else {
                        report.orphans_removed += 1;
                    }
                }
                continue;
            };

            // With the gate held no download for this id is in progress
            let gate = self.gate_for(&id).await;
            let swept = {
                let _slot = gate.lock().await;
                self.sweep_file(&id, &path, is_partial).await
            };
            self.release_gate(&id, &gate).await;

            match swept? {
                Some(FileOutcome::Partial) => report.partials_removed += 1,
                Some(FileOutcome::Orphan) => report.orphans_removed += 1,
                None => {}
            }
        }

        let entries = self.store.cache_entries().await?;
        for entry in entries {
            let id = entry.track_id.clone();
            let gate = self.gate_for(&id).await;
            let outcome = {
                let _slot = gate.lock().await;
                self.sweep_entry(&entry).await
            };
            self.release_gate(&id, &gate).await;

            match outcome? {
                SweepOutcome::Valid => report.validated += 1,
                SweepOutcome::Missing => report.missing_entries += 1,
                SweepOutcome::Invalid => {
                    report.invalid_removed += 1;
                    if matches!(self.store.get_track(&id).await?, Some(t) if t.is_selectable()) {
                        self.prefetch(id);
                    }
                }
            }
        }

        info!(
            partials = report.partials_removed,
            orphans = report.orphans_removed,
            missing = report.missing_entries,
            invalid = report.invalid_removed,
            validated = report.validated,
            "Audio cache sweep complete"
        );
        Ok(report)
    }

    /// Remove `path` if it is a leftover partial or no entry references it
    ///
    /// Caller holds the gate for `id`.
    async fn sweep_file(
        &self,
        id: &TrackId,
        path: &Path,
        is_partial: bool,
    ) -> Result<Option<FileOutcome>> {
        if is_partial {
            return Ok(remove_quietly(path).await.then_some(FileOutcome::Partial));
        }
        let referenced = matches!(
            self.store.cache_entry(id).await?,
            Some(entry) if entry.file_path == path
        );
        if referenced {
            return Ok(None);
        }
        Ok(remove_quietly(path).await.then_some(FileOutcome::Orphan))
    }

    async fn sweep_entry(&self, entry: &AudioCacheEntry) -> Result<SweepOutcome> {
        if !file_exists(&entry.file_path).await {
            self.store.delete_cache_entry(&entry.track_id).await?;
            self.validated.lock().await.remove(&entry.track_id);
            return Ok(SweepOutcome::Missing);
        }
        if self.duration_matches(entry).await? {
            self.validated.lock().await.insert(entry.track_id.clone());
            Ok(SweepOutcome::Valid)
        } else {
            self.discard(entry).await?;
            Ok(SweepOutcome::Invalid)
        }
    }

    /// Cached path if present and valid; drops stale or corrupt entries
    async fn lookup_valid(&self, id: &TrackId) -> Result<Option<PathBuf>> {
        let Some(entry) = self.store.cache_entry(id).await? else {
            return Ok(None);
        };

        if !file_exists(&entry.file_path).await {
            warn!(track_id = %id, path = %entry.file_path.display(), "Cached file missing, dropping entry");
            self.store.delete_cache_entry(id).await?;
            self.validated.lock().await.remove(id);
            return Ok(None);
        }

        if self.validated.lock().await.contains(id) {
            return Ok(Some(entry.file_path));
        }

        if self.duration_matches(&entry).await? {
            self.validated.lock().await.insert(id.clone());
            Ok(Some(entry.file_path))
        } else {
            self.discard(&entry).await?;
            Ok(None)
        }
    }

    /// Compare probed duration with the stored track duration
    ///
    /// Unknown expected duration, or a container that cannot be probed,
    /// counts as a match.
    async fn duration_matches(&self, entry: &AudioCacheEntry) -> Result<bool> {
        let expected = match self.store.get_track(&entry.track_id).await? {
            Some(track) if track.duration_secs > 0.0 => track.duration_secs,
            _ if entry.duration_secs > 0.0 => entry.duration_secs,
            _ => return Ok(true),
        };

        match self.probe.probe(&entry.file_path).await {
            Ok(Some(actual)) => {
                let delta = (actual - expected).abs();
                if delta > self.config.duration_tolerance_secs {
                    warn!(
                        track_id = %entry.track_id,
                        expected,
                        actual,
                        "Cached file duration mismatch, treating as corrupt"
                    );
                    return Ok(false);
                }
                Ok(true)
            }
            Ok(None) => Ok(true),
            Err(e) => {
                warn!(track_id = %entry.track_id, error = %e, "Cannot probe cached file, trusting it");
                Ok(true)
            }
        }
    }

    async fn discard(&self, entry: &AudioCacheEntry) -> Result<()> {
        remove_quietly(&entry.file_path).await;
        self.store.delete_cache_entry(&entry.track_id).await?;
        self.validated.lock().await.remove(&entry.track_id);
        Ok(())
    }

    async fn download_with_retry(&self, id: &TrackId) -> Result<Option<PathBuf>> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;

        let stem = id.file_stem();
        let partial = self
            .cache_dir
            .join(format!("{}.{}", stem, PARTIAL_EXTENSION));
        let final_path = self
            .cache_dir
            .join(format!("{}.{}", stem, self.config.file_extension));
        let attempts = self.config.retry_attempts.max(1);

        for attempt in 1..=attempts {
            debug!(track_id = %id, attempt, "Downloading");
            match self.resolver.download(id, &partial).await {
                Ok(()) => {
                    return self
                        .commit_download(id, &partial, &final_path)
                        .await
                        .map(Some);
                }
                Err(ResolverError::Unavailable(reason)) => {
                    remove_quietly(&partial).await;
                    warn!(track_id = %id, reason = %reason, "Media unavailable, marking inactive");
                    self.store.set_track_active(id, false).await?;
                    return Ok(None);
                }
                Err(ResolverError::Transient(reason)) => {
                    remove_quietly(&partial).await;
                    if attempt < attempts {
                        warn!(
                            track_id = %id,
                            attempt,
                            max_attempts = attempts,
                            backoff_ms = self.config.retry_backoff_ms,
                            reason = %reason,
                            "Download failed, will retry after backoff"
                        );
                        tokio::time::sleep(self.config.retry_backoff()).await;
                    } else {
                        error!(track_id = %id, attempts, reason = %reason, "Download failed: retries exhausted");
                        return Err(Error::Resolver(ResolverError::Transient(reason)));
                    }
                }
            }
        }

        Err(Error::Cache(format!("no download attempt made for {}", id)))
    }

    async fn commit_download(
        &self,
        id: &TrackId,
        partial: &Path,
        final_path: &Path,
    ) -> Result<PathBuf> {
        tokio::fs::rename(partial, final_path).await?;

        let probed = match self.probe.probe(final_path).await {
            Ok(duration) => duration,
            Err(e) => {
                warn!(track_id = %id, error = %e, "Cannot probe downloaded file");
                None
            }
        };
        let expected = self
            .store
            .get_track(id)
            .await?
            .map(|t| t.duration_secs)
            .filter(|d| *d > 0.0);

        let duration_secs = match (probed, expected) {
            (Some(actual), Some(expected))
                if (actual - expected).abs() > self.config.duration_tolerance_secs =>
            {
                warn!(
                    track_id = %id,
                    expected,
                    actual,
                    "Downloaded duration differs from metadata, correcting stored duration"
                );
                self.store.update_track_duration(id, actual).await?;
                actual
            }
            (Some(actual), _) => actual,
            (None, Some(expected)) => expected,
            (None, None) => 0.0,
        };

        self.store
            .put_cache_entry(&AudioCacheEntry {
                track_id: id.clone(),
                file_path: final_path.to_path_buf(),
                duration_secs,
                cached_at: Utc::now(),
            })
            .await?;
        self.validated.lock().await.insert(id.clone());

        info!(track_id = %id, path = %final_path.display(), duration_secs, "Cached audio");
        Ok(final_path.to_path_buf())
    }

    async fn gate_for(&self, id: &TrackId) -> Arc<Mutex<()>> {
        let mut map = self.in_flight.lock().await;
        Arc::clone(map.entry(id.clone()).or_default())
    }

    /// Drop the gate once no other caller holds or awaits it
    async fn release_gate(&self, id: &TrackId, gate: &Arc<Mutex<()>>) {
        let mut map = self.in_flight.lock().await;
        let ours = map.get(id).map(|g| Arc::ptr_eq(g, gate)).unwrap_or(false);
        if ours && Arc::strong_count(gate) <= 2 {
            map.remove(id);
        }
    }
}

enum SweepOutcome {
    Valid,
    Missing,
    Invalid,
}

enum FileOutcome {
    Partial,
    Orphan,
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Returns whether a file was actually removed
async fn remove_quietly(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed cache file");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove cache file");
            false
        }
    }
}

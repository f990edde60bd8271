//! Local library resolver
//!
//! Serves ids from a flat directory of audio files named `{id}.{ext}`.
//! Titles come from the file stem, durations from the probe. "Downloading"
//! copies the file into the cache. Recommendations for a seed are the
//! library entries that follow it in name order, wrapping around.

use super::probe::DurationProbe;
use super::resolver::{MediaInfo, MediaResolver, ResolverError};
use crate::model::TrackId;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// File extensions treated as audio
const AUDIO_EXTENSIONS: &[&str] = &["opus", "ogg", "mp3", "m4a", "flac", "wav", "webm", "mka"];

/// Ids returned per recommendation request
const RECOMMENDATIONS_PER_SEED: usize = 10;

pub struct LocalLibraryResolver {
    root: PathBuf,
    probe: Arc<dyn DurationProbe>,
}

impl LocalLibraryResolver {
    pub fn new(root: impl Into<PathBuf>, probe: Arc<dyn DurationProbe>) -> Self {
        Self {
            root: root.into(),
            probe,
        }
    }

    /// All (id, path) pairs in the library, sorted by id
    async fn entries(&self) -> Result<Vec<(TrackId, PathBuf)>, ResolverError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ResolverError::Transient(format!(
                    "cannot read library {}: {}",
                    self.root.display(),
                    e
                )))
            }
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| ResolverError::Transient(e.to_string()))?
        {
            let path = entry.path();
            let is_audio = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if !is_audio {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                entries.push((TrackId::new(stem), path));
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    async fn locate(&self, id: &TrackId) -> Result<PathBuf, ResolverError> {
        self.entries()
            .await?
            .into_iter()
            .find(|(entry_id, _)| entry_id == id)
            .map(|(_, path)| path)
            .ok_or_else(|| ResolverError::Unavailable(format!("{} not in library", id)))
    }
}

#[async_trait]
impl MediaResolver for LocalLibraryResolver {
    async fn get_info(&self, id: &TrackId) -> Result<MediaInfo, ResolverError> {
        let path = self.locate(id).await?;
        let duration_secs = match self.probe.probe(&path).await {
            Ok(Some(secs)) => secs,
            Ok(None) => 0.0,
            Err(e) => {
                return Err(ResolverError::Unavailable(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(MediaInfo {
            title: id.to_string(),
            duration_secs,
            thumbnail: None,
            channel_id: None,
        })
    }

    async fn download(&self, id: &TrackId, dest: &Path) -> Result<(), ResolverError> {
        let source = self.locate(id).await?;
        debug!(track_id = %id, from = %source.display(), to = %dest.display(), "Copying library file");
        tokio::fs::copy(&source, dest)
            .await
            .map(|_| ())
            .map_err(|e| ResolverError::Transient(format!("copy failed: {}", e)))
    }

    async fn get_recommendations(&self, seed: &TrackId) -> Result<Vec<TrackId>, ResolverError> {
        let ids: Vec<TrackId> = self.entries().await?.into_iter().map(|(id, _)| id).collect();
        let start = ids.iter().position(|id| id == seed).map(|i| i + 1).unwrap_or(0);

        Ok(ids
            .iter()
            .cycle()
            .skip(start)
            .take(ids.len())
            .filter(|id| *id != seed)
            .take(RECOMMENDATIONS_PER_SEED)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;

    struct FixedProbe(f64);

    #[async_trait]
    impl DurationProbe for FixedProbe {
        async fn probe(&self, _path: &Path) -> Result<Option<f64>> {
            Ok(Some(self.0))
        }
    }

    fn library(names: &[&str]) -> (tempfile::TempDir, LocalLibraryResolver) {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), b"audio").unwrap();
        }
        let resolver = LocalLibraryResolver::new(dir.path(), Arc::new(FixedProbe(120.0)));
        (dir, resolver)
    }

    #[tokio::test]
    async fn test_get_info_uses_stem_and_probe() {
        let (_dir, resolver) = library(&["alpha.mp3", "notes.txt"]);

        let info = resolver.get_info(&TrackId::new("alpha")).await.unwrap();
        assert_eq!(info.title, "alpha");
        assert_eq!(info.duration_secs, 120.0);

        let missing = resolver.get_info(&TrackId::new("notes")).await;
        assert!(matches!(missing, Err(ResolverError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_download_copies_file() {
        let (dir, resolver) = library(&["alpha.mp3"]);
        let dest = dir.path().join("out.part");

        resolver.download(&TrackId::new("alpha"), &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"audio");
    }

    #[tokio::test]
    async fn test_recommendations_wrap_after_seed() {
        let (_dir, resolver) = library(&["a.mp3", "b.mp3", "c.mp3", "d.mp3"]);

        let recs = resolver.get_recommendations(&TrackId::new("c")).await.unwrap();
        let ids: Vec<&str> = recs.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["d", "a", "b"]);
    }
}

//! Duration probing for cached audio
//!
//! Only the container is read; nothing is decoded. Files whose container
//! does not record a frame count yield `Ok(None)` and are trusted as-is.

use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Duration in seconds, or `None` when the container does not say
    async fn probe(&self, path: &Path) -> Result<Option<f64>>;
}

/// Container probe backed by symphonia
#[derive(Debug, Default, Clone)]
pub struct SymphoniaProbe;

impl SymphoniaProbe {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DurationProbe for SymphoniaProbe {
    async fn probe(&self, path: &Path) -> Result<Option<f64>> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || probe_duration(&path))
            .await
            .map_err(|e| Error::Internal(format!("probe task failed: {}", e)))?
    }
}

fn probe_duration(path: &Path) -> Result<Option<f64>> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Cache(format!("Failed to probe {}: {}", path.display(), e)))?;

    let Some(track) = probed.format.default_track() else {
        return Ok(None);
    };
    let params = &track.codec_params;

    let duration = match (params.n_frames, params.time_base, params.sample_rate) {
        (Some(frames), Some(time_base), _) => {
            let time = time_base.calc_time(frames);
            Some(time.seconds as f64 + time.frac)
        }
        (Some(frames), None, Some(rate)) if rate > 0 => Some(frames as f64 / f64::from(rate)),
        _ => None,
    };
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal PCM WAV with `frames` mono 16-bit samples at `rate`
    fn write_wav(path: &Path, rate: u32, frames: u32) {
        let data_len = frames * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.resize(bytes.len() + data_len as usize, 0);
        std::fs::write(path, bytes).unwrap();
    }

    #[tokio::test]
    async fn test_probe_reads_wav_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 8000, 16000);

        let secs = SymphoniaProbe::new().probe(&path).await.unwrap().unwrap();
        assert!((secs - 2.0).abs() < 0.01, "got {}", secs);
    }

    #[tokio::test]
    async fn test_probe_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.mp3");
        std::fs::write(&path, b"definitely not audio").unwrap();

        assert!(SymphoniaProbe::new().probe(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_probe_missing_file_is_io_error() {
        let result = SymphoniaProbe::new()
            .probe(Path::new("/nonexistent/miu/file.wav"))
            .await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}

//! Configuration file discovery and TOML loading
//!
//! Resolution order for the configuration file:
//! 1. Command-line argument (highest priority)
//! 2. `MIU_CONFIG` environment variable
//! 3. User config directory (`~/.config/miu/config.toml` on Linux)
//! 4. System config (`/etc/miu/config.toml`, Linux only)
//!
//! A missing configuration file is never fatal: callers receive `None` and
//! fall back to compiled defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MIU_CONFIG";

/// Environment variable naming the data directory (database + audio cache)
pub const DATA_DIR_ENV_VAR: &str = "MIU_DATA_DIR";

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full `EnvFilter` directive
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Locate the configuration file following the priority order above
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    if let Some(user_config) = dirs::config_dir().map(|d| d.join("miu").join("config.toml")) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/miu/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Resolve the data directory
///
/// Priority: command-line argument, `MIU_DATA_DIR`, configured value,
/// OS-dependent default.
pub fn resolve_data_dir(cli_arg: Option<&Path>, configured: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(DATA_DIR_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = configured {
        return path.to_path_buf();
    }

    default_data_dir()
}

/// OS-dependent default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("miu"))
        .unwrap_or_else(|| PathBuf::from("./miu_data"))
}

/// Load a TOML document into `T`
///
/// - `None` path or missing file: warn and return `T::default()`
/// - Unreadable or malformed file: `Error::Config`
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        warn!("No configuration file found, using compiled defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            "Configuration file {} does not exist, using compiled defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

    let parsed = toml::from_str::<T>(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Sample {
        name: String,
        logging: LoggingConfig,
    }

    #[test]
    fn test_load_toml_none_returns_default() {
        let sample: Sample = load_toml(None).unwrap();
        assert!(sample.name.is_empty());
        assert_eq!(sample.logging.level, "info");
    }

    #[test]
    fn test_load_toml_parses_partial_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "name = \"radio\"\n[logging]\nlevel = \"debug\"\n").unwrap();

        let sample: Sample = load_toml(Some(&path)).unwrap();
        assert_eq!(sample.name, "radio");
        assert_eq!(sample.logging.level, "debug");
    }

    #[test]
    fn test_load_toml_rejects_malformed_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "name = [unterminated").unwrap();

        let result: Result<Sample> = load_toml(Some(&path));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}

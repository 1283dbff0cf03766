//! Configuration file parser for ~/.config/feedwarden/config.toml.
//!
//! The config file is optional. A missing file yields `Config::default()`.
//! Unknown keys are accepted but logged, since they are usually typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{ValidatorConfig, DEFAULT_USER_AGENT};
use crate::manager::ManagerConfig;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-attempt timeout for fetching a feed, in seconds.
    pub timeout_secs: u64,

    /// Pause between the first and second validation attempt, in milliseconds.
    pub retry_delay_ms: u64,

    /// Upper bound on concurrent validations and classifications.
    pub max_concurrent: usize,

    pub user_agent: String,

    /// Where deleted feeds are archived. Relative paths resolve against the
    /// working directory.
    pub deleted_archive: PathBuf,

    /// Where feeds that fail validation on load are written.
    pub invalid_archive: PathBuf,

    /// Whether to guess genres for `Other` feeds after loading.
    pub classify_on_load: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            retry_delay_ms: 1000,
            max_concurrent: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            deleted_archive: PathBuf::from("deleted_feeds.opml"),
            invalid_archive: PathBuf::from("invalid_feeds.opml"),
            classify_on_load: true,
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: &'static [&'static str] = &[
        "timeout_secs",
        "retry_delay_ms",
        "max_concurrent",
        "user_agent",
        "deleted_archive",
        "invalid_archive",
        "classify_on_load",
    ];

    /// `~/.config/feedwarden/config.toml`, or `None` when `HOME` is unset.
    pub fn default_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(
            PathBuf::from(home)
                .join(".config")
                .join("feedwarden")
                .join("config.toml"),
        )
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            timeout_secs = config.timeout_secs,
            max_concurrent = config.max_concurrent,
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn validator(&self) -> ValidatorConfig {
        ValidatorConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            // A cap of 0 would stall every batch
            max_concurrent: self.max_concurrent.max(1),
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn manager(&self) -> ManagerConfig {
        ManagerConfig {
            validator: self.validator(),
            deleted_archive: self.deleted_archive.clone(),
            invalid_archive: self.invalid_archive.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Configuration file parser for the optional `--config <FILE>` TOML file.
//!
//! Passing a config file is optional, but a path that is passed must exist.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A value parsed but cannot be used.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level migration configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feed/category rows loaded per transaction.
    pub feed_batch_size: usize,

    /// Article rows loaded per transaction.
    pub article_batch_size: usize,

    /// Insert statements executed per sub-chunk inside a batch transaction.
    pub insert_chunk_size: usize,

    /// Source id of the placeholder top-level category.
    pub root_sentinel_id: i64,

    /// Whether nodes tied to `root_sentinel_id` are reparented to the top level.
    pub remap_root_sentinel: bool,

    /// Directory holding statement template overrides (same file names as `sql/`).
    pub templates_dir: Option<PathBuf>,

    /// Session tuning applied while the migration runs.
    pub tuning: SessionTuning,
}

/// Engine settings for both sessions during the run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionTuning {
    /// `PRAGMA cache_size` for both sessions (pages when positive, KiB when negative).
    pub cache_size: i64,

    /// `PRAGMA page_size` for the destination.
    pub page_size: u32,

    /// How long either session waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_batch_size: 2000,
            article_batch_size: 5000,
            insert_chunk_size: 2000,
            root_sentinel_id: 122,
            remap_root_sentinel: true,
            templates_dir: None,
            tuning: SessionTuning::default(),
        }
    }
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            cache_size: 20000,
            page_size: 4096,
            busy_timeout_ms: 30_000,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    ///
    /// A real config is a few hundred bytes; anything near this limit is the
    /// wrong file (often a database passed by mistake), so it is refused
    /// before being read into memory.
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Err(ConfigError::Io)` (the path was given explicitly)
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    /// - Unusable values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "feed_batch_size",
                "article_batch_size",
                "insert_chunk_size",
                "root_sentinel_id",
                "remap_root_sentinel",
                "templates_dir",
                "tuning",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            feed_batch_size = config.feed_batch_size,
            article_batch_size = config.article_batch_size,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Reject values the migration cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "feed_batch_size must be at least 1".into(),
            ));
        }
        if self.article_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "article_batch_size must be at least 1".into(),
            ));
        }
        if self.insert_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "insert_chunk_size must be at least 1".into(),
            ));
        }
        let page_size = self.tuning.page_size;
        if !(512..=65536).contains(&page_size) || !page_size.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "tuning.page_size must be a power of two between 512 and 65536, got {page_size}"
            )));
        }
        Ok(())
    }

    /// The sentinel id to remap, or `None` when remapping is switched off.
    pub fn root_sentinel(&self) -> Option<i64> {
        self.remap_root_sentinel.then_some(self.root_sentinel_id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("rss_migrate_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.feed_batch_size, 2000);
        assert_eq!(config.article_batch_size, 5000);
        assert_eq!(config.insert_chunk_size, 2000);
        assert_eq!(config.root_sentinel(), Some(122));
        assert!(config.templates_dir.is_none());
        assert_eq!(config.tuning.cache_size, 20000);
        assert_eq!(config.tuning.page_size, 4096);
        assert_eq!(config.tuning.busy_timeout_ms, 30_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let path = std::env::temp_dir().join("rss_migrate_test_nonexistent_config.toml");
        std::fs::remove_file(&path).ok();

        let err = Config::load(&path).unwrap_err();
        match err {
            ConfigError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (dir, path) = write_config("whitespace", "   \n  \n  ");

        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (dir, path) = write_config("partial", "article_batch_size = 250\n");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.article_batch_size, 250);
        assert_eq!(config.feed_batch_size, 2000);
        assert_eq!(config.tuning.page_size, 4096);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let content = r#"
feed_batch_size = 100
article_batch_size = 400
insert_chunk_size = 50
root_sentinel_id = 7
remap_root_sentinel = false
templates_dir = "/opt/templates"

[tuning]
cache_size = -64000
page_size = 8192
busy_timeout_ms = 1000
"#;
        let (dir, path) = write_config("full", content);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.feed_batch_size, 100);
        assert_eq!(config.article_batch_size, 400);
        assert_eq!(config.insert_chunk_size, 50);
        assert_eq!(config.root_sentinel_id, 7);
        assert_eq!(config.root_sentinel(), None);
        assert_eq!(config.templates_dir, Some(PathBuf::from("/opt/templates")));
        assert_eq!(config.tuning.cache_size, -64000);
        assert_eq!(config.tuning.page_size, 8192);
        assert_eq!(config.tuning.busy_timeout_ms, 1000);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = write_config("invalid", "this is not [valid toml");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (dir, path) = write_config("unknown", "feed_batch_size = 10\ntheme = \"dark\"\n");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.feed_batch_size, 10);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let (dir, path) = write_config("zero_batch", "article_batch_size = 0\n");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("article_batch_size"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_bad_page_size_rejected() {
        let mut config = Config::default();
        config.tuning.page_size = 3000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.tuning.page_size = 256;
        assert!(config.validate().is_err());

        config.tuning.page_size = 65536;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"a".repeat(1_048_577));

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }
}

//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::index::IndexConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub index: IndexSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Index file configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_page_buffer_size")]
    pub page_buffer_size: usize,

    #[serde(default = "default_page_cache_pages")]
    pub page_cache_pages: usize,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("tracedex").to_string_lossy().to_string())
        .unwrap_or_else(|| "./tracedex_data".to_string())
}

fn default_page_size() -> usize {
    4096
}

fn default_page_buffer_size() -> usize {
    64 * 1024 * 1024 // 64 MiB
}

fn default_page_cache_pages() -> usize {
    1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            page_size: default_page_size(),
            page_buffer_size: default_page_buffer_size(),
            page_cache_pages: default_page_cache_pages(),
        }
    }
}

/// Index building configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IndexSettings {
    #[serde(default = "default_task_size")]
    pub task_size: usize,

    #[serde(default = "default_use_threshold")]
    pub use_threshold: u32,

    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    #[serde(default = "default_behavior_count")]
    pub behavior_count: usize,
}

fn default_task_size() -> usize {
    1024
}

fn default_use_threshold() -> u32 {
    10
}

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_behavior_count() -> usize {
    200_000
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            task_size: default_task_size(),
            use_threshold: default_use_threshold(),
            worker_threads: default_worker_threads(),
            behavior_count: default_behavior_count(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("tracedex").join("config.toml")),
            Some(PathBuf::from("/etc/tracedex/config.toml")),
            Some(PathBuf::from("./tracedex.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Settings handed to `Indexes::open`
    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            page_size: self.storage.page_size,
            page_buffer_size: self.storage.page_buffer_size,
            page_cache_pages: self.storage.page_cache_pages,
            task_size: self.index.task_size,
            use_threshold: self.index.use_threshold,
            worker_threads: self.index.worker_threads.max(1),
            behavior_count: self.index.behavior_count,
        }
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Storage overrides
        if let Some(data_dir) = var("TRACEDEX_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }
        if let Some(size) = var("TRACEDEX_PAGE_SIZE").and_then(|v| v.parse().ok()) {
            self.storage.page_size = size;
        }
        if let Some(size) = var("TRACEDEX_PAGE_BUFFER_SIZE").and_then(|v| v.parse().ok()) {
            self.storage.page_buffer_size = size;
        }

        // Index overrides
        if let Some(threads) = var("TRACEDEX_WORKER_THREADS").and_then(|v| v.parse().ok()) {
            self.index.worker_threads = threads;
        }
        if let Some(size) = var("TRACEDEX_TASK_SIZE").and_then(|v| v.parse().ok()) {
            self.index.task_size = size;
        }

        // Logging overrides
        if let Some(level) = var("TRACEDEX_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("TRACEDEX_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Tracedex Configuration
#
# Environment variables override these settings:
# - TRACEDEX_DATA_DIR
# - TRACEDEX_PAGE_SIZE
# - TRACEDEX_PAGE_BUFFER_SIZE
# - TRACEDEX_WORKER_THREADS
# - TRACEDEX_TASK_SIZE
# - TRACEDEX_LOG_LEVEL
# - TRACEDEX_LOG_FORMAT

[storage]
# Directory holding the index file
data_dir = "~/.local/share/tracedex"

# Page size of the index file (bytes)
page_size = 4096

# Memory budget for resident indexes (bytes)
page_buffer_size = 67108864

# Decoded pages kept in the page cache
page_cache_pages = 1024

[index]
# Tuples collected before a write batch is handed to the workers
task_size = 1024

# Accesses before an index is promoted in the residency order
use_threshold = 10

# Worker threads applying write batches (default: available cores)
# worker_threads = 8

# Initial size of the per-behavior counter array
behavior_count = 200000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_parses() {
        let config = Config::parse(&generate_default_config(), Path::new("default.toml")).unwrap();
        assert_eq!(config.storage.page_size, 4096);
        assert_eq!(config.storage.page_buffer_size, 64 * 1024 * 1024);
        assert_eq!(config.index.task_size, 1024);
        assert_eq!(config.index.use_threshold, 10);
        assert_eq!(config.index.behavior_count, 200_000);
        assert_eq!(config.logging.format, "pretty");
        assert!(config.index.worker_threads >= 1);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tracedex.toml");
        std::fs::write(&path, "[storage]\npage_size = 512\n\n[index]\ntask_size = 16\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.storage.page_size, 512);
        assert_eq!(config.storage.page_cache_pages, 1024);
        assert_eq!(config.index.task_size, 16);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(&missing), Err(ConfigError::Io { .. })));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[storage\npage_size = ").unwrap();
        assert!(matches!(Config::load(&broken), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TRACEDEX_DATA_DIR", "/tmp/traces"),
            ("TRACEDEX_PAGE_SIZE", "8192"),
            ("TRACEDEX_WORKER_THREADS", "3"),
            ("TRACEDEX_TASK_SIZE", "not-a-number"),
            ("TRACEDEX_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.storage.data_dir, "/tmp/traces");
        assert_eq!(config.storage.page_size, 8192);
        assert_eq!(config.index.worker_threads, 3);
        assert_eq!(config.index.task_size, 1024);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_index_config() {
        let mut config = Config::default();
        config.storage.page_size = 1024;
        config.storage.page_buffer_size = 1024 * 10;
        config.index.worker_threads = 0;

        let index = config.index_config();
        assert_eq!(index.page_size, 1024);
        assert_eq!(index.page_buffer_size, 10 * 1024);
        assert_eq!(index.worker_threads, 1);
        assert_eq!(index.use_threshold, 10);
    }
}

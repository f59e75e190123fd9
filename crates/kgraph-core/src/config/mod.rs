//! Configuration management for kgraph.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Environment variables (highest priority)
//! 2. Project-local `kgraph.toml` file
//! 3. User config `~/.config/kgraph/config.toml`
//! 4. Built-in defaults (lowest priority)
//!
//! The resulting [`Config`] is built once per batch and passed explicitly to
//! each component.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod defaults;

pub use defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for crate::GraphError {
    fn from(err: ConfigError) -> Self {
        crate::GraphError::Config(err.to_string())
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source analysis configuration.
    pub analysis: AnalysisConfig,

    /// Storage configuration.
    pub storage: StorageConfig,

    /// Batch run configuration.
    pub batch: BatchConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Searches for config in order:
    /// 1. `./kgraph.toml` (project local)
    /// 2. `~/.config/kgraph/config.toml` (user config)
    /// 3. Falls back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        if Path::new(LOCAL_CONFIG_FILE).exists() {
            return Self::from_file(LOCAL_CONFIG_FILE);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join(USER_CONFIG_DIR).join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("KGRAPH_DATA_DIR") {
            self.storage.data_dir = dir;
        }
        if let Ok(backend) = std::env::var("KGRAPH_STORAGE_BACKEND") {
            self.storage.backend = backend;
        }
        if let Ok(bytes) = std::env::var("KGRAPH_MAX_DOCUMENT_BYTES") {
            if let Ok(n) = bytes.parse() {
                self.storage.max_document_bytes = n;
            }
        }
        if let Ok(concurrency) = std::env::var("KGRAPH_MAX_CONCURRENCY") {
            if let Ok(n) = concurrency.parse() {
                self.batch.max_concurrent_projects = n;
            }
        }
        if let Ok(level) = std::env::var("KGRAPH_LOG") {
            self.logging.level = level;
        }
    }

    /// Check limits and enumerations that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.max_document_bytes == 0 {
            return Err(ConfigError::Invalid(
                "storage.max_document_bytes must be greater than zero".into(),
            ));
        }
        if !(self.storage.fragment_fill_ratio > 0.0 && self.storage.fragment_fill_ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "storage.fragment_fill_ratio must be in (0, 1], got {}",
                self.storage.fragment_fill_ratio
            )));
        }
        if !STORAGE_BACKENDS.contains(&self.storage.backend.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "storage.backend must be one of {}, got `{}`",
                STORAGE_BACKENDS.join(", "),
                self.storage.backend
            )));
        }
        if self.batch.max_concurrent_projects == 0 {
            return Err(ConfigError::Invalid(
                "batch.max_concurrent_projects must be greater than zero".into(),
            ));
        }
        if self.analysis.include_extensions.is_empty() {
            return Err(ConfigError::Invalid(
                "analysis.include_extensions must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Create a default config file content as a string.
    pub fn default_config_string() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Source analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// File extensions to analyze (without leading dot).
    pub include_extensions: Vec<String>,

    /// Directories to exclude from scanning.
    pub exclude_dirs: Vec<String>,

    /// Maximum size of a single source file (in bytes).
    pub max_file_size: u64,

    /// Assembly name prefixes treated as the platform's standard library.
    pub platform_assembly_prefixes: Vec<String>,

    /// Base type that never produces an `inherits` edge.
    pub root_object_type: String,

    /// Assembly name assigned to predefined types by the source-index oracle.
    pub platform_assembly: String,

    /// Fail a project when any of its files has syntax errors.
    pub strict_compilation: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            include_extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            platform_assembly_prefixes: DEFAULT_PLATFORM_ASSEMBLY_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            root_object_type: DEFAULT_ROOT_OBJECT_TYPE.to_string(),
            platform_assembly: DEFAULT_PLATFORM_ASSEMBLY.to_string(),
            strict_compilation: false,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend name: "file", "surreal" or "memory".
    pub backend: String,

    /// Base directory for persisted data (default: ".kgraph").
    pub data_dir: String,

    /// Maximum size of a single stored document (in bytes).
    pub max_document_bytes: usize,

    /// Share of `max_document_bytes` each fragment is filled to.
    pub fragment_fill_ratio: f64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: DEFAULT_STORAGE_BACKEND.to_string(),
            data_dir: DEFAULT_DATA_DIR.to_string(),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            fragment_fill_ratio: DEFAULT_FRAGMENT_FILL_RATIO,
        }
    }
}

impl StorageConfig {
    /// Directory holding JSON documents for the file backend.
    pub fn graphs_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("graphs")
    }

    /// Directory holding the embedded database for the surreal backend.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("db")
    }
}

/// Batch run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum number of projects analyzed at the same time.
    pub max_concurrent_projects: usize,

    /// Key of the processing-state record. Defaults to the root directory name.
    pub batch_key: Option<String>,

    /// Attempts to persist a project when another writer conflicts.
    pub persist_retries: u32,

    /// Attempts of the whole batch when the oracle or storage is unavailable.
    pub batch_attempts: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_projects: DEFAULT_MAX_CONCURRENT_PROJECTS,
            batch_key: None,
            persist_retries: DEFAULT_PERSIST_RETRIES,
            batch_attempts: DEFAULT_BATCH_ATTEMPTS,
        }
    }
}

impl BatchConfig {
    /// Resolve the batch key for a source root.
    pub fn batch_key_for(&self, root: &Path) -> String {
        if let Some(key) = &self.batch_key {
            return key.clone();
        }
        root.canonicalize()
            .ok()
            .as_deref()
            .unwrap_or(root)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "default".to_string())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Tracing filter directive, e.g. "info" or "kgraph_core=debug".
    pub level: String,

    /// Emit JSON log lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            json: false,
        }
    }
}

//! Indexer configuration with precedence tracking.
//!
//! Precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (`XINDEX_*`)
//! 3. Project file (`.xindex.toml` in the workspace root)
//! 4. Defaults
//!
//! The resolved values are flattened into an [`IndexerConfig`], the explicit
//! struct handed to the pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use xindex_core::reconcile::AlignConfig;

/// Name of the project configuration file.
pub const PROJECT_FILE: &str = ".xindex.toml";

pub const ENV_THREADS: &str = "XINDEX_THREADS";
pub const ENV_BATCH_SIZE: &str = "XINDEX_BATCH_SIZE";
pub const ENV_TICK_MS: &str = "XINDEX_TICK_MS";
pub const ENV_BACKLOG_TIMEOUT_MS: &str = "XINDEX_BACKLOG_TIMEOUT_MS";
pub const ENV_CACHE_DIR: &str = "XINDEX_CACHE_DIR";

// ============================================================================
// Errors
// ============================================================================

/// Errors resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The project file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The project file is not valid TOML for the expected shape.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// An environment variable holds an unparsable value.
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    /// A resolved value is out of range.
    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

// ============================================================================
// Configuration Sources
// ============================================================================

/// Configuration value source (for precedence tracking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigSource {
    /// Built-in default value.
    Default = 0,
    /// From `.xindex.toml`.
    ProjectFile = 1,
    /// From environment variable.
    EnvVar = 2,
    /// From CLI flag (highest precedence).
    CliFlag = 3,
}

/// A configuration value with its source.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValue<T> {
    /// The actual value.
    pub value: T,
    /// Where the value came from.
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    /// Create a new config value with the given source.
    pub fn new(value: T, source: ConfigSource) -> Self {
        ConfigValue { value, source }
    }

    /// Merge with another value, preferring higher precedence.
    pub fn merge(self, other: Self) -> Self {
        if other.source >= self.source {
            other
        } else {
            self
        }
    }
}

impl<T: Default> ConfigValue<T> {
    fn override_with(&mut self, value: Option<T>, source: ConfigSource) {
        if let Some(value) = value {
            let current = std::mem::replace(self, ConfigValue::new(T::default(), source));
            *self = current.merge(ConfigValue::new(value, source));
        }
    }
}

/// Shape of `.xindex.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ProjectFile {
    threads: Option<usize>,
    batch_size: Option<usize>,
    tick_ms: Option<u64>,
    backlog_timeout_ms: Option<u64>,
    cache_dir: Option<PathBuf>,
    max_diff: Option<usize>,
    max_column_align: Option<usize>,
}

/// Overrides from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub threads: Option<usize>,
    pub batch_size: Option<usize>,
    pub tick_ms: Option<u64>,
    pub backlog_timeout_ms: Option<u64>,
    pub cache_dir: Option<PathBuf>,
}

// ============================================================================
// Configuration Resolution
// ============================================================================

/// Resolved configuration with precedence information.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Worker thread count.
    pub threads: ConfigValue<usize>,
    /// Maximum Deltas applied per consumer tick.
    pub batch_size: ConfigValue<usize>,
    /// Consumer tick in milliseconds.
    pub tick_ms: ConfigValue<u64>,
    /// How long a query waits for a path to be indexed.
    pub backlog_timeout_ms: ConfigValue<u64>,
    /// Directory of the persistent cache; `None` keeps the cache in memory.
    pub cache_dir: ConfigValue<Option<PathBuf>>,
    /// Line-matching distance cap.
    pub max_diff: ConfigValue<usize>,
    /// Longest line aligned column by column.
    pub max_column_align: ConfigValue<usize>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let align = AlignConfig::default();
        ResolvedConfig {
            threads: ConfigValue::new(threads, ConfigSource::Default),
            batch_size: ConfigValue::new(20, ConfigSource::Default),
            tick_ms: ConfigValue::new(50, ConfigSource::Default),
            backlog_timeout_ms: ConfigValue::new(3000, ConfigSource::Default),
            cache_dir: ConfigValue::new(
                dirs::cache_dir().map(|dir| dir.join("xindex")),
                ConfigSource::Default,
            ),
            max_diff: ConfigValue::new(align.max_diff, ConfigSource::Default),
            max_column_align: ConfigValue::new(align.max_column_align, ConfigSource::Default),
        }
    }
}

impl ResolvedConfig {
    /// Resolve configuration from all sources.
    pub fn resolve(workspace_root: &Path, cli: &CliOverrides) -> Result<Self, ConfigError> {
        let mut config = ResolvedConfig::default();

        let project_path = workspace_root.join(PROJECT_FILE);
        if project_path.exists() {
            config.apply_project_file(&project_path)?;
        }
        config.apply_env_vars()?;
        config.apply_cli_overrides(cli);
        config.validate()?;

        debug!(
            threads = config.threads.value,
            batch_size = config.batch_size.value,
            tick_ms = config.tick_ms.value,
            "resolved indexer configuration"
        );
        Ok(config)
    }

    fn apply_project_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ProjectFile = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let src = ConfigSource::ProjectFile;
        self.threads.override_with(file.threads, src);
        self.batch_size.override_with(file.batch_size, src);
        self.tick_ms.override_with(file.tick_ms, src);
        self.backlog_timeout_ms
            .override_with(file.backlog_timeout_ms, src);
        self.cache_dir.override_with(file.cache_dir.map(Some), src);
        self.max_diff.override_with(file.max_diff, src);
        self.max_column_align
            .override_with(file.max_column_align, src);
        Ok(())
    }

    fn apply_env_vars(&mut self) -> Result<(), ConfigError> {
        let src = ConfigSource::EnvVar;
        self.threads.override_with(env_value(ENV_THREADS)?, src);
        self.batch_size.override_with(env_value(ENV_BATCH_SIZE)?, src);
        self.tick_ms.override_with(env_value(ENV_TICK_MS)?, src);
        self.backlog_timeout_ms
            .override_with(env_value(ENV_BACKLOG_TIMEOUT_MS)?, src);
        if let Ok(dir) = std::env::var(ENV_CACHE_DIR) {
            // An empty value switches the cache to memory.
            let dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
            self.cache_dir.override_with(Some(dir), src);
        }
        Ok(())
    }

    fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        let src = ConfigSource::CliFlag;
        self.threads.override_with(cli.threads, src);
        self.batch_size.override_with(cli.batch_size, src);
        self.tick_ms.override_with(cli.tick_ms, src);
        self.backlog_timeout_ms
            .override_with(cli.backlog_timeout_ms, src);
        self.cache_dir
            .override_with(cli.cache_dir.clone().map(Some), src);
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.threads.value == 0 {
            return Err(ConfigError::InvalidValue {
                field: "threads",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.batch_size.value == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.tick_ms.value == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tick_ms",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Flatten into the struct passed to the pipeline.
    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            threads: self.threads.value,
            batch_size: self.batch_size.value,
            tick: Duration::from_millis(self.tick_ms.value),
            backlog_timeout: Duration::from_millis(self.backlog_timeout_ms.value),
            cache_dir: self.cache_dir.value.clone(),
            align: AlignConfig {
                max_diff: self.max_diff.value,
                max_column_align: self.max_column_align.value,
            },
        }
    }
}

fn env_value<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
        Err(_) => Ok(None),
    }
}

// ============================================================================
// Indexer Configuration
// ============================================================================

/// Settings the pipeline runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexerConfig {
    pub threads: usize,
    pub batch_size: usize,
    pub tick: Duration,
    pub backlog_timeout: Duration,
    pub cache_dir: Option<PathBuf>,
    pub align: AlignConfig,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        IndexerConfig {
            cache_dir: None,
            ..ResolvedConfig::default().indexer_config()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        for var in [
            ENV_THREADS,
            ENV_BATCH_SIZE,
            ENV_TICK_MS,
            ENV_BACKLOG_TIMEOUT_MS,
            ENV_CACHE_DIR,
        ] {
            std::env::remove_var(var);
        }
    }

    mod precedence {
        use super::*;

        #[test]
        fn merge_prefers_higher_source() {
            let low = ConfigValue::new(1, ConfigSource::ProjectFile);
            let high = ConfigValue::new(2, ConfigSource::EnvVar);
            assert_eq!(low.clone().merge(high.clone()).value, 2);
            assert_eq!(high.merge(low).value, 2);
        }

        #[test]
        #[serial]
        fn defaults_without_any_source() {
            clear_env();
            let dir = TempDir::new().unwrap();
            let config = ResolvedConfig::resolve(dir.path(), &CliOverrides::default()).unwrap();
            assert_eq!(config.batch_size, ConfigValue::new(20, ConfigSource::Default));
            assert_eq!(config.tick_ms.value, 50);
            assert_eq!(config.backlog_timeout_ms.value, 3000);
            assert_eq!(config.max_diff.value, 20);
            assert_eq!(config.max_column_align.value, 200);
            assert!(config.threads.value >= 1);
        }

        #[test]
        #[serial]
        fn project_file_then_env_then_cli() {
            clear_env();
            let dir = TempDir::new().unwrap();
            fs::write(
                dir.path().join(PROJECT_FILE),
                "threads = 2\nbatch_size = 5\ntick_ms = 10\nmax_diff = 7\n",
            )
            .unwrap();
            std::env::set_var(ENV_BATCH_SIZE, "8");
            std::env::set_var(ENV_TICK_MS, "15");

            let cli = CliOverrides {
                tick_ms: Some(30),
                ..Default::default()
            };
            let config = ResolvedConfig::resolve(dir.path(), &cli).unwrap();
            clear_env();

            assert_eq!(config.threads, ConfigValue::new(2, ConfigSource::ProjectFile));
            assert_eq!(config.batch_size, ConfigValue::new(8, ConfigSource::EnvVar));
            assert_eq!(config.tick_ms, ConfigValue::new(30, ConfigSource::CliFlag));
            assert_eq!(config.max_diff.value, 7);

            let indexer = config.indexer_config();
            assert_eq!(indexer.tick, Duration::from_millis(30));
            assert_eq!(indexer.align.max_diff, 7);
        }

        #[test]
        #[serial]
        fn empty_cache_dir_env_means_memory() {
            clear_env();
            std::env::set_var(ENV_CACHE_DIR, "");
            let dir = TempDir::new().unwrap();
            let config = ResolvedConfig::resolve(dir.path(), &CliOverrides::default()).unwrap();
            clear_env();
            assert_eq!(config.cache_dir.value, None);
            assert_eq!(config.cache_dir.source, ConfigSource::EnvVar);
        }
    }

    mod errors {
        use super::*;

        #[test]
        #[serial]
        fn bad_env_value_is_reported() {
            clear_env();
            std::env::set_var(ENV_THREADS, "many");
            let dir = TempDir::new().unwrap();
            let err = ResolvedConfig::resolve(dir.path(), &CliOverrides::default()).unwrap_err();
            clear_env();
            assert!(matches!(err, ConfigError::InvalidEnv { var, .. } if var == ENV_THREADS));
        }

        #[test]
        #[serial]
        fn unknown_project_key_is_a_parse_error() {
            clear_env();
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join(PROJECT_FILE), "workers = 3\n").unwrap();
            let err = ResolvedConfig::resolve(dir.path(), &CliOverrides::default()).unwrap_err();
            assert!(matches!(err, ConfigError::Parse { .. }));
        }

        #[test]
        #[serial]
        fn zero_threads_rejected() {
            clear_env();
            let dir = TempDir::new().unwrap();
            let cli = CliOverrides {
                threads: Some(0),
                ..Default::default()
            };
            let err = ResolvedConfig::resolve(dir.path(), &cli).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { field: "threads", .. }));
        }
    }
}

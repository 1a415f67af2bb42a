//! TOML-based configuration for tabula.
//!
//! Supports a config file (tabula.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [validation]
//! check_cross_joins = true
//! max_nodes = 10000
//!
//! [aggregate]
//! distributed = true
//! allow_distinct_merge = false
//!
//! [cache]
//! block_dir = "${HOME}/.tabula/blocks"
//! block_rows = 1024
//! decode_cache_enabled = true
//!
//! [logging]
//! level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::aggregate::AggregateCapabilities;
use crate::graph::ValidationOptions;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub validation: ValidationSettings,
    pub aggregate: AggregateSettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

/// Graph validation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Report edits that would degrade a join to a cross join.
    pub check_cross_joins: bool,

    /// Maximum number of nodes in one graph.
    pub max_nodes: usize,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            check_cross_joins: true,
            max_nodes: 10_000,
        }
    }
}

/// Aggregate pushdown settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregateSettings {
    /// Master switch for partitioned evaluation.
    pub distributed: bool,

    /// Combine per-partition COUNT DISTINCT results by SUM. Only exact when
    /// partitions never share a value.
    pub allow_distinct_merge: bool,

    /// The data source can compute sums of squares.
    pub sum_squares: bool,

    /// The data source can compute sums of products.
    pub sum_product: bool,
}

impl Default for AggregateSettings {
    fn default() -> Self {
        Self {
            distributed: true,
            allow_distinct_merge: false,
            sum_squares: true,
            sum_product: true,
        }
    }
}

/// Embedded data cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Directory for out-of-line blocks (supports ${ENV_VAR} expansion).
    pub block_dir: Option<String>,

    /// Rows per encoded block.
    pub block_rows: usize,

    /// Share decoded payloads between node clones.
    pub decode_cache_enabled: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            block_dir: None,
            block_rows: 1024,
            decode_cache_enabled: true,
        }
    }
}

impl CacheSettings {
    /// The block directory with environment variables expanded, or
    /// `~/.tabula/blocks` when unset.
    pub fn resolved_block_dir(&self) -> Result<PathBuf, SettingsError> {
        match &self.block_dir {
            Some(dir) => Ok(PathBuf::from(expand_env_vars(dir)?)),
            None => dirs::home_dir()
                .map(|home| home.join(".tabula").join("blocks"))
                .ok_or_else(|| SettingsError::InvalidConfig("no home directory for block_dir".into())),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive, e.g. "info" or "tabula=debug".
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.check()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `TABULA_CONFIG`
    /// 2. `./tabula.toml`
    /// 3. `~/.config/tabula/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("TABULA_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("tabula.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tabula").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    fn check(&self) -> Result<(), SettingsError> {
        if self.cache.block_rows == 0 {
            return Err(SettingsError::InvalidConfig("cache.block_rows must be positive".into()));
        }
        if self.validation.max_nodes == 0 {
            return Err(SettingsError::InvalidConfig("validation.max_nodes must be positive".into()));
        }
        Ok(())
    }

    pub fn aggregate_capabilities(&self) -> AggregateCapabilities {
        AggregateCapabilities {
            distributed: self.aggregate.distributed,
            allow_distinct_merge: self.aggregate.allow_distinct_merge,
            sum_squares: self.aggregate.sum_squares,
            sum_product: self.aggregate.sum_product,
        }
    }

    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            check_cross_joins: self.validation.check_cross_joins,
            max_nodes: self.validation.max_nodes,
        }
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name: String = if chars.peek() == Some(&'{') {
            chars.next();
            let mut name = String::new();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                name.push(ch);
            }
            name
        } else {
            let mut name = String::new();
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                name.push(ch);
            }
            if name.is_empty() {
                // A lone $ is kept.
                result.push('$');
                continue;
            }
            name
        };

        let value = env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}

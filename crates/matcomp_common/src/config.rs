//! Configuration management for matcomp.
//!
//! Lookup order: explicit path, $MATCOMP_CONFIG, /etc/matcomp/config.toml,
//! the user config dir, then built-in defaults.

use crate::comparison::ComparisonOptions;
use crate::consistency::{ClusterPolicy, DEFAULT_DISPLAY_PRECISION};
use crate::history::HistoryStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// System-wide config file path
pub const CONFIG_PATH: &str = "/etc/matcomp/config.toml";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "MATCOMP_CONFIG";

/// Prediction backend connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the task-orchestration backend
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Comparison defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonConfig {
    /// Tolerance used when a request does not name one (percent)
    #[serde(default = "default_tolerance")]
    pub default_tolerance: f64,

    #[serde(default)]
    pub cluster_policy: ClusterPolicy,

    /// Decimal places for zero-tolerance equality
    #[serde(default = "default_display_precision")]
    pub display_precision: u32,
}

fn default_tolerance() -> f64 {
    5.0
}

fn default_display_precision() -> u32 {
    DEFAULT_DISPLAY_PRECISION
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            default_tolerance: default_tolerance(),
            cluster_policy: ClusterPolicy::default(),
            display_precision: default_display_precision(),
        }
    }
}

impl ComparisonConfig {
    pub fn options(&self) -> ComparisonOptions {
        ComparisonOptions {
            cluster_policy: self.cluster_policy,
            display_precision: self.display_precision,
        }
    }
}

/// Comparison history storage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// SQLite file; defaults to the user data dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

impl HistoryConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(HistoryStore::default_path)
    }
}

/// Daemon listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    // localhost only unless configured otherwise
    "127.0.0.1:7870".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter directive; RUST_LOG wins when set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Full configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub comparison: ComparisonConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config following the lookup order, or return defaults.
    ///
    /// An explicit path must exist and parse; the implicit locations fall
    /// through to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load_from_path(Path::new(&path));
        }

        let candidates = std::iter::once(PathBuf::from(CONFIG_PATH))
            .chain(Self::user_config_path());
        for path in candidates {
            if path.exists() {
                match Self::load_from_path(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => warn!("Ignoring unreadable config {}: {:#}", path.display(), e),
                }
            }
        }

        info!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// ~/.config/matcomp/config.toml
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("matcomp").join("config.toml"))
    }

    /// Load config from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the default config to path (for init)
    pub fn save_default(path: &Path) -> Result<()> {
        let content = Config::default().to_toml()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        info!("Saved default config to {}", path.display());
        Ok(())
    }
}

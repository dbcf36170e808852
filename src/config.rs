//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per tracked workspace
    #[serde(default = "default_base_dir")]
    pub base_dir: String,

    /// Location of the workspace being tracked by this process
    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// How often buffered events are committed (ms)
    #[serde(default = "default_commit_interval")]
    pub commit_interval_ms: u64,
}

fn default_base_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("usage-ledger").to_string_lossy().to_string())
        .unwrap_or_else(|| "./usage_data".to_string())
}

fn default_workspace() -> String {
    std::env::current_dir()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| ".".to_string())
}

fn default_commit_interval() -> u64 {
    5 * 60 * 1000 // 5 minutes
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            workspace: default_workspace(),
            commit_interval_ms: default_commit_interval(),
        }
    }
}

/// Expand a leading `~` to the user's home directory
fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}

impl StorageConfig {
    pub fn base_dir(&self) -> PathBuf {
        expand_home(&self.base_dir)
    }

    pub fn workspace(&self) -> PathBuf {
        expand_home(&self.workspace)
    }

    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit_interval_ms.max(1))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
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
            file: None,
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

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
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
            dirs::config_dir().map(|p| p.join("usage-ledger").join("config.toml")),
            Some(PathBuf::from("./usage-ledger.toml")),
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

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Storage overrides
        if let Some(base_dir) = var("USAGE_LEDGER_BASE_DIR") {
            self.storage.base_dir = base_dir;
        }
        if let Some(workspace) = var("USAGE_LEDGER_WORKSPACE") {
            self.storage.workspace = workspace;
        }
        if let Some(interval) = var("USAGE_LEDGER_COMMIT_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.storage.commit_interval_ms = ms;
            }
        }

        // Logging overrides
        if let Some(level) = var("USAGE_LEDGER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("USAGE_LEDGER_LOG_FORMAT") {
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
    r#"# Usage Ledger Configuration
#
# Environment variables override these settings:
# - USAGE_LEDGER_BASE_DIR
# - USAGE_LEDGER_WORKSPACE
# - USAGE_LEDGER_COMMIT_INTERVAL_MS
# - USAGE_LEDGER_LOG_LEVEL
# - USAGE_LEDGER_LOG_FORMAT

[storage]
# Directory holding one subdirectory per tracked workspace
base_dir = "~/.local/share/usage-ledger"

# Workspace tracked by this process
workspace = "."

# How often buffered events are committed (ms)
commit_interval_ms = 300000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/usage-ledger/usage-ledger.log"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_generated_config_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();
        assert_eq!(config.storage.base_dir, "~/.local/share/usage-ledger");
        assert_eq!(config.storage.commit_interval_ms, 300_000);
        assert_eq!(config.logging.format, "pretty");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_generated_base_dir_expands_home() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, generate_default_config()).unwrap();

        let config = Config::load(&path).unwrap();
        if let Some(home) = dirs::home_dir() {
            let base_dir = config.storage.base_dir();
            assert!(base_dir.is_absolute());
            assert_eq!(base_dir, home.join(".local/share/usage-ledger"));
        }
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/data/usage"), PathBuf::from("/data/usage"));
        assert_eq!(expand_home("./usage"), PathBuf::from("./usage"));
        assert_eq!(expand_home("~other/usage"), PathBuf::from("~other/usage"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~"), home);
            assert_eq!(expand_home("~/usage"), home.join("usage"));
        }
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = Config::parse("[storage]\nbase_dir = \"/data\"\n").unwrap();
        assert_eq!(config.storage.base_dir, "/data");
        assert_eq!(config.storage.commit_interval_ms, default_commit_interval());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage\nbase_dir = ").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(&missing), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("USAGE_LEDGER_BASE_DIR", "/override"),
            ("USAGE_LEDGER_COMMIT_INTERVAL_MS", "not a number"),
            ("USAGE_LEDGER_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.storage.base_dir, "/override");
        assert_eq!(config.storage.commit_interval_ms, default_commit_interval());
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_commit_interval_never_zero() {
        let config = StorageConfig {
            commit_interval_ms: 0,
            ..StorageConfig::default()
        };
        assert_eq!(config.commit_interval(), Duration::from_millis(1));
    }
}

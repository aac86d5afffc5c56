//! Configuration loading for the session pool service.
//!
//! Loads a YAML file into typed, section-scoped structs with sensible
//! defaults. A missing file, a missing section, or a missing key within a
//! section all fall back to the default rather than failing startup.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// HTTP server binding configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9200,
        }
    }
}

/// Pool sizing and timeout configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub size: usize,
    pub inactivity_timeout_s: u64,
    pub max_queue_depth: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 4,
            inactivity_timeout_s: 300,
            max_queue_depth: 10,
        }
    }
}

/// Browser driver configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub chrome_profile_dir: String,
    pub navigation_timeout_ms: u64,
    pub navigation_retries: u32,
    pub response_timeout_ms: u64,
    pub target_url: String,
    pub preferred_model: String,
    pub max_files_per_turn: usize,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            chrome_profile_dir: "~/.gemini-session-pool/user_data".to_string(),
            navigation_timeout_ms: 30_000,
            navigation_retries: 3,
            response_timeout_ms: 2_400_000,
            target_url: "https://gemini.google.com/gem/27117b3dc0da".to_string(),
            preferred_model: "Pro".to_string(),
            max_files_per_turn: 9,
        }
    }
}

impl BrowserConfig {
    /// The profile directory with a leading `~` expanded to the user's home.
    pub fn resolved_profile_dir(&self) -> PathBuf {
        expand_tilde(&self.chrome_profile_dir)
    }
}

/// Background monitor interval configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub check_interval_s: u64,
    pub inactivity_check_interval_s: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_s: 60,
            inactivity_check_interval_s: 30,
        }
    }
}

/// Logging destination and rotation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: String,
    pub level: String,
    pub error_level: String,
    pub max_file_size_mb: u64,
    pub backup_count: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: "~/.gemini-session-pool/logs".to_string(),
            level: "info".to_string(),
            error_level: "debug".to_string(),
            max_file_size_mb: 50,
            backup_count: 5,
        }
    }
}

impl LoggingConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        expand_tilde(&self.dir)
    }
}

/// Top-level configuration aggregating all sub-configs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub pool: PoolConfig,
    pub browser: BrowserConfig,
    pub health: HealthConfig,
    pub logging: LoggingConfig,
}

/// Name of the environment variable that names an alternate config path.
pub const CONFIG_PATH_ENV: &str = "POOL_CONFIG";

/// Default config file path when `POOL_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Load configuration from a YAML file, falling back to defaults for any
/// missing file, section, or key.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, LoadConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    let raw = std::fs::read_to_string(path).map_err(|e| LoadConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_yaml::from_str(&raw).map_err(|e| LoadConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Resolve the config path from `POOL_CONFIG`, or the default, and load it.
pub fn load_config_from_env() -> Result<AppConfig, LoadConfigError> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_config(path)
}

#[derive(Debug, thiserror::Error)]
pub enum LoadConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

fn expand_tilde(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = directories::UserDirs::new() {
            return home.home_dir().join(rest);
        }
    } else if raw == "~" {
        if let Some(home) = directories::UserDirs::new() {
            return home.home_dir().to_path_buf();
        }
    }
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.port, 9200);
        assert_eq!(cfg.pool.size, 4);
        assert_eq!(cfg.pool.inactivity_timeout_s, 300);
        assert_eq!(cfg.pool.max_queue_depth, 10);
        assert_eq!(cfg.browser.navigation_retries, 3);
        assert_eq!(cfg.browser.response_timeout_ms, 2_400_000);
        assert_eq!(cfg.browser.max_files_per_turn, 9);
        assert_eq!(cfg.health.check_interval_s, 60);
        assert_eq!(cfg.health.inactivity_check_interval_s, 30);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load_config("/nonexistent/path/config.yaml").unwrap();
        assert_eq!(cfg.pool.size, 4);
    }

    #[test]
    fn partial_section_fills_unknown_fields_from_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "pool:\n  size: 8\n").unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.pool.size, 8);
        assert_eq!(cfg.pool.inactivity_timeout_s, 300);
        assert_eq!(cfg.server.port, 9200);
    }

    #[test]
    fn expands_leading_tilde() {
        let resolved = expand_tilde("~/.gemini-session-pool/user_data");
        assert!(resolved.is_absolute() || resolved.starts_with("~"));
    }
}

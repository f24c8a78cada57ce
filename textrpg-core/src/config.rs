//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/textrpg/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/textrpg/` (~/.config/textrpg/)
//! - State/Logs: `$XDG_STATE_HOME/textrpg/` (~/.local/state/textrpg/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// `$var` if set, otherwise `$HOME/<fallback>`.
fn xdg_dir(var: &str, fallback: &str) -> PathBuf {
    if let Some(dir) = std::env::var_os(var).filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(fallback)
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Backend location and REST settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Stream transport and typing settings
    #[serde(default)]
    pub stream: StreamConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Base URL of the TextRPG backend (e.g., `http://localhost:8000`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for REST calls (health, session creation) in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl BackendConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            Error::Config(format!("backend.base_url {:?} is invalid: {}", self.base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "backend.base_url must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "backend.request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL without a trailing slash, ready for path concatenation.
    pub fn trimmed_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// Stream transport configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    /// How long a stream may stay in `connecting` before a timeout error
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Max automatic reconnect attempts after recoverable errors
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Base backoff interval; doubles on each attempt
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_ms: u64,

    /// Minimum interval between redraws while a reply is streaming
    #[serde(default = "default_chunk_delay")]
    pub chunk_delay_ms: u64,

    /// Inactivity window after the last chunk before the reply is force-finalized
    #[serde(default = "default_typing_timeout")]
    pub typing_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_interval_ms: default_reconnect_interval(),
            chunk_delay_ms: default_chunk_delay(),
            typing_timeout_ms: default_typing_timeout(),
        }
    }
}

impl StreamConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 {
            return Err(Error::Config(
                "stream.connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.typing_timeout_ms == 0 {
            return Err(Error::Config(
                "stream.typing_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms)
    }

    /// Backoff before reconnect attempt `attempt` (1-based): `interval * 2^(attempt-1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.reconnect_interval().saturating_mul(factor)
    }
}

fn default_connect_timeout() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_interval() -> u64 {
    2_000
}

fn default_chunk_delay() -> u64 {
    50
}

fn default_typing_timeout() -> u64 {
    5_000
}

/// `[logging]` section
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive for the log file; `RUST_LOG` wins when set
    pub level: String,

    /// Daily log files kept before the oldest is deleted
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            max_files: 5,
        }
    }
}

impl Config {
    /// Load `config.toml` from the XDG config dir; a missing file means defaults.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content, &path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Config::default())
            }
            Err(e) => Err(Error::Config(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Load an explicit config file, which must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid TOML in {}: {}", path.display(), e)))
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.backend.validate()?;
        self.stream.validate()
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/textrpg/config.toml` (~/.config/textrpg/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_dir("XDG_CONFIG_HOME", ".config").join("textrpg").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/textrpg/` (~/.local/state/textrpg/)
    pub fn state_dir() -> PathBuf {
        xdg_dir("XDG_STATE_HOME", ".local/state").join("textrpg")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend.base_url, "http://localhost:8000");
        assert_eq!(config.stream.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.stream.max_reconnect_attempts, 5);
        assert_eq!(config.stream.reconnect_interval(), Duration::from_secs(2));
        assert_eq!(config.stream.chunk_delay(), Duration::from_millis(50));
        assert_eq!(config.stream.typing_timeout(), Duration::from_secs(5));
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[backend]
base_url = "https://rpg.example.com/"

[stream]
connect_timeout_ms = 10000
max_reconnect_attempts = 2

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.backend.trimmed_base_url(), "https://rpg.example.com");
        assert_eq!(config.backend.request_timeout_secs, 30);
        assert_eq!(config.stream.connect_timeout_ms, 10_000);
        assert_eq!(config.stream.max_reconnect_attempts, 2);
        assert_eq!(config.stream.typing_timeout_ms, 5_000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_backend_validation() {
        let config = BackendConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BackendConfig {
            base_url: "ftp://rpg.example.com".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stream_validation() {
        let config = StreamConfig {
            connect_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_doubles() {
        let config = StreamConfig::default();
        assert_eq!(config.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(8));
        // Saturates instead of overflowing
        assert!(config.backoff_delay(64) >= config.backoff_delay(10));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[stream]\ntyping_timeout_ms = 750\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.stream.typing_timeout(), Duration::from_millis(750));
        assert_eq!(config.backend.base_url, "http://localhost:8000");

        std::fs::write(&path, "[stream\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_state_dir() {
        assert!(Config::state_dir().ends_with("textrpg"));
    }
}

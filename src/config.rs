//! Configuration module for the game server watcher.
//!
//! Process settings come from environment variables with sensible defaults; the
//! list of watched servers comes from a JSON file.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::history::DEFAULT_HISTORY_HOURS;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid server list in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// One watched game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Query protocol dialect, e.g. `csgo` or `tf2`.
    #[serde(rename = "type")]
    pub query_type: String,
    /// Steam app id, needed only for the Web API fallback.
    #[serde(rename = "appId", alias = "app_id", default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<u32>,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16, query_type: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            query_type: query_type.into(),
            app_id: None,
        }
    }

    pub fn with_app_id(mut self, app_id: u32) -> Self {
        self.app_id = Some(app_id);
        self
    }

    /// Identity used to key history, `host:port`.
    pub fn id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Process configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct WatcherConfig {
    /// Steam Web API key; `None` disables the directory fallback
    pub steam_api_key: Option<String>,
    /// Hours of population history to keep (default: 12)
    pub history_hours: u32,
    /// Directory holding the population document (default: "./data/")
    pub data_path: PathBuf,
    /// JSON file listing the watched servers (default: "./config/servers.json")
    pub servers_path: PathBuf,
    /// Time between refreshes of each server (default: 60s)
    pub refresh_interval: Duration,
    /// Time between writes of the population document (default: 300s)
    pub flush_interval: Duration,
    /// Timeout for one query or Web API call (default: 5s)
    pub query_timeout: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            steam_api_key: None,
            history_hours: DEFAULT_HISTORY_HOURS,
            data_path: PathBuf::from("./data/"),
            servers_path: PathBuf::from("./config/servers.json"),
            refresh_interval: Duration::from_secs(60),
            flush_interval: Duration::from_secs(300),
            query_timeout: Duration::from_millis(5000),
        }
    }
}

impl WatcherConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `STEAM_WEB_API_KEY`: Steam Web API key (default: unset)
    /// - `PLAYERS_HISTORY_HOURS`: history retention in hours (default: 12)
    /// - `DATA_PATH`: data directory (default: "./data/")
    /// - `SERVERS_PATH`: server list file (default: "./config/servers.json")
    /// - `REFRESH_INTERVAL_SECS`: refresh period (default: 60)
    /// - `FLUSH_INTERVAL_SECS`: persistence period (default: 300)
    /// - `QUERY_TIMEOUT_MS`: per-call timeout (default: 5000)
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source. Malformed numbers
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(key) = lookup("STEAM_WEB_API_KEY") {
            if !key.trim().is_empty() {
                cfg.steam_api_key = Some(key.trim().to_string());
            }
        }

        if let Some(hours) = lookup("PLAYERS_HISTORY_HOURS").and_then(|v| v.parse().ok()) {
            cfg.history_hours = hours;
        }

        if let Some(path) = lookup("DATA_PATH") {
            cfg.data_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("SERVERS_PATH") {
            cfg.servers_path = PathBuf::from(path);
        }

        if let Some(secs) = lookup("REFRESH_INTERVAL_SECS").and_then(|v| v.parse::<u64>().ok()) {
            if secs > 0 {
                cfg.refresh_interval = Duration::from_secs(secs);
            }
        }

        if let Some(secs) = lookup("FLUSH_INTERVAL_SECS").and_then(|v| v.parse::<u64>().ok()) {
            if secs > 0 {
                cfg.flush_interval = Duration::from_secs(secs);
            }
        }

        if let Some(ms) = lookup("QUERY_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
            if ms > 0 {
                cfg.query_timeout = Duration::from_millis(ms);
            }
        }

        cfg
    }

    /// Location of the population document.
    pub fn population_file(&self) -> PathBuf {
        self.data_path.join("servers.json")
    }
}

/// Read the watched server list.
pub fn load_servers<P: AsRef<Path>>(path: P) -> Result<Vec<ServerConfig>, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    fn from_map(vars: &[(&str, &str)]) -> WatcherConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WatcherConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let cfg = WatcherConfig::default();
        assert_eq!(cfg.steam_api_key, None);
        assert_eq!(cfg.history_hours, 12);
        assert_eq!(cfg.population_file(), PathBuf::from("./data/servers.json"));
        assert_eq!(cfg.refresh_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_from_lookup() {
        let cfg = from_map(&[
            ("STEAM_WEB_API_KEY", "abc123"),
            ("PLAYERS_HISTORY_HOURS", "24"),
            ("DATA_PATH", "/var/lib/gsw"),
            ("REFRESH_INTERVAL_SECS", "30"),
            ("QUERY_TIMEOUT_MS", "1500"),
        ]);
        assert_eq!(cfg.steam_api_key.as_deref(), Some("abc123"));
        assert_eq!(cfg.history_hours, 24);
        assert_eq!(cfg.population_file(), PathBuf::from("/var/lib/gsw/servers.json"));
        assert_eq!(cfg.refresh_interval, Duration::from_secs(30));
        assert_eq!(cfg.query_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_blank_key_and_bad_numbers_keep_defaults() {
        let cfg = from_map(&[
            ("STEAM_WEB_API_KEY", "  "),
            ("PLAYERS_HISTORY_HOURS", "twelve"),
            ("FLUSH_INTERVAL_SECS", "0"),
        ]);
        assert_eq!(cfg.steam_api_key, None);
        assert_eq!(cfg.history_hours, 12);
        assert_eq!(cfg.flush_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_load_servers() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"[
                {"host": "1.2.3.4", "port": 27015, "type": "csgo", "appId": 730},
                {"host": "tf.example.com", "port": 27016, "type": "tf2"}
            ]"#,
        )
        .unwrap();

        let servers = load_servers(file.path()).unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0], ServerConfig::new("1.2.3.4", 27015, "csgo").with_app_id(730));
        assert_eq!(servers[1].app_id, None);
        assert_eq!(servers[1].id(), "tf.example.com:27016");
    }

    #[test]
    fn test_load_servers_errors() {
        assert!(matches!(
            load_servers("/nonexistent/servers.json"),
            Err(ConfigError::Io { .. })
        ));

        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"[{"host": "x"}]"#).unwrap();
        assert!(matches!(load_servers(file.path()), Err(ConfigError::Json { .. })));
    }
}

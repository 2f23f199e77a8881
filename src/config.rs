use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::fs;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Upper bound on queries being decided or forwarded at once.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    #[serde(default = "default_mtu")]
    pub mtu: usize,

    /// 0 disables the periodic stats line.
    #[serde(default = "default_stats_interval")]
    pub stats_interval_seconds: u64,

    /// Block queries whose name cannot be parsed instead of forwarding them.
    #[serde(default)]
    pub fail_closed_on_parse_error: bool,

    /// How often `run` checks the store for edits made by other processes;
    /// 0 leaves reloads to SIGHUP.
    #[serde(default = "default_store_poll_ms")]
    pub store_poll_ms: u64,

    /// Fill an empty store with the built-in blocklists on `run`.
    #[serde(default = "default_true")]
    pub seed_default_blocklists: bool,

    #[serde(default = "default_download_timeout_seconds")]
    pub download_timeout_seconds: u64,

    #[serde(default)]
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_address")]
    pub address: SocketAddr,

    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,

    /// SO_MARK applied to forwarding sockets so routing skips the tunnel.
    #[serde(default)]
    pub fwmark: Option<u32>,

    /// Interface forwarding sockets are bound to, bypassing the tunnel.
    #[serde(default)]
    pub bind_interface: Option<String>,
}

fn default_database_path() -> String {
    "nxguard.db".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_in_flight() -> usize {
    256
}
fn default_mtu() -> usize {
    1500
}
fn default_stats_interval() -> u64 {
    60
}
fn default_store_poll_ms() -> u64 {
    2000
}
fn default_true() -> bool {
    true
}
fn default_download_timeout_seconds() -> u64 {
    30
}
fn default_upstream_address() -> SocketAddr {
    SocketAddr::from(([1, 1, 1, 1], 53))
}
fn default_upstream_timeout_ms() -> u64 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            log_level: default_log_level(),
            max_in_flight: default_max_in_flight(),
            mtu: default_mtu(),
            stats_interval_seconds: default_stats_interval(),
            fail_closed_on_parse_error: false,
            store_poll_ms: default_store_poll_ms(),
            seed_default_blocklists: true,
            download_timeout_seconds: default_download_timeout_seconds(),
            upstream: UpstreamConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: default_upstream_address(),
            timeout_ms: default_upstream_timeout_ms(),
            fwmark: None,
            bind_interface: None,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    pub fn store_poll_interval(&self) -> Option<Duration> {
        (self.store_poll_ms > 0).then(|| Duration::from_millis(self.store_poll_ms))
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_seconds)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config TOML")?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if fs::try_exists(path.as_ref()).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.database_path, "nxguard.db");
        assert_eq!(config.max_in_flight, 256);
        assert_eq!(config.mtu, 1500);
        assert!(!config.fail_closed_on_parse_error);
        assert!(config.seed_default_blocklists);
        assert_eq!(config.store_poll_interval(), Some(Duration::from_secs(2)));
        assert_eq!(config.download_timeout(), Duration::from_secs(30));
        assert_eq!(config.upstream.address, "1.1.1.1:53".parse().unwrap());
        assert_eq!(config.upstream.timeout(), Duration::from_secs(5));
        assert_eq!(config.upstream.fwmark, None);
    }

    #[test]
    fn partial_upstream_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            log_level = "debug"
            fail_closed_on_parse_error = true
            seed_default_blocklists = false
            store_poll_ms = 0

            [upstream]
            address = "9.9.9.9:53"
            fwmark = 51820
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert!(config.fail_closed_on_parse_error);
        assert!(!config.seed_default_blocklists);
        assert_eq!(config.store_poll_interval(), None);
        assert_eq!(config.upstream.address, "9.9.9.9:53".parse().unwrap());
        assert_eq!(config.upstream.fwmark, Some(51820));
        assert_eq!(config.upstream.timeout_ms, 5000);
    }

    #[test]
    fn rejects_bad_upstream_address() {
        assert!(toml::from_str::<Config>("[upstream]\naddress = \"nope\"").is_err());
    }

    #[tokio::test]
    async fn load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();

        let config = Config::load_or_default(dir.path().join("missing.toml")).await.unwrap();

        assert_eq!(config.stats_interval_seconds, 60);
    }

    #[tokio::test]
    async fn load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nxguard.toml");
        tokio::fs::write(&path, "mtu = \"big\"").await.unwrap();

        let err = Config::load(&path).await.unwrap_err();

        assert!(err.to_string().contains("parse config"));
    }
}

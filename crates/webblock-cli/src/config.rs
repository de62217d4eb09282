//! Client configuration at `~/.webblock/config.toml`.
//!
//! CLI flags always override config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use webblock_client::{DomainList, SyncConfig};
use webblock_core::defaults::{
    BYPASS_DURATION, DEFAULT_BLOCKED_DOMAINS, DEFAULT_PORT, KEEPALIVE_INTERVAL,
    RECONNECT_DELAY_BASE, RECONNECT_DELAY_MAX, STATUS_FETCH_TIMEOUT,
};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
}

/// `[client]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Bypass length in seconds.
    #[serde(default = "default_bypass_duration")]
    pub bypass_duration: u64,

    /// Seconds between keepalive pings.
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,

    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    #[serde(default = "default_status_timeout_ms")]
    pub status_timeout_ms: u64,

    #[serde(default = "default_blocked_domains")]
    pub blocked_domains: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bypass_duration: default_bypass_duration(),
            keepalive_interval: default_keepalive_interval(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            status_timeout_ms: default_status_timeout_ms(),
            blocked_domains: default_blocked_domains(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bypass_duration() -> u64 {
    BYPASS_DURATION.as_secs()
}

fn default_keepalive_interval() -> u64 {
    KEEPALIVE_INTERVAL.as_secs()
}

fn default_reconnect_base_ms() -> u64 {
    RECONNECT_DELAY_BASE.as_millis() as u64
}

fn default_reconnect_max_ms() -> u64 {
    RECONNECT_DELAY_MAX.as_millis() as u64
}

fn default_status_timeout_ms() -> u64 {
    STATUS_FETCH_TIMEOUT.as_millis() as u64
}

fn default_blocked_domains() -> Vec<String> {
    DEFAULT_BLOCKED_DOMAINS.iter().map(|d| d.to_string()).collect()
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        let c = &config.client;
        if c.keepalive_interval == 0 {
            anyhow::bail!("keepalive_interval must be at least 1 second");
        }
        if c.reconnect_base_ms == 0 || c.reconnect_max_ms == 0 {
            anyhow::bail!("reconnect_base_ms and reconnect_max_ms must be at least 1");
        }
        if c.reconnect_base_ms > c.reconnect_max_ms {
            anyhow::bail!("reconnect_base_ms must not exceed reconnect_max_ms");
        }
        Ok(config)
    }

    /// Connection settings, with `port` taking precedence over the file.
    pub fn sync_config(&self, port: Option<u16>) -> SyncConfig {
        let c = &self.client;
        SyncConfig {
            host: c.host.clone(),
            port: port.unwrap_or(c.port),
            keepalive_interval: Duration::from_secs(c.keepalive_interval),
            reconnect_base: Duration::from_millis(c.reconnect_base_ms),
            reconnect_max: Duration::from_millis(c.reconnect_max_ms),
            status_timeout: Duration::from_millis(c.status_timeout_ms),
            bypass_duration: Duration::from_secs(c.bypass_duration),
            ..SyncConfig::default()
        }
    }

    pub fn domain_list(&self) -> DomainList {
        DomainList::new(&self.client.blocked_domains)
    }
}

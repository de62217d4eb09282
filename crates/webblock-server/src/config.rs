//! Server configuration: TOML file + CLI overrides.

use crate::registry::RegistryConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use webblock_core::defaults::{
    DEBOUNCE_DELAY, DEFAULT_PORT, REAPER_INTERVAL, SESSION_TIMEOUT, USER_INPUT_TOOLS,
};
use webblock_core::{BlockerError, BlockerResult};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub sessions: SessionsSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// `[sessions]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionsSection {
    /// Seconds of inactivity before a session is evicted.
    #[serde(default = "default_session_timeout")]
    pub session_timeout: u64,
    /// Seconds between reaper sweeps.
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_watched_tools")]
    pub watched_tools: Vec<String>,
}

impl Default for SessionsSection {
    fn default() -> Self {
        Self {
            session_timeout: default_session_timeout(),
            reaper_interval: default_reaper_interval(),
            debounce_ms: default_debounce_ms(),
            watched_tools: default_watched_tools(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_session_timeout() -> u64 {
    SESSION_TIMEOUT.as_secs()
}
fn default_reaper_interval() -> u64 {
    REAPER_INTERVAL.as_secs()
}
fn default_debounce_ms() -> u64 {
    DEBOUNCE_DELAY.as_millis() as u64
}
fn default_watched_tools() -> Vec<String> {
    USER_INPUT_TOOLS.iter().map(|t| t.to_string()).collect()
}

impl ConfigFile {
    pub fn parse(content: &str) -> BlockerResult<Self> {
        toml::from_str(content).map_err(|e| BlockerError::Config(format!("parse error: {e}")))
    }
}

/// Values given on the command line; `None` leaves the file value in place.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub session_timeout: Option<u64>,
    pub reaper_interval: Option<u64>,
    pub debounce_ms: Option<u64>,
    pub watched_tools: Option<Vec<String>>,
}

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub session_timeout: Duration,
    pub reaper_interval: Duration,
    pub debounce: Duration,
    pub watched_tools: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            session_timeout: SESSION_TIMEOUT,
            reaper_interval: REAPER_INTERVAL,
            debounce: DEBOUNCE_DELAY,
            watched_tools: default_watched_tools(),
        }
    }
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(config_path: Option<&Path>, overrides: CliOverrides) -> BlockerResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    ConfigFile::parse(&content)?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };
        Self::resolve(file_config, overrides)
    }

    /// Merge CLI overrides over file values and validate.
    pub fn resolve(file: ConfigFile, cli: CliOverrides) -> BlockerResult<Self> {
        let reaper_interval = cli.reaper_interval.unwrap_or(file.sessions.reaper_interval);
        if reaper_interval == 0 {
            return Err(BlockerError::Config(
                "reaper_interval must be at least 1 second".into(),
            ));
        }

        let watched_tools: Vec<String> = cli
            .watched_tools
            .unwrap_or(file.sessions.watched_tools)
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        Ok(Self {
            host: cli.host.unwrap_or(file.server.host),
            port: cli.port.unwrap_or(file.server.port),
            session_timeout: Duration::from_secs(
                cli.session_timeout.unwrap_or(file.sessions.session_timeout),
            ),
            reaper_interval: Duration::from_secs(reaper_interval),
            debounce: Duration::from_millis(cli.debounce_ms.unwrap_or(file.sessions.debounce_ms)),
            watched_tools,
        })
    }

    pub fn bind_addr(&self) -> BlockerResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| BlockerError::Config(format!("invalid address: {e}")))
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            watched_tools: self.watched_tools.iter().cloned().collect(),
            session_timeout: self.session_timeout,
            reaper_interval: self.reaper_interval,
            debounce: self.debounce,
        }
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

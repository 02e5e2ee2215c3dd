//! Configuration for postage-gate.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listening port (0 for auto-select).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address to bind the listener on.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Base URL of the storage node API being protected.
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    /// Chain access configuration.
    #[serde(default)]
    pub chain: ChainConfig,

    /// Upload session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Chain access configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint used for registry reads.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Batch registry contract. When unset the batch payer check is skipped.
    #[serde(default)]
    pub registry_address: Option<String>,
}

/// Upload session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Absolute session lifetime in seconds.
    #[serde(default = "default_session_duration")]
    pub duration_secs: u64,

    /// Interval between expired-session sweeps in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            upstream_url: default_upstream_url(),
            chain: ChainConfig::default(),
            session: SessionConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            registry_address: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_session_duration(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

const fn default_port() -> u16 {
    3333
}

const fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_upstream_url() -> String {
    "http://localhost:1633".to_string()
}

fn default_rpc_url() -> String {
    "https://rpc.gnosischain.com".to_string()
}

const fn default_session_duration() -> u64 {
    15 * 60
}

const fn default_sweep_interval() -> u64 {
    5 * 60
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Location of the config file picked up when `--config` is not given.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "postage-gate")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

impl SessionConfig {
    /// Session lifetime as a [`Duration`].
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Sweep interval as a [`Duration`].
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl GatewayConfig {
    /// Socket address the listener binds to.
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a zero session duration or sweep interval,
    /// an unparseable upstream URL, or a malformed registry address.
    pub fn validate(&self) -> Result<()> {
        if self.session.duration_secs == 0 {
            return Err(Error::Config("session duration must be non-zero".to_string()));
        }
        if self.session.sweep_interval_secs == 0 {
            return Err(Error::Config("sweep interval must be non-zero".to_string()));
        }

        let upstream = reqwest::Url::parse(&self.upstream_url).map_err(|e| {
            Error::Config(format!("invalid upstream url '{}': {e}", self.upstream_url))
        })?;
        if !matches!(upstream.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "upstream url must be http(s), got '{}'",
                upstream.scheme()
            )));
        }

        if let Some(ref registry) = self.chain.registry_address {
            crate::chain::parse_address(registry)
                .map_err(|e| Error::Config(format!("invalid registry address: {e}")))?;
        }

        Ok(())
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

//! Command-line interface definition.

use clap::{Parser, ValueEnum};
use postage_gate::config::{default_config_path, GatewayConfig};
use std::net::IpAddr;
use std::path::PathBuf;

/// Upload authorization gateway for Swarm storage nodes.
#[derive(Parser, Debug)]
#[command(name = "postage-gate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Listening port.
    #[arg(long, short, env = "POSTAGE_GATE_PORT")]
    pub port: Option<u16>,

    /// Address to bind.
    #[arg(long, env = "POSTAGE_GATE_BIND")]
    pub bind: Option<IpAddr>,

    /// Storage node API to forward to.
    #[arg(long, short, env = "POSTAGE_GATE_UPSTREAM")]
    pub upstream: Option<String>,

    /// JSON-RPC endpoint for batch registry reads.
    #[arg(long, env = "POSTAGE_GATE_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Batch registry contract address. Without it only signatures are checked.
    #[arg(long, env = "POSTAGE_GATE_REGISTRY")]
    pub registry: Option<String>,

    /// Upload session lifetime in seconds.
    #[arg(long, env = "POSTAGE_GATE_SESSION_SECS")]
    pub session_secs: Option<u64>,

    /// Seconds between expired-session sweeps.
    #[arg(long, env = "POSTAGE_GATE_SWEEP_SECS")]
    pub sweep_secs: Option<u64>,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, value_enum, default_value = "text", env = "POSTAGE_GATE_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

/// Log format CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Convert CLI arguments into a GatewayConfig.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn into_config(self) -> color_eyre::Result<GatewayConfig> {
        // Explicit file, else the default location if it exists, else defaults
        let mut config = match self.config {
            Some(ref path) => GatewayConfig::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => GatewayConfig::from_file(&path)?,
                None => GatewayConfig::default(),
            },
        };

        // Override with CLI arguments
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        if let Some(upstream) = self.upstream {
            config.upstream_url = upstream;
        }
        if let Some(rpc_url) = self.rpc_url {
            config.chain.rpc_url = rpc_url;
        }
        if self.registry.is_some() {
            config.chain.registry_address = self.registry;
        }
        if let Some(secs) = self.session_secs {
            config.session.duration_secs = secs;
        }
        if let Some(secs) = self.sweep_secs {
            config.session.sweep_interval_secs = secs;
        }
        config.log_level = self.log_level;

        Ok(config)
    }
}

//! Configuration management for the Weaver node.

use anyhow::{Context, Result, bail};
use gossamer_common::constants::DEFAULT_CONFIG_PATH;
use gossamer_common::is_valid_hostname;
use serde::Deserialize;
use std::path::Path;

/// Node configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Hostname this node advertises to the mesh
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Port reserved for the web UI collaborator
    #[serde(default = "default_web_port")]
    pub web_port: u16,

    /// TCP port of the remote execution service
    #[serde(default = "default_communication_port")]
    pub communication_port: u16,

    /// UDP port of the heartbeat listener
    #[serde(default = "default_heartbeat_port")]
    pub heartbeat_port: u16,

    /// `host:port` heartbeat addresses used to bootstrap discovery
    #[serde(default)]
    pub bootstrap_addresses: Vec<String>,

    /// Clusters this node joins at startup
    #[serde(default)]
    pub clusters: Vec<String>,
}

// Default value functions
fn default_hostname() -> String { "localhost".to_string() }
fn default_web_port() -> u16 { 8080 }
fn default_communication_port() -> u16 { 7001 }
fn default_heartbeat_port() -> u16 { 7002 }

impl NodeConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            tracing::warn!("Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref hostname) = args.hostname {
            config.hostname = hostname.clone();
        }
        if let Some(port) = args.communication_port {
            config.communication_port = port;
        }
        if let Some(port) = args.heartbeat_port {
            config.heartbeat_port = port;
        }

        config.validate()?;

        Ok(config)
    }

    /// Reject an invalid node description before any socket is opened.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_hostname(&self.hostname) {
            bail!("Invalid hostname in config: {:?}", self.hostname);
        }

        for address in &self.bootstrap_addresses {
            let (host, port) = address
                .rsplit_once(':')
                .with_context(|| format!("Bootstrap address {address:?} is not host:port"))?;

            if !is_valid_hostname(host) {
                bail!("Bootstrap address {address:?} has an invalid hostname");
            }

            port.parse::<u16>()
                .with_context(|| format!("Bootstrap address {address:?} has an invalid port"))?;
        }

        for name in &self.clusters {
            if name.is_empty() {
                bail!("Cluster names must not be empty");
            }
        }

        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            web_port: default_web_port(),
            communication_port: default_communication_port(),
            heartbeat_port: default_heartbeat_port(),
            bootstrap_addresses: Vec::new(),
            clusters: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(NodeConfig::default().validate().is_ok());
    }

    #[test]
    fn invalid_hostname_is_fatal() {
        let config = NodeConfig {
            hostname: "bad host!".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bootstrap_addresses_must_be_host_port() {
        let mut config = NodeConfig {
            bootstrap_addresses: vec!["node-b:7002".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        config.bootstrap_addresses = vec!["node-b".to_string()];
        assert!(config.validate().is_err());

        config.bootstrap_addresses = vec!["node-b:99999".to_string()];
        assert!(config.validate().is_err());
    }

}

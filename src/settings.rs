//! Config-file and environment resolution.
//!
//! Connection parameters live in a TOML file with a `[source]` section (the
//! device collected from), a `[destination]` section (the device restored
//! to) and a `[settings]` section for shared knobs. SSH timing knobs also
//! accept environment overrides with parameter -> environment -> default
//! priority.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SSH_CONNECT_TIMEOUT` | 30s | SSH connection timeout in seconds |
//! | `SSH_MAX_RETRIES` | 3 | Maximum connect retry attempts |
//! | `SSH_RETRY_DELAY_MS` | 1000ms | Initial retry delay in milliseconds |

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::tunnel::TunnelConfig;

/// Default local forwarding port when collecting.
pub const DEFAULT_SOURCE_LOCAL_PORT: u16 = 9201;

/// Default local forwarding port when restoring.
pub const DEFAULT_DESTINATION_LOCAL_PORT: u16 = 9202;

pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 3;
pub(crate) const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

const CONNECT_TIMEOUT_ENV_VAR: &str = "SSH_CONNECT_TIMEOUT";
const MAX_RETRIES_ENV_VAR: &str = "SSH_MAX_RETRIES";
const RETRY_DELAY_MS_ENV_VAR: &str = "SSH_RETRY_DELAY_MS";

/// Top-level config file contents.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source: Option<DeviceSettings>,
    pub destination: Option<DeviceSettings>,
    pub settings: RunSettings,
}

/// One SSH endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSettings {
    /// Host, optionally as `host:port` (overrides `ssh_port`).
    pub ssh_host: String,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    pub ssh_username: String,
    #[serde(default)]
    pub ssh_password: Option<String>,
    #[serde(default)]
    pub ssh_key_path: Option<PathBuf>,
    #[serde(default)]
    pub local_port: Option<u16>,
}

fn default_ssh_port() -> u16 {
    22
}

/// Shared run settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Directory collected envelopes are written to and read back from.
    pub output_dir: PathBuf,
    /// HTTP timeout for collect/restore calls, in seconds.
    pub timeout_secs: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("json_files"),
            timeout_secs: 30,
        }
    }
}

impl RunSettings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Settings {
    /// Load from a TOML file. A missing file falls back to defaults (useful
    /// for the tunnel-less operations); a malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Tunnel configuration for the collect side.
    pub fn source_tunnel(&self) -> Result<TunnelConfig> {
        let device = self
            .source
            .as_ref()
            .context("config file has no [source] section")?;
        device.tunnel_config(DEFAULT_SOURCE_LOCAL_PORT)
    }

    /// Tunnel configuration for the restore side.
    pub fn destination_tunnel(&self) -> Result<TunnelConfig> {
        let device = self
            .destination
            .as_ref()
            .context("config file has no [destination] section")?;
        device.tunnel_config(DEFAULT_DESTINATION_LOCAL_PORT)
    }
}

impl DeviceSettings {
    fn tunnel_config(&self, default_local_port: u16) -> Result<TunnelConfig> {
        let (host, port) = parse_address(&self.ssh_host, self.ssh_port)?;

        let mut config = TunnelConfig::new(
            host,
            self.ssh_username.clone(),
            self.local_port.unwrap_or(default_local_port),
        );
        config.ssh_port = port;
        config.password = self.ssh_password.clone();
        config.key_path = self.ssh_key_path.clone();
        config.connect_timeout = Duration::from_secs(resolve_connect_timeout(None));
        config.max_retries = resolve_max_retries(None);
        config.retry_delay = Duration::from_millis(resolve_retry_delay_ms(None));
        Ok(config)
    }
}

/// Split `host` or `host:port`, defaulting to `default_port`.
///
/// Uses `rsplit_once` so an IPv6 literal like `[::1]:22` keeps its brackets.
pub(crate) fn parse_address(address: &str, default_port: u16) -> Result<(String, u16)> {
    match address.rsplit_once(':') {
        Some((host, port_str)) if !host.is_empty() => {
            if let Ok(port) = port_str.parse::<u16>() {
                Ok((host.to_string(), port))
            } else if address.matches(':').count() > 1 {
                // A bare IPv6 literal; the last segment is not a port.
                Ok((address.to_string(), default_port))
            } else {
                anyhow::bail!("invalid port in address '{address}'")
            }
        }
        _ => Ok((address.to_string(), default_port)),
    }
}

/// Resolve the SSH connect timeout: parameter -> env var -> default.
pub(crate) fn resolve_connect_timeout(param: Option<u64>) -> u64 {
    if let Some(timeout) = param {
        return timeout;
    }
    if let Ok(value) = env::var(CONNECT_TIMEOUT_ENV_VAR)
        && let Ok(timeout) = value.parse::<u64>()
    {
        return timeout;
    }
    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Resolve max connect retries: parameter -> env var -> default.
pub(crate) fn resolve_max_retries(param: Option<u32>) -> u32 {
    if let Some(retries) = param {
        return retries;
    }
    if let Ok(value) = env::var(MAX_RETRIES_ENV_VAR)
        && let Ok(retries) = value.parse::<u32>()
    {
        return retries;
    }
    DEFAULT_MAX_RETRIES
}

/// Resolve the initial retry delay: parameter -> env var -> default.
pub(crate) fn resolve_retry_delay_ms(param: Option<u64>) -> u64 {
    if let Some(delay) = param {
        return delay;
    }
    if let Ok(value) = env::var(RETRY_DELAY_MS_ENV_VAR)
        && let Ok(delay) = value.parse::<u64>()
    {
        return delay;
    }
    DEFAULT_RETRY_DELAY_MS
}

//! Configuration loading and validation

use anyhow::Result;
use oscbank_core::{DeviceSerial, DEFAULT_CHANNEL_COUNT, DEFAULT_MODEL_TAG};
use oscbank_hw::AttachConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} is not a valid socket address: {value:?}")]
    InvalidAddress { field: &'static str, value: String },
    #[error("channel count must be at least 1")]
    NoChannels,
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("device serial must be a positive number, got {0}")]
    InvalidSerial(i32),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub attach: AttachSettings,
    #[serde(default)]
    pub serve: ServeConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusConfig>,
}

/// Inbound OSC listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the OSC server listens on
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_server_bind(),
        }
    }
}

fn default_server_bind() -> String {
    "127.0.0.1:5000".to_string()
}

/// Outbound OSC target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Address input changes are reported to
    #[serde(default = "default_client_target")]
    pub target: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            target: default_client_target(),
        }
    }
}

fn default_client_target() -> String {
    "127.0.0.1:5001".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Serial to pin every channel to. Unset binds the first device of the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<i32>,
    /// Channels per bank
    #[serde(default = "default_channels")]
    pub channels: usize,
    /// Address scope used when no serial is set
    #[serde(default = "default_model_tag")]
    pub model_tag: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial: None,
            channels: default_channels(),
            model_tag: default_model_tag(),
        }
    }
}

fn default_channels() -> usize {
    DEFAULT_CHANNEL_COUNT
}

fn default_model_tag() -> String {
    DEFAULT_MODEL_TAG.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachSettings {
    /// Wait for each channel to attach
    #[serde(default = "default_attach_timeout")]
    pub timeout_ms: u64,
    /// Pause between channels
    #[serde(default = "default_settle")]
    pub settle_ms: u64,
    /// Pause after each bank
    #[serde(default = "default_bank_pause")]
    pub bank_pause_ms: u64,
}

impl Default for AttachSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_attach_timeout(),
            settle_ms: default_settle(),
            bank_pause_ms: default_bank_pause(),
        }
    }
}

fn default_attach_timeout() -> u64 {
    5000
}

fn default_settle() -> u64 {
    10
}

fn default_bank_pause() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeConfig {
    /// How often the serving loop checks the run state
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_poll_interval() -> u64 {
    1000
}

/// Read-only HTTP status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_status_bind")]
    pub bind: String,
}

fn default_status_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Config {
    pub fn device_serial(&self) -> Option<DeviceSerial> {
        self.device.serial.map(DeviceSerial)
    }

    pub fn server_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("server.bind", &self.server.bind)
    }

    pub fn client_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("client.target", &self.client.target)
    }

    pub fn status_addr(&self) -> Result<Option<SocketAddr>, ConfigError> {
        self.status
            .as_ref()
            .map(|s| parse_addr("status.bind", &s.bind))
            .transpose()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.serve.poll_interval_ms)
    }

    pub fn to_attach_config(&self) -> AttachConfig {
        AttachConfig {
            timeout: Duration::from_millis(self.attach.timeout_ms),
            settle: Duration::from_millis(self.attach.settle_ms),
            bank_pause: Duration::from_millis(self.attach.bank_pause_ms),
        }
    }

    /// Replace parts of the listen address
    pub fn override_server(
        &mut self,
        ip: Option<IpAddr>,
        port: Option<u16>,
    ) -> Result<(), ConfigError> {
        self.server.bind = override_addr(self.server_addr()?, ip, port);
        Ok(())
    }

    /// Replace parts of the target address
    pub fn override_client(
        &mut self,
        ip: Option<IpAddr>,
        port: Option<u16>,
    ) -> Result<(), ConfigError> {
        self.client.target = override_addr(self.client_addr()?, ip, port);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server_addr()?;
        self.client_addr()?;
        self.status_addr()?;
        if let Some(serial) = self.device.serial.filter(|s| *s <= 0) {
            return Err(ConfigError::InvalidSerial(serial));
        }
        if self.device.channels == 0 {
            return Err(ConfigError::NoChannels);
        }
        if self.attach.timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("attach.timeout_ms"));
        }
        if self.serve.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration("serve.poll_interval_ms"));
        }
        Ok(())
    }
}

fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

fn override_addr(mut addr: SocketAddr, ip: Option<IpAddr>, port: Option<u16>) -> String {
    if let Some(ip) = ip {
        addr.set_ip(ip);
    }
    if let Some(port) = port {
        addr.set_port(port);
    }
    addr.to_string()
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Write a configuration to file
pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

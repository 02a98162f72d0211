//! Unit configuration: TOML file, then command-line overrides.

use std::path::Path;

use anyhow::{bail, Context, Result};
use wda_bridge::BridgeConfig;

/// Values given on the command line; `None` keeps the configured value.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub serial: Option<String>,
    pub wda_host: Option<String>,
    pub wda_port: Option<u16>,
    pub connect_port: Option<u16>,
    pub log_command: Option<String>,
}

/// Load the bridge configuration from a TOML file.
///
/// Keys missing from the file fall back to the environment, then defaults.
pub fn from_file(path: &Path) -> Result<BridgeConfig> {
    let content =
        std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
    let config: BridgeConfig =
        toml::from_str(&content).context("Failed to parse unit config TOML")?;
    Ok(config)
}

/// Resolve the effective configuration.
pub fn resolve(path: Option<&Path>, overrides: CliOverrides) -> Result<BridgeConfig> {
    let mut config = match path {
        Some(path) => from_file(path)?,
        None => BridgeConfig::default(),
    };

    if let Some(serial) = overrides.serial {
        config.serial = serial;
    }
    if let Some(host) = overrides.wda_host {
        config.wda_host = host;
    }
    if let Some(port) = overrides.wda_port {
        config.wda_port = port;
    }
    if let Some(port) = overrides.connect_port {
        config.connect_port = port;
    }
    if let Some(command) = overrides.log_command {
        config.log_capture.command = command;
    }

    if config.serial.is_empty() {
        bail!("device serial is required (--serial, config file or WDA_DEVICE_SERIAL)");
    }
    Ok(config)
}

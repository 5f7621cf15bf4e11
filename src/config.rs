// src/config.rs
//! Coordinator configuration, loaded from YAML over built-in defaults

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{CoordinatorError, Result};
use crate::log_info;

pub const CHANNEL_MIN: u8 = 11;
pub const CHANNEL_MAX: u8 = 26;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub port: PortConfig,
    pub network: NetworkConfig,
    pub valve: ValveConfig,
    pub endpoints: EndpointConfig,
    pub transmit: TxOptions,
    pub timing: TimingConfig,
    pub simulation: SimulationConfig,
}

/// Command port: a serial device, or stdio when `path` is unset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    pub path: Option<String>,
    pub baud_rate: u32,
    pub max_line: usize,
    pub log_dir: Option<String>,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            path: None,
            baud_rate: 115200,
            max_line: 220,
            log_dir: None,
        }
    }
}

/// Radio parameters read at form-request time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub pan_id: u16,
    pub channel: u8,
    pub tx_power_dbm: i8,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            pan_id: 0xBEEF,
            channel: CHANNEL_MIN,
            tx_power_dbm: 8,
        }
    }
}

impl NetworkConfig {
    pub fn channel_valid(channel: u32) -> bool {
        (CHANNEL_MIN as u32..=CHANNEL_MAX as u32).contains(&channel)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathPolicy {
    #[default]
    Auto,
    Direct,
    Binding,
}

impl PathPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathPolicy::Auto => "auto",
            PathPolicy::Direct => "direct",
            PathPolicy::Binding => "binding",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "auto" => Some(PathPolicy::Auto),
            "direct" => Some(PathPolicy::Direct),
            "binding" => Some(PathPolicy::Binding),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValveConfig {
    pub default_endpoint: u8,
    pub close_above: u16,
    pub open_below: u16,
    pub path: PathPolicy,
}

impl Default for ValveConfig {
    fn default() -> Self {
        Self {
            default_endpoint: 1,
            close_above: 60,
            open_below: 5,
            path: PathPolicy::Auto,
        }
    }
}

/// Local endpoints on the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub telemetry: u8,
    pub control: u8,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self { telemetry: 1, control: 2 }
    }
}

/// Delivery options handed to every unicast send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxOptions {
    pub ack_request: bool,
    pub retry: bool,
}

impl Default for TxOptions {
    fn default() -> Self {
        Self { ack_request: true, retry: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub dedup_window_ms: u64,
    pub debounce_ms: u64,
    pub join_window_ms: u64,
    pub data_interval_ms: u64,
    pub data_force_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub tick_interval_ms: u64,
    pub long_press_ms: u64,
    pub join_button_debounce_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: 2_000,
            debounce_ms: 500,
            join_window_ms: 180_000,
            data_interval_ms: 5_000,
            data_force_interval_ms: 30_000,
            heartbeat_interval_ms: 30_000,
            tick_interval_ms: 20,
            long_press_ms: 1_500,
            join_button_debounce_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub telemetry_interval_ms: u64,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            telemetry_interval_ms: 2_000,
            seed: None,
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from a YAML file
    ///
    /// `COORD_PORT` overrides `port.path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&text)?;

        if let Ok(port) = std::env::var("COORD_PORT") {
            log_info!("Using COORD_PORT from environment: {}", port);
            config.port.path = Some(port);
        }

        config.validate()?;
        log_info!("Loaded coordinator config from {}", path.display());
        Ok(config)
    }

    /// Parse without validating; an empty document yields the defaults
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !NetworkConfig::channel_valid(self.network.channel as u32) {
            return Err(CoordinatorError::ConfigError(format!(
                "network.channel {} outside {}..={}",
                self.network.channel, CHANNEL_MIN, CHANNEL_MAX
            )));
        }

        if self.valve.open_below >= self.valve.close_above {
            return Err(CoordinatorError::ConfigError(format!(
                "valve.open_below ({}) must be < valve.close_above ({})",
                self.valve.open_below, self.valve.close_above
            )));
        }

        if self.port.max_line < 16 {
            return Err(CoordinatorError::ConfigError(format!(
                "port.max_line {} is too small",
                self.port.max_line
            )));
        }

        if self.timing.tick_interval_ms == 0 || self.timing.data_interval_ms == 0 {
            return Err(CoordinatorError::ConfigError(
                "timing intervals must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

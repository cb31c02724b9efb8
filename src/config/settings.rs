use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cli::Args;
use crate::utils::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Field bus
    pub serial: SerialConfig,

    // Which meters hang on the bus
    pub meters: MetersConfig,

    // Time-series sink
    pub influxdb: InfluxConfig,

    // Live publish socket
    pub publisher: PublisherConfig,

    // Cycle cadence
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub parity: ParityConfig,
    pub stop_bits: u8,
    pub timeout_ms: u64,
    pub retries: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 2400,
            parity: ParityConfig::None,
            stop_bits: 1,
            timeout_ms: 500,
            retries: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetersConfig {
    pub production: bool,
    pub storage: bool,
    /// Bus turnaround pause before addressing another device
    pub settle_delay_ms: u64,
}

impl Default for MetersConfig {
    fn default() -> Self {
        Self {
            production: false,
            storage: false,
            settle_delay_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    /// Empty host disables writing; data is computed and discarded
    pub host: String,
    pub port: u16,
    pub database: String,
    pub retry_wait_ms: u64,
    pub retry_deadline_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8086,
            database: "energymeters".to_string(),
            retry_wait_ms: 100,
            retry_deadline_ms: 2000,
            request_timeout_ms: 1500,
        }
    }
}

impl InfluxConfig {
    pub fn is_enabled(&self) -> bool {
        !self.host.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub enabled: bool,
    pub bind_address: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "0.0.0.0:5556".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub period_secs: u64,
    /// Quick cycles run between two full cycles
    pub quick_cycles: u32,
}

/// Upper bound for `schedule.quick_cycles`.
pub const MAX_QUICK_CYCLES: u32 = 59;

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            period_secs: 10,
            quick_cycles: 5,
        }
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then command line overrides.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => {
                info!("📄 Loading configuration from {}", path.display());
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        config.apply_args(args);
        config.validate()?;
        debug!("Effective configuration: {:?}", config);
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(serial) = &args.serial {
            self.serial.port = serial.clone();
        }
        if let Some(timeout) = args.timeout {
            self.serial.timeout_ms = (timeout * 1000.0).round().max(1.0) as u64;
        }
        if let Some(baud) = args.baud {
            self.serial.baud_rate = baud;
        }
        if args.production {
            self.meters.production = true;
        }
        if args.storage {
            self.meters.storage = true;
        }
        if let Some(host) = &args.influxdb {
            self.influxdb.host = host.clone();
        }
        if let Some(database) = &args.database {
            self.influxdb.database = database.clone();
        }
        if args.publish {
            self.publisher.enabled = true;
        }
        if let Some(bind) = &args.bind {
            self.publisher.bind_address = bind.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "serial.port",
                reason: "must not be empty".to_string(),
            });
        }
        if !matches!(self.serial.stop_bits, 1 | 2) {
            return Err(ConfigError::InvalidValue {
                field: "serial.stop_bits",
                reason: format!("{} is not 1 or 2", self.serial.stop_bits),
            });
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::InvalidValue {
                field: "serial.baud_rate",
                reason: "must be positive".to_string(),
            });
        }
        if self.schedule.period_secs == 0 || 60 % self.schedule.period_secs != 0 {
            return Err(ConfigError::InvalidValue {
                field: "schedule.period_secs",
                reason: format!("{} does not divide a minute", self.schedule.period_secs),
            });
        }
        if self.influxdb.is_enabled() && self.influxdb.database.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "influxdb.database",
                reason: "must not be empty while writing is enabled".to_string(),
            });
        }
        if self.schedule.quick_cycles > MAX_QUICK_CYCLES {
            return Err(ConfigError::InvalidValue {
                field: "schedule.quick_cycles",
                reason: format!("must be at most {}", MAX_QUICK_CYCLES),
            });
        }
        if self.publisher.enabled && self.publisher.bind_address.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "publisher.bind_address",
                reason: "must not be empty while publishing is enabled".to_string(),
            });
        }
        Ok(())
    }
}

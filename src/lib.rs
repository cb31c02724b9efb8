//! Eastron SDM energy meter collector
//!
//! Polls up to three SDM meters (mains, production, storage) sharing one
//! Modbus RTU line, derives power flow and self-consumption figures and
//! hands the results to an InfluxDB writer and an optional live publisher.

pub mod cli;
pub mod config;
pub mod devices;
pub mod modbus;
pub mod output;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use devices::{EnergyMeter, MeterReadings, MeterRole};
pub use modbus::{ModbusClient, ModbusClientTrait};
pub use output::{MessagePublisher, OutputRecord, TimeSeriesSink};
pub use services::{DataService, ServiceReport};
pub use utils::error::{ModbusError, ServiceError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

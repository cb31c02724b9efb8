use clap::Parser;
use std::path::PathBuf;

/// Command line of the collector. Every option overrides the matching
/// configuration file entry.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "sdm-collector",
    about = "Reads Eastron SDM energy meters over Modbus RTU and stores the results in InfluxDB"
)]
pub struct Args {
    /// Enable debug output
    #[arg(short = 'D', long)]
    pub debug: bool,

    /// InfluxDB database name
    #[arg(short = 'd', long, value_name = "NAME")]
    pub database: Option<String>,

    /// InfluxDB host, an empty string disables writing
    #[arg(short = 'i', long, value_name = "HOST")]
    pub influxdb: Option<String>,

    /// A production meter is present as device 2
    #[arg(short = 'p', long)]
    pub production: bool,

    /// A storage meter is present as device 3
    #[arg(short = 'S', long)]
    pub storage: bool,

    /// Serial port of the RS-485 adapter
    #[arg(short = 's', long, value_name = "PORT")]
    pub serial: Option<String>,

    /// Modbus response timeout in seconds
    #[arg(short = 't', long, value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// Serial baud rate
    #[arg(short = 'b', long, value_name = "BAUD")]
    pub baud: Option<u32>,

    /// Publish power data to live subscribers
    #[arg(short = 'z', long)]
    pub publish: bool,

    /// Listen address of the publish socket
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// TOML configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print version and exit
    #[arg(short = 'v', long)]
    pub version: bool,
}

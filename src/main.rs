use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use sdm_collector::cli::Args;
use sdm_collector::utils::init_logging;
use sdm_collector::{Config, DataService, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if args.version {
        println!("sdm-collector {}", VERSION);
        return Ok(());
    }

    init_logging(args.debug);
    info!("🚀 sdm-collector {} starting", VERSION);

    let config = Config::load(&args).context("invalid configuration")?;

    let service = DataService::new(config).map_err(|e| {
        error!("❌ Cannot open the Modbus connection: {}", e);
        e
    })?;

    let report = service.run().await?;
    info!(
        "Stopped after {} cycles, {} batches written, {} dropped",
        report.cycles, report.writer.delivered, report.writer.dropped
    );
    Ok(())
}

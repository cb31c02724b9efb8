use log::{info, warn};
use std::sync::Arc;
use tokio::sync::watch;

use super::aggregator::Aggregator;
use super::dispatch::{command_queue, Dispatcher, WorkerReport};
use super::publisher::run_publisher;
use super::scheduler::Scheduler;
use super::shutdown::{
    listen_for_signals, ShutdownCoordinator, ShutdownSignal, Signals, WorkerHandle,
};
use super::writer::run_writer;
use crate::config::Config;
use crate::modbus::{ModbusClient, ModbusClientTrait};
use crate::output::{DiscardSink, MessagePublisher, TimeSeriesSink};
use crate::utils::error::{ModbusError, ServiceError};
use crate::utils::RetryPolicy;

/// What the service did before it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceReport {
    pub cycles: u64,
    pub writer: WorkerReport,
    pub publisher: Option<WorkerReport>,
}

/// Wires the bus, the scheduler and the two workers together.
pub struct DataService {
    config: Config,
    bus: Arc<dyn ModbusClientTrait>,
    sink: Option<Arc<dyn TimeSeriesSink>>,
    publisher: Option<Arc<dyn MessagePublisher>>,
}

impl DataService {
    /// Opens the serial port. Failing here is fatal for the process.
    pub fn new(config: Config) -> Result<Self, ModbusError> {
        info!("🚀 Initializing data service");
        let bus = ModbusClient::new(&config.serial)?;
        Ok(Self::with_bus(config, Arc::new(bus)))
    }

    pub fn with_bus(config: Config, bus: Arc<dyn ModbusClientTrait>) -> Self {
        Self {
            config,
            bus,
            sink: None,
            publisher: None,
        }
    }

    /// Use this sink instead of the one derived from the configuration.
    pub fn with_sink(mut self, sink: Arc<dyn TimeSeriesSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Use this publisher; implies publishing is enabled.
    pub fn with_publisher(mut self, publisher: Arc<dyn MessagePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Runs until SIGINT or SIGTERM. Fails before the first cycle if the
    /// signal handlers cannot be installed.
    pub async fn run(self) -> Result<ServiceReport, ServiceError> {
        let signals = Signals::install()?;
        self.run_with_signals(signals).await
    }

    pub async fn run_with_signals<S>(self, signals: S) -> Result<ServiceReport, ServiceError>
    where
        S: ShutdownSignal + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let listener = tokio::spawn(listen_for_signals(signals, stop_tx));
        let result = self.run_until(stop_rx).await;
        listener.abort();
        result
    }

    /// Runs until `stop` turns true or its sender is dropped.
    pub async fn run_until(self, stop: watch::Receiver<bool>) -> Result<ServiceReport, ServiceError> {
        let sink = match self.sink {
            Some(sink) => sink,
            None => build_sink(&self.config)?,
        };
        let publisher = match self.publisher {
            Some(publisher) => Some(publisher),
            None if self.config.publisher.enabled => Some(bind_publisher(&self.config).await?),
            None => None,
        };

        let (writer_tx, writer_rx) = command_queue();
        let policy = RetryPolicy::from_config(
            self.config.influxdb.retry_wait_ms,
            self.config.influxdb.retry_deadline_ms,
        );
        let mut workers = vec![WorkerHandle::new(
            "writer",
            writer_tx.clone(),
            tokio::spawn(run_writer(writer_rx, sink, policy)),
        )];

        let publisher_tx = publisher.map(|publisher| {
            let (tx, rx) = command_queue();
            workers.push(WorkerHandle::new(
                "publisher",
                tx.clone(),
                tokio::spawn(run_publisher(rx, publisher)),
            ));
            tx
        });
        let publishing = publisher_tx.is_some();

        let aggregator = Aggregator::new(self.bus.clone(), &self.config.meters);
        let dispatcher = Dispatcher::new(writer_tx, publisher_tx);
        let scheduler = Scheduler::new(aggregator, dispatcher, &self.config.schedule, stop);
        let cycles = scheduler.run().await;

        let mut report = ServiceReport {
            cycles,
            ..ServiceReport::default()
        };
        for (name, worker_report) in ShutdownCoordinator::new(workers, self.bus).shutdown().await {
            match name {
                "writer" => report.writer = worker_report,
                _ => report.publisher = Some(worker_report),
            }
        }
        if publishing && report.publisher.is_none() {
            warn!("Publisher did not report back");
        }
        Ok(report)
    }
}

fn build_sink(config: &Config) -> Result<Arc<dyn TimeSeriesSink>, ServiceError> {
    if !config.influxdb.is_enabled() {
        warn!("⚠️  InfluxDB writing disabled, will discard data");
        return Ok(Arc::new(DiscardSink));
    }

    #[cfg(feature = "influxdb")]
    {
        let sender = crate::output::InfluxSender::new(&config.influxdb)?;
        Ok(Arc::new(sender))
    }

    #[cfg(not(feature = "influxdb"))]
    {
        warn!("Built without InfluxDB support, will discard data");
        Ok(Arc::new(DiscardSink))
    }
}

async fn bind_publisher(config: &Config) -> Result<Arc<dyn MessagePublisher>, ServiceError> {
    #[cfg(feature = "websocket")]
    {
        let socket = super::socket_server::WebSocketPublisher::bind(&config.publisher.bind_address).await?;
        Ok(Arc::new(socket))
    }

    #[cfg(not(feature = "websocket"))]
    {
        Err(crate::utils::error::PublishError::Bind {
            address: config.publisher.bind_address.clone(),
            reason: "built without websocket support".to_string(),
        }
        .into())
    }
}

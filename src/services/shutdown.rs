use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::dispatch::{QueueCommand, WorkerReport};
use crate::modbus::ModbusClientTrait;
use crate::utils::error::ServiceError;

/// A running worker task together with its queue.
pub struct WorkerHandle {
    name: &'static str,
    queue: UnboundedSender<QueueCommand>,
    task: JoinHandle<WorkerReport>,
}

impl WorkerHandle {
    pub fn new(
        name: &'static str,
        queue: UnboundedSender<QueueCommand>,
        task: JoinHandle<WorkerReport>,
    ) -> Self {
        Self { name, queue, task }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Send `Quit` and wait for the worker to finish its in-flight item.
    pub async fn stop(self) -> Result<WorkerReport, ServiceError> {
        if self.queue.send(QueueCommand::Quit).is_err() {
            warn!("{} queue already closed", self.name);
        }
        self.task.await.map_err(|e| ServiceError::Worker {
            worker: self.name,
            reason: e.to_string(),
        })
    }
}

/// Final part of the shutdown sequence, run once the scheduler has
/// stopped: workers are stopped in order, then the bus is released.
pub struct ShutdownCoordinator {
    workers: Vec<WorkerHandle>,
    bus: Arc<dyn ModbusClientTrait>,
}

impl ShutdownCoordinator {
    pub fn new(workers: Vec<WorkerHandle>, bus: Arc<dyn ModbusClientTrait>) -> Self {
        Self { workers, bus }
    }

    pub async fn shutdown(self) -> Vec<(&'static str, WorkerReport)> {
        info!("🛑 Shutting down everything");
        let mut reports = Vec::with_capacity(self.workers.len());
        for worker in self.workers {
            let name = worker.name();
            match worker.stop().await {
                Ok(report) => {
                    info!(
                        "{} joined: {} received, {} delivered, {} dropped",
                        name, report.received, report.delivered, report.dropped
                    );
                    reports.push((name, report));
                }
                Err(e) => error!("{}", e),
            }
        }
        self.bus.close();
        info!("✅ Shutdown completed");
        reports
    }
}

/// Source of process termination requests.
#[async_trait]
pub trait ShutdownSignal: Send {
    /// Name of the next signal, or `None` once the source cannot deliver any.
    async fn recv(&mut self) -> Option<&'static str>;
}

/// Raises the stop flag on the first signal. Later signals are logged and
/// otherwise ignored while the shutdown runs. The flag sender stays alive
/// for as long as this task runs, even if the source fails.
pub async fn listen_for_signals<S: ShutdownSignal>(mut signals: S, stop: watch::Sender<bool>) {
    match signals.recv().await {
        Some(name) => {
            info!("🛑 Received {}, stopping", name);
            if stop.send(true).is_err() {
                warn!("Scheduler already gone");
            }
        }
        None => {
            error!("❌ Signal source failed, the service can no longer be stopped by a signal");
            return park(stop).await;
        }
    }

    while let Some(name) = signals.recv().await {
        warn!("Received {} while shutting down, ignored", name);
    }
    park(stop).await
}

async fn park(stop: watch::Sender<bool>) {
    std::future::pending::<()>().await;
    drop(stop);
}

/// SIGINT and SIGTERM (Ctrl-C only on other platforms).
pub struct Signals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl Signals {
    /// Must run before the first cycle: a service that cannot be told to
    /// stop must not start.
    pub fn install() -> Result<Self, ServiceError> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .map_err(ServiceError::SignalSetup)?,
        })
    }
}

#[async_trait]
impl ShutdownSignal for Signals {
    #[cfg(unix)]
    async fn recv(&mut self) -> Option<&'static str> {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => Some("SIGINT"),
                Err(e) => {
                    error!("Failed to listen for SIGINT: {}", e);
                    None
                }
            },
            received = self.terminate.recv() => received.map(|_| "SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> Option<&'static str> {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some("Ctrl-C"),
            Err(e) => {
                error!("Failed to listen for Ctrl-C: {}", e);
                None
            }
        }
    }
}

use log::debug;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::output::OutputRecord;
use crate::utils::error::ServiceError;

/// Message understood by the worker tasks.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueCommand {
    Write(Vec<OutputRecord>),
    Publish(String),
    Quit,
}

/// Per-worker counters returned when a worker exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub received: u64,
    pub delivered: u64,
    pub dropped: u64,
}

pub fn command_queue() -> (UnboundedSender<QueueCommand>, UnboundedReceiver<QueueCommand>) {
    mpsc::unbounded_channel()
}

/// Producer side of the worker queues, held by the scheduler.
#[derive(Clone)]
pub struct Dispatcher {
    writer: UnboundedSender<QueueCommand>,
    publisher: Option<UnboundedSender<QueueCommand>>,
}

impl Dispatcher {
    pub fn new(
        writer: UnboundedSender<QueueCommand>,
        publisher: Option<UnboundedSender<QueueCommand>>,
    ) -> Self {
        Self { writer, publisher }
    }

    pub fn publishing(&self) -> bool {
        self.publisher.is_some()
    }

    pub fn write(&self, records: Vec<OutputRecord>) -> Result<(), ServiceError> {
        debug!("queueing {} records for the writer", records.len());
        self.writer
            .send(QueueCommand::Write(records))
            .map_err(|_| ServiceError::QueueClosed("writer"))
    }

    /// No-op when publishing is disabled.
    pub fn publish(&self, message: String) -> Result<(), ServiceError> {
        match &self.publisher {
            Some(queue) => queue
                .send(QueueCommand::Publish(message))
                .map_err(|_| ServiceError::QueueClosed("publisher")),
            None => Ok(()),
        }
    }
}

use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use super::dispatch::{QueueCommand, WorkerReport};
use crate::output::MessagePublisher;

/// Sends each message once. Failures are logged, never retried.
/// The channel is closed when the worker exits.
pub async fn run_publisher(
    mut queue: UnboundedReceiver<QueueCommand>,
    publisher: Arc<dyn MessagePublisher>,
) -> WorkerReport {
    info!("📡 Publisher started on {}", publisher.destination());
    let mut report = WorkerReport::default();

    while let Some(command) = queue.recv().await {
        match command {
            QueueCommand::Publish(message) => {
                report.received += 1;
                debug!("PUB: {}", message);
                match publisher.publish(&message).await {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        warn!("Publish on {} failed: {}", publisher.destination(), e);
                        report.dropped += 1;
                    }
                }
            }
            QueueCommand::Write(_) => warn!("Publisher queue got a write command, ignored"),
            QueueCommand::Quit => break,
        }
    }

    publisher.close().await;
    info!(
        "Publisher stopped: {} messages received, {} sent",
        report.received, report.delivered
    );
    report
}

use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use super::dispatch::{QueueCommand, WorkerReport};
use crate::output::TimeSeriesSink;
use crate::utils::error::SinkError;
use crate::utils::RetryPolicy;

/// Drains the writer queue until `Quit`. A batch that cannot be stored
/// within the retry policy is logged and dropped.
pub async fn run_writer(
    mut queue: UnboundedReceiver<QueueCommand>,
    sink: Arc<dyn TimeSeriesSink>,
    policy: RetryPolicy,
) -> WorkerReport {
    info!(
        "💾 Writer started: {} ({})",
        sink.destination(),
        sink.sender_type()
    );
    let mut report = WorkerReport::default();

    while let Some(command) = queue.recv().await {
        match command {
            QueueCommand::Write(batch) => {
                report.received += 1;
                info!("Writing {} records to {}", batch.len(), sink.destination());
                let sink_ref = sink.as_ref();
                let records = batch.as_slice();
                match policy
                    .run(move || sink_ref.write(records), SinkError::is_transient)
                    .await
                {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        error!("❌ Couldn't write data to {}, giving up on this batch: {}", sink.destination(), e);
                        report.dropped += 1;
                    }
                }
            }
            QueueCommand::Publish(_) => warn!("Writer queue got a publish command, ignored"),
            QueueCommand::Quit => {
                debug!("Writer received quit");
                break;
            }
        }
    }

    info!(
        "Writer stopped: {} batches received, {} written, {} dropped",
        report.received, report.delivered, report.dropped
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputRecord;
    use crate::services::dispatch::command_queue;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    /// Fails the first `failures` calls with the given status.
    struct FlakySink {
        failures: u32,
        status: u16,
        calls: AtomicU32,
    }

    impl FlakySink {
        fn new(failures: u32, status: u16) -> Arc<Self> {
            Arc::new(Self {
                failures,
                status,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl TimeSeriesSink for FlakySink {
        async fn write(&self, _records: &[OutputRecord]) -> Result<(), SinkError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                let body = "overloaded".to_string();
                if self.status >= 500 {
                    return Err(SinkError::Server { status: self.status, body });
                }
                return Err(SinkError::Rejected { status: self.status, body });
            }
            Ok(())
        }

        fn sender_type(&self) -> &str {
            "flaky"
        }

        fn destination(&self) -> &str {
            "test"
        }
    }

    fn batch() -> Vec<OutputRecord> {
        let mut record = OutputRecord::new("power_data", Utc::now());
        record.add_field("mains", 100.0);
        vec![record]
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let sink = FlakySink::new(2, 503);
        let (tx, rx) = command_queue();
        let started = Instant::now();
        let worker = tokio::spawn(run_writer(rx, sink.clone(), RetryPolicy::default()));

        tx.send(QueueCommand::Write(batch())).unwrap();
        tx.send(QueueCommand::Quit).unwrap();
        let report = worker.await.unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(report, WorkerReport { received: 1, delivered: 1, dropped: 0 });
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_store_drops_batch_within_deadline() {
        let sink = FlakySink::new(u32::MAX, 503);
        let (tx, rx) = command_queue();
        let started = Instant::now();
        let worker = tokio::spawn(run_writer(rx, sink.clone(), RetryPolicy::default()));

        tx.send(QueueCommand::Write(batch())).unwrap();
        tx.send(QueueCommand::Quit).unwrap();
        let report = worker.await.unwrap();

        assert_eq!(report, WorkerReport { received: 1, delivered: 0, dropped: 1 });
        // Quit is honoured right after the in-flight batch gives up
        assert!(started.elapsed() <= Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_batch_is_not_retried() {
        let sink = FlakySink::new(1, 400);
        let (tx, rx) = command_queue();
        let worker = tokio::spawn(run_writer(rx, sink.clone(), RetryPolicy::default()));

        tx.send(QueueCommand::Write(batch())).unwrap();
        tx.send(QueueCommand::Write(batch())).unwrap();
        tx.send(QueueCommand::Quit).unwrap();
        let report = worker.await.unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(report, WorkerReport { received: 2, delivered: 1, dropped: 1 });
    }

    /// Answers 503 only after a long stall.
    struct StallingSink {
        stall: Duration,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TimeSeriesSink for StallingSink {
        async fn write(&self, _records: &[OutputRecord]) -> Result<(), SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.stall).await;
            Err(SinkError::Server { status: 503, body: "busy".to_string() })
        }

        fn sender_type(&self) -> &str {
            "stalling"
        }

        fn destination(&self) -> &str {
            "test"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_server_errors_stay_within_deadline() {
        let sink = Arc::new(StallingSink {
            stall: Duration::from_millis(1400),
            calls: AtomicU32::new(0),
        });
        let (tx, rx) = command_queue();
        let started = Instant::now();
        let worker = tokio::spawn(run_writer(rx, sink.clone(), RetryPolicy::default()));

        tx.send(QueueCommand::Write(batch())).unwrap();
        tx.send(QueueCommand::Quit).unwrap();
        let report = worker.await.unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(report, WorkerReport { received: 1, delivered: 0, dropped: 1 });
        assert!(started.elapsed() <= Duration::from_millis(2100));
    }

    #[tokio::test]
    async fn test_closed_queue_stops_worker() {
        let (tx, rx) = command_queue();
        let worker = tokio::spawn(run_writer(rx, FlakySink::new(0, 503), RetryPolicy::default()));
        drop(tx);
        assert_eq!(worker.await.unwrap(), WorkerReport::default());
    }
}

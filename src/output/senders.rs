use async_trait::async_trait;
use log::{debug, info, warn};

use super::records::OutputRecord;
use crate::utils::error::{PublishError, SinkError};

/// Bulk writer for the time-series store.
#[async_trait]
pub trait TimeSeriesSink: Send + Sync {
    /// One write attempt for the whole batch. Retries belong to the caller.
    async fn write(&self, records: &[OutputRecord]) -> Result<(), SinkError>;
    fn sender_type(&self) -> &str;
    fn destination(&self) -> &str;
}

/// Fire-and-forget text channel for live subscribers.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, message: &str) -> Result<(), PublishError>;
    async fn close(&self);
    fn sender_type(&self) -> &str;
    fn destination(&self) -> &str;
}

/// Stand-in used when no database host is configured. Data is computed
/// and logged, then dropped.
pub struct DiscardSink;

#[async_trait]
impl TimeSeriesSink for DiscardSink {
    async fn write(&self, records: &[OutputRecord]) -> Result<(), SinkError> {
        debug!("Discarding {} records, database writing is disabled", records.len());
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "discard"
    }

    fn destination(&self) -> &str {
        "nowhere"
    }
}

#[cfg(feature = "influxdb")]
pub use influx::InfluxSender;

#[cfg(feature = "influxdb")]
mod influx {
    use super::*;
    use crate::config::InfluxConfig;
    use crate::output::records::batch_to_line_protocol;
    use std::time::Duration;

    /// InfluxDB 1.x `/write` endpoint, line protocol with second precision.
    /// Failed writes are classified by HTTP status.
    pub struct InfluxSender {
        client: reqwest::Client,
        url: reqwest::Url,
        endpoint: String,
    }

    impl InfluxSender {
        pub fn new(config: &InfluxConfig) -> Result<Self, SinkError> {
            let endpoint = format!("http://{}:{}/write", config.host, config.port);
            let url = reqwest::Url::parse_with_params(
                &endpoint,
                &[("db", config.database.as_str()), ("precision", "s")],
            )
            .map_err(|e| SinkError::Transport(format!("invalid endpoint {}: {}", endpoint, e)))?;

            let client = reqwest::Client::builder()
                .timeout(Duration::from_millis(config.request_timeout_ms))
                .build()
                .map_err(|e| SinkError::Transport(e.to_string()))?;

            info!("🌐 InfluxDB writer targets {} (database {})", endpoint, config.database);
            Ok(Self {
                client,
                url,
                endpoint,
            })
        }
    }

    /// 5xx is worth another attempt, anything else is final.
    fn status_error(status: reqwest::StatusCode, body: String) -> SinkError {
        if status.is_server_error() {
            SinkError::Server {
                status: status.as_u16(),
                body,
            }
        } else {
            SinkError::Rejected {
                status: status.as_u16(),
                body,
            }
        }
    }

    #[async_trait]
    impl TimeSeriesSink for InfluxSender {
        async fn write(&self, records: &[OutputRecord]) -> Result<(), SinkError> {
            let body = batch_to_line_protocol(records)?;
            if body.is_empty() {
                warn!("Nothing writable in a batch of {} records, skipping", records.len());
                return Ok(());
            }

            let response = self
                .client
                .post(self.url.clone())
                .body(body)
                .send()
                .await
                .map_err(|e| SinkError::Transport(e.to_string()))?;

            let status = response.status();
            if status.is_success() {
                debug!("Wrote {} records to {}", records.len(), self.endpoint);
                return Ok(());
            }

            let body = response.text().await.unwrap_or_default();
            Err(status_error(status, body))
        }

        fn sender_type(&self) -> &str {
            "influxdb"
        }

        fn destination(&self) -> &str {
            &self.endpoint
        }
    }

}

pub mod formatters;
pub mod records;
pub mod senders;

pub use formatters::{labelled_line, pretty_float, publish_message, quick_summary};
pub use records::OutputRecord;
#[cfg(feature = "influxdb")]
pub use records::batch_to_line_protocol;
#[cfg(feature = "influxdb")]
pub use senders::InfluxSender;
pub use senders::{DiscardSink, MessagePublisher, TimeSeriesSink};

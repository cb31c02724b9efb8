pub mod error;
pub mod logging;
pub mod retry;

pub use error::{ConfigError, ModbusError, PublishError, ServiceError, SinkError};
pub use logging::init_logging;
pub use retry::RetryPolicy;

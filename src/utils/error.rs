use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("CRC checksum mismatch")]
    CrcError,

    #[error("Invalid response from device: {0}")]
    InvalidResponse(String),

    #[error("Device {slave} answered with exception code 0x{code:02X}")]
    Exception { slave: u8, code: u8 },

    #[error("Lock acquisition failed")]
    LockError,

    #[error("Timeout occurred")]
    Timeout,
}

impl ModbusError {
    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModbusError::CommunicationError(_)
                | ModbusError::CrcError
                | ModbusError::InvalidResponse(_)
                | ModbusError::Timeout
        )
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            ModbusError::Timeout
        } else {
            ModbusError::CommunicationError(format!("IO error: {}", err))
        }
    }
}

impl From<serialport::Error> for ModbusError {
    fn from(err: serialport::Error) -> Self {
        ModbusError::ConnectionError(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("request rejected with {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("write did not finish before the retry deadline")]
    DeadlineExceeded(#[from] tokio::time::error::Elapsed),

    #[error("cannot encode batch: {0}")]
    Encoding(String),
}

impl SinkError {
    /// Only an overloaded or failing server is worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Server { .. })
    }
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to bind publish socket on {address}: {reason}")]
    Bind { address: String, reason: String },

    #[error("Publish socket is closed")]
    Closed,

    #[error("Failed to deliver message to {failed} of {total} subscribers")]
    Delivery { failed: usize, total: usize },
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0} queue is closed")]
    QueueClosed(&'static str),

    #[error("{worker} worker failed: {reason}")]
    Worker { worker: &'static str, reason: String },

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Cannot install signal handlers: {0}")]
    SignalSetup(std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read configuration file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

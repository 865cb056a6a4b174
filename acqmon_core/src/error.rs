use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("setup error: {0}")]
    Setup(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for device or worker")]
    Timeout,
    #[error("worker thread is gone")]
    Disconnected,
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing value source")]
    MissingDevice,
    #[error("missing buffered module")]
    MissingModule,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

impl From<BuildError> for MonitorError {
    fn from(e: BuildError) -> Self {
        MonitorError::Config(e.to_string())
    }
}

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;

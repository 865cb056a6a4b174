use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("device error: {0}")]
    Device(String),
    #[error("device read timeout")]
    Timeout,
    #[error("invalid channel {0}")]
    InvalidChannel(usize),
    #[error("module is not running")]
    NotRunning,
}

pub type Result<T> = std::result::Result<T, HwError>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("field-bus timeout")]
    Timeout,
    #[error("field-bus link is down")]
    Disconnected,
    #[error("modbus exception: {0}")]
    Exception(String),
    #[error("modbus transport: {0}")]
    Transport(String),
    #[error("short read: expected {expected} registers, got {got}")]
    ShortRead { expected: u16, got: usize },
    #[error("invalid link parameters: {0}")]
    InvalidParams(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;

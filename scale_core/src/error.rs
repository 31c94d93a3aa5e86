use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScaleError {
    #[error("field-bus error: {0}")]
    Link(String),
    #[error("field-bus not connected")]
    NotConnected,
    #[error("timeout waiting for the instrument")]
    Timeout,
    #[error("instrument rejected request: {0}")]
    Exception(String),
    #[error("malformed instrument data: {0}")]
    Decode(String),
    #[error("no indicator state read yet")]
    NoData,
    #[error("indicator state is stale ({age_ms} ms old)")]
    Stale { age_ms: u64 },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("component is shut down")]
    Shutdown,
}

impl ScaleError {
    /// Errors that mean the physical link should be considered dead.
    pub fn is_link_fault(&self) -> bool {
        matches!(self, Self::Link(_) | Self::Timeout)
    }
}

/// Operator-visible fault flags carried in the status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoWeight,
    Overshoot,
    NoFeed,
    NoServer,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NoWeight => "NO_WEIGHT",
            Self::Overshoot => "OVERSHOOT",
            Self::NoFeed => "NO_FEED",
            Self::NoServer => "NO_SERVER",
        })
    }
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

use thiserror::Error;

/// Fatal error classes for a sweep run. Per-entry conditions (stale values,
/// rejected writes, non-integer cells) are counted and logged by the engine
/// instead of surfacing here.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SweepError>;

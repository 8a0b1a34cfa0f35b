//! Error types for the threshold path.

use thiserror::Error;

/// Errors that can occur while sealing or opening threshold-encrypted objects.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("invalid threshold {threshold} of {shares}")]
    InvalidThreshold { threshold: u8, shares: u8 },

    #[error("invalid shares: {0}")]
    InvalidShares(String),

    /// The seal session key outlived its TTL. The client must create a new one.
    #[error("seal session key expired")]
    SessionKeyExpired,

    #[error("invalid session key: {0}")]
    InvalidSessionKey(String),

    /// The policy object does not attest the subscriber.
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// The approval proof references an outdated object version.
    #[error("stale object reference: {0}")]
    StaleObjectRef(String),

    #[error("unknown key server: {0}")]
    UnknownServer(String),

    #[error("key server unavailable: {0}")]
    ServerUnavailable(String),

    #[error("key server request timed out")]
    Timeout,

    /// Fewer than `need` key servers answered.
    #[error("threshold not reached: {got} of {need} shares")]
    ThresholdUnavailable { got: usize, need: usize },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error(transparent)]
    Crypto(#[from] segvault_core::CoreError),
}

impl SealError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SealError::ServerUnavailable(_)
                | SealError::Timeout
                | SealError::ThresholdUnavailable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SealError>;

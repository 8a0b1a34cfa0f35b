//! Error types for playback sessions.

use thiserror::Error;

use segvault_core::SessionId;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Unknown id, or a session already discarded.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// The session outlived its TTL or idle timeout. The client must renegotiate.
    #[error("session expired: {0}")]
    Expired(SessionId),

    /// The session was negotiated for a different video.
    #[error("session {0} is not bound to this video")]
    VideoMismatch(SessionId),

    #[error("too many live sessions (limit {0})")]
    CapacityExceeded(usize),

    #[error(transparent)]
    Core(#[from] segvault_core::CoreError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

//! # Segvault Session
//!
//! Per-playback-session key exchange. Each session gets a fresh server
//! X25519 key and nonce; client and server independently derive the same
//! session KEK, which wraps segment DEKs for transport.
//!
//! The server secret lives only in [`SessionStore`] memory and is gone once
//! the session expires, is ended, or the process restarts.

pub mod error;
pub mod exchange;
pub mod store;

pub use error::{Result, SessionError};
pub use exchange::{
    derive_session_kek, wrap_aad, ClientHandshake, ServerHello, SessionNonce, SESSION_KEK_LABEL,
};
pub use store::{PlaybackSession, SessionConfig, SessionStore};

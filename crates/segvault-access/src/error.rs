//! Error types for the access gate.

use std::fmt;

use thiserror::Error;

/// Why an identity failed verification. Logged, never shown to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingSignature,
    MissingPublicKey,
    MalformedPublicKey,
    /// The public key does not control the claimed address.
    AddressMismatch,
    /// The signed message is not bound to this session.
    MessageMismatch,
    BadSignature,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthFailure::MissingSignature => "missing signature",
            AuthFailure::MissingPublicKey => "missing public key",
            AuthFailure::MalformedPublicKey => "malformed public key",
            AuthFailure::AddressMismatch => "public key does not match address",
            AuthFailure::MessageMismatch => "message not bound to session",
            AuthFailure::BadSignature => "signature verification failed",
        })
    }
}

/// A hard denial for a verified identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// No payment or subscription record for this video.
    PaymentRequired,
    /// A record exists but does not list the requested segment.
    SegmentNotCovered,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Denial::PaymentRequired => "payment required",
            Denial::SegmentNotCovered => "segment not covered",
        })
    }
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("authentication failed: {0}")]
    Unauthenticated(AuthFailure),

    #[error("access denied: {0}")]
    Denied(Denial),

    /// The payment ledger could not be consulted.
    #[error("ledger unavailable: {0}")]
    Ledger(String),
}

impl From<segvault_store::StoreError> for AccessError {
    fn from(e: segvault_store::StoreError) -> Self {
        AccessError::Ledger(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AccessError>;

//! Error types for segvault core.

use thiserror::Error;

/// Core errors raised by identifiers, primitives, derivation and the envelope store.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("invalid segment index: {0} (must be >= -1)")]
    InvalidSegmentIndex(i64),

    /// Init segments are served in plaintext and never have a DEK.
    #[error("init segment has no data encryption key")]
    InitSegmentHasNoKey,

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// AEAD tag mismatch or malformed ciphertext.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// The envelope could not be opened with the configured master key.
    ///
    /// Treated as data corruption for the owning video.
    #[error("envelope corrupt: {0}")]
    EnvelopeCorrupt(String),

    #[error("key management service error: {0}")]
    Kms(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("address does not match public key")]
    AddressMismatch,

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl CoreError {
    /// Whether this error indicates corrupted or tampered key material.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            CoreError::DecryptionFailed(_)
                | CoreError::EnvelopeCorrupt(_)
                | CoreError::InvalidKeyLength { .. }
        )
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

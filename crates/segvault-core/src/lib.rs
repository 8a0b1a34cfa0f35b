//! # Segvault Core
//!
//! Pure primitives for segvault: identifiers, segment AEAD, key wrap,
//! wallet signatures, DEK derivation and envelope protection of root secrets.
//!
//! ## Key hierarchy
//!
//! ```text
//! master key (KMS) ──seals──▶ root secret (per video)
//!                                   │ HKDF(video, rendition, index)
//!                                   ▼
//!                              segment DEK ──AES-128-GCM──▶ segment ciphertext
//!                                   │ wrapped under
//!                                   ▼
//!                              session KEK (per playback session)
//! ```
//!
//! The only I/O seam here is [`MasterKeyProvider`]; everything else is
//! pure computation.

pub mod agreement;
pub mod crypto;
pub mod derive;
pub mod envelope;
pub mod error;
pub mod types;
pub mod wallet;

pub use agreement::{SharedKey, X25519PublicKey, X25519Secret};
pub use crypto::{random_array, Dek, EncryptionNonce, Kek, RootSecret, SegmentIv, WrappedKey};
pub use derive::{derive_segment_dek, DEK_INFO_LABEL};
pub use envelope::{Envelope, EnvelopeFormat, EnvelopeStore, LocalMasterKey, MasterKeyProvider};
pub use error::{CoreError, Result};
pub use types::{
    BlobId, ChainId, ChannelId, EncryptionMode, ObjectId, ObjectRef, RenditionName, Scheme,
    SegmentCoord, SegmentIndex, SessionId, VideoId, WalletAddress,
};
pub use wallet::{Ed25519PublicKey, Ed25519Signature, Keypair};

/// Current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

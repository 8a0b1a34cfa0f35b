//! X25519 key agreement.
//!
//! Used by the playback session exchange and by the threshold path, where
//! key shares are encrypted to key servers and re-encrypted to clients.

use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{random_array, Kek};
use crate::error::{CoreError, Result};

/// An X25519 public key (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct X25519PublicKey(pub [u8; 32]);

impl X25519PublicKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CoreError::InvalidPublicKey)?;
        Ok(Self(arr))
    }

    fn to_dalek(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

impl fmt::Debug for X25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X25519Pub({})", &hex::encode(self.0)[..16])
    }
}

/// An X25519 secret key.
///
/// Reusable for several agreements; callers that need single-use semantics
/// drop it after one exchange.
#[derive(Clone)]
pub struct X25519Secret(StaticSecret);

impl X25519Secret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        Self(StaticSecret::from(random_array::<32>()))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(PublicKey::from(&self.0))
    }

    /// Perform key agreement with a peer's public key.
    ///
    /// Rejects low-order peer keys, which would yield an all-zero secret.
    pub fn diffie_hellman(&self, peer: &X25519PublicKey) -> Result<SharedKey> {
        let shared = self.0.diffie_hellman(&peer.to_dalek());
        if !shared.was_contributory() {
            return Err(CoreError::InvalidPublicKey);
        }
        Ok(SharedKey(*shared.as_bytes()))
    }
}

impl fmt::Debug for X25519Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X25519Secret({:?})", self.public_key())
    }
}

/// A shared secret from X25519 key agreement.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive a 256-bit key with HKDF-SHA256.
    pub fn derive_kek(&self, salt: &[u8], info: &[u8]) -> Result<Kek> {
        let hk = Hkdf::<Sha256>::new(Some(salt), &self.0);
        let mut okm = [0u8; Kek::LEN];
        hk.expand(info, &mut okm)
            .map_err(|e| CoreError::EncryptionFailed(format!("hkdf expand: {e}")))?;
        Ok(Kek::from_bytes(okm))
    }
}

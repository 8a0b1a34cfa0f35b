//! Symmetric primitives: segment AEAD, key wrap, random key material.
//!
//! Segments use AES-128-GCM under a 128-bit DEK with a 96-bit IV.
//! Key-encrypting keys are 256-bit and wrap with ChaCha20-Poly1305.

use aes_gcm::Aes128Gcm;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CoreError, Result};

/// Fill a fixed-size array from the thread-local CSPRNG.
pub fn random_array<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// A video's 256-bit root secret. Never persisted in plaintext.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RootSecret([u8; 32]);

impl RootSecret {
    pub const LEN: usize = 32;

    /// Generate a new random root secret.
    pub fn generate() -> Self {
        Self(random_array())
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CoreError::InvalidKeyLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for RootSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RootSecret(..)")
    }
}

/// A 96-bit segment IV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentIv(pub [u8; 12]);

impl SegmentIv {
    pub const LEN: usize = 12;

    /// Generate a fresh random IV.
    pub fn generate() -> Self {
        Self(random_array())
    }

    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 12] = bytes.try_into().map_err(|_| CoreError::InvalidKeyLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

/// A 128-bit segment data-encryption key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Dek([u8; 16]);

impl Dek {
    pub const LEN: usize = 16;

    /// Generate a random DEK (legacy stored-key flow only).
    pub fn generate() -> Self {
        Self(random_array())
    }

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 16] = bytes.try_into().map_err(|_| CoreError::InvalidKeyLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Encrypt a segment. The GCM tag is appended to the ciphertext.
    pub fn encrypt_segment(&self, plaintext: &[u8], iv: &SegmentIv) -> Result<Vec<u8>> {
        let cipher = Aes128Gcm::new_from_slice(&self.0)
            .map_err(|e| CoreError::EncryptionFailed(e.to_string()))?;
        cipher
            .encrypt(aes_gcm::Nonce::from_slice(&iv.0), plaintext)
            .map_err(|e| CoreError::EncryptionFailed(e.to_string()))
    }

    /// Decrypt a segment, verifying the GCM tag.
    pub fn decrypt_segment(&self, ciphertext: &[u8], iv: &SegmentIv) -> Result<Vec<u8>> {
        let cipher = Aes128Gcm::new_from_slice(&self.0)
            .map_err(|e| CoreError::DecryptionFailed(e.to_string()))?;
        cipher
            .decrypt(aes_gcm::Nonce::from_slice(&iv.0), ciphertext)
            .map_err(|_| CoreError::DecryptionFailed("segment authentication failed".into()))
    }
}

impl fmt::Debug for Dek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Dek(..)")
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionNonce(pub [u8; 12]);

impl EncryptionNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        Self(random_array())
    }

    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

/// A 256-bit key-encrypting key (session KEK, master key, share-wrap key).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Kek([u8; 32]);

impl Kek {
    pub const LEN: usize = 32;

    pub fn generate() -> Self {
        Self(random_array())
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encrypt with associated data under an explicit nonce.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        aad: &[u8],
        nonce: &EncryptionNonce,
    ) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| CoreError::EncryptionFailed(e.to_string()))?;
        cipher
            .encrypt(
                Nonce::from_slice(&nonce.0),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|e| CoreError::EncryptionFailed(e.to_string()))
    }

    /// Decrypt with associated data.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        aad: &[u8],
        nonce: &EncryptionNonce,
    ) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| CoreError::DecryptionFailed(e.to_string()))?;
        cipher
            .decrypt(
                Nonce::from_slice(&nonce.0),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| CoreError::DecryptionFailed("authentication tag mismatch".into()))
    }

    /// Wrap a DEK. The output is `nonce || ciphertext+tag`.
    pub fn wrap_dek(&self, dek: &Dek, aad: &[u8]) -> Result<WrappedKey> {
        let nonce = EncryptionNonce::generate();
        let ciphertext = self.encrypt(dek.as_bytes(), aad, &nonce)?;
        let mut out = Vec::with_capacity(12 + ciphertext.len());
        out.extend_from_slice(&nonce.0);
        out.extend_from_slice(&ciphertext);
        Ok(WrappedKey(out))
    }

    /// Unwrap a DEK produced by [`Kek::wrap_dek`] with the same AAD.
    pub fn unwrap_dek(&self, wrapped: &WrappedKey, aad: &[u8]) -> Result<Dek> {
        let bytes = wrapped.as_bytes();
        if bytes.len() < 12 + 16 {
            return Err(CoreError::DecryptionFailed(format!(
                "wrapped key too short: {} bytes",
                bytes.len()
            )));
        }
        let (nonce, ciphertext) = bytes.split_at(12);
        let nonce = EncryptionNonce::from_bytes(nonce.try_into().map_err(|_| {
            CoreError::DecryptionFailed("malformed wrapped key nonce".into())
        })?);
        let plaintext = self.decrypt(ciphertext, aad, &nonce)?;
        Dek::from_slice(&plaintext)
    }
}

impl fmt::Debug for Kek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Kek(..)")
    }
}

/// A DEK wrapped under a session KEK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey(Vec<u8>);

impl WrappedKey {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

//! Envelope protection of root secrets.
//!
//! A video's root secret is sealed under a long-lived master key held by a
//! key-management service. Callers only ever see the envelope bytes; the
//! master key never leaves the [`MasterKeyProvider`].
//!
//! Legacy records that stored a per-segment DEK use the same envelope with
//! a different purpose label, so one kind cannot be opened as the other.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::{Dek, EncryptionNonce, Kek, RootSecret};
use crate::error::{CoreError, Result};

/// Format identifier for envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EnvelopeFormat {
    /// ChaCha20-Poly1305 under a 256-bit master key.
    ChaCha20Poly1305 = 1,
}

/// What an envelope protects. Bound into the AEAD associated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopePurpose {
    RootSecret,
    LegacySegmentDek,
}

impl EnvelopePurpose {
    fn label(&self) -> &'static [u8] {
        match self {
            EnvelopePurpose::RootSecret => b"segvault/envelope/root-secret/v1",
            EnvelopePurpose::LegacySegmentDek => b"segvault/envelope/segment-dek/v1",
        }
    }
}

/// Serialized form of a sealed secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub format: EnvelopeFormat,
    /// Master key that sealed this envelope.
    pub key_id: String,
    pub nonce: EncryptionNonce,
    /// Ciphertext including the authentication tag.
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| CoreError::Encoding(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::EnvelopeCorrupt(e.to_string()))
    }
}

/// A key-management service holding the master key.
///
/// Implementations may call out to a remote KMS; both operations are
/// suspension points.
#[async_trait]
pub trait MasterKeyProvider: Send + Sync {
    /// Identifier of the master key currently used for sealing.
    fn key_id(&self) -> &str;

    /// Seal plaintext, binding `context` as associated data.
    async fn seal(&self, plaintext: &[u8], context: &[u8]) -> Result<Envelope>;

    /// Open an envelope sealed with the same `context`.
    async fn open(&self, envelope: &Envelope, context: &[u8]) -> Result<Vec<u8>>;
}

#[async_trait]
impl<P: MasterKeyProvider + ?Sized> MasterKeyProvider for Arc<P> {
    fn key_id(&self) -> &str {
        (**self).key_id()
    }

    async fn seal(&self, plaintext: &[u8], context: &[u8]) -> Result<Envelope> {
        (**self).seal(plaintext, context).await
    }

    async fn open(&self, envelope: &Envelope, context: &[u8]) -> Result<Vec<u8>> {
        (**self).open(envelope, context).await
    }
}

/// An in-process master key.
///
/// Suitable for tests and single-node deployments where the key is injected
/// from configuration.
pub struct LocalMasterKey {
    key_id: String,
    key: Kek,
}

impl LocalMasterKey {
    pub fn new(key_id: impl Into<String>, key: [u8; 32]) -> Self {
        Self {
            key_id: key_id.into(),
            key: Kek::from_bytes(key),
        }
    }

    /// Generate a random master key.
    pub fn generate(key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            key: Kek::generate(),
        }
    }

    /// Parse a hex-encoded 32-byte master key.
    pub fn from_hex(key_id: impl Into<String>, hex_key: &str) -> Result<Self> {
        let bytes = hex::decode(hex_key.trim()).map_err(|e| CoreError::Kms(e.to_string()))?;
        let key: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| CoreError::InvalidKeyLength {
            expected: 32,
            actual: b.len(),
        })?;
        Ok(Self::new(key_id, key))
    }
}

#[async_trait]
impl MasterKeyProvider for LocalMasterKey {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn seal(&self, plaintext: &[u8], context: &[u8]) -> Result<Envelope> {
        let nonce = EncryptionNonce::generate();
        let ciphertext = self.key.encrypt(plaintext, context, &nonce)?;
        Ok(Envelope {
            format: EnvelopeFormat::ChaCha20Poly1305,
            key_id: self.key_id.clone(),
            nonce,
            ciphertext,
        })
    }

    async fn open(&self, envelope: &Envelope, context: &[u8]) -> Result<Vec<u8>> {
        if envelope.key_id != self.key_id {
            return Err(CoreError::EnvelopeCorrupt(format!(
                "sealed under key {:?}, provider holds {:?}",
                envelope.key_id, self.key_id
            )));
        }
        match envelope.format {
            EnvelopeFormat::ChaCha20Poly1305 => self
                .key
                .decrypt(&envelope.ciphertext, context, &envelope.nonce)
                .map_err(|_| CoreError::EnvelopeCorrupt("authentication failed".into())),
        }
    }
}

/// Encrypts and decrypts root secrets (and legacy DEKs) under the master key.
pub struct EnvelopeStore<P: MasterKeyProvider> {
    provider: P,
}

impl<P: MasterKeyProvider> EnvelopeStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Generate a root secret and seal it immediately.
    ///
    /// Returns the secret for use during ingest and its envelope bytes for
    /// persistence.
    pub async fn generate_root_secret(&self) -> Result<(RootSecret, Vec<u8>)> {
        let secret = RootSecret::generate();
        let sealed = self.encrypt_root_secret(&secret).await?;
        Ok((secret, sealed))
    }

    pub async fn encrypt_root_secret(&self, secret: &RootSecret) -> Result<Vec<u8>> {
        self.seal(secret.as_bytes(), EnvelopePurpose::RootSecret).await
    }

    /// Open a root secret envelope.
    ///
    /// Any failure is [`CoreError::EnvelopeCorrupt`]: the caller must treat the
    /// video as corrupted and must not retry with a different key.
    pub async fn decrypt_root_secret(&self, sealed: &[u8]) -> Result<RootSecret> {
        let plaintext = self.open(sealed, EnvelopePurpose::RootSecret).await?;
        RootSecret::from_slice(&plaintext)
            .map_err(|e| CoreError::EnvelopeCorrupt(format!("root secret: {e}")))
    }

    pub async fn encrypt_dek(&self, dek: &Dek) -> Result<Vec<u8>> {
        self.seal(dek.as_bytes(), EnvelopePurpose::LegacySegmentDek).await
    }

    /// Open a legacy stored DEK.
    pub async fn decrypt_dek(&self, sealed: &[u8]) -> Result<Dek> {
        let plaintext = self.open(sealed, EnvelopePurpose::LegacySegmentDek).await?;
        Dek::from_slice(&plaintext).map_err(|e| CoreError::EnvelopeCorrupt(format!("dek: {e}")))
    }

    async fn seal(&self, plaintext: &[u8], purpose: EnvelopePurpose) -> Result<Vec<u8>> {
        self.provider
            .seal(plaintext, purpose.label())
            .await?
            .to_bytes()
    }

    async fn open(&self, sealed: &[u8], purpose: EnvelopePurpose) -> Result<Vec<u8>> {
        let envelope = Envelope::from_bytes(sealed)?;
        self.provider.open(&envelope, purpose.label()).await
    }
}

//! Threshold encryption of content keys.
//!
//! A sealed object carries the content under a fresh 256-bit content key.
//! That key is Shamir-split across the key servers; each share is encrypted
//! to one server's X25519 key. Opening needs `threshold` servers to approve
//! and re-encrypt their share to the caller's session key.

use std::fmt;

use serde::{Deserialize, Serialize};

use segvault_core::{EncryptionNonce, Kek, ObjectId, X25519PublicKey, X25519Secret};

use crate::error::{Result, SealError};
use crate::shamir::{self, Share};

const SHARE_LABEL: &[u8] = b"segvault/seal-share/v1";
const REENCRYPT_LABEL: &[u8] = b"segvault/seal-reencrypt/v1";
const CONTENT_LABEL: &[u8] = b"segvault/seal-content/v1";

/// Identifier of a key server.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyServerId(String);

impl KeyServerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for KeyServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyServerId({})", self.0)
    }
}

impl fmt::Display for KeyServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public description of a key server, as configured by publishers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyServerInfo {
    pub id: KeyServerId,
    pub public_key: X25519PublicKey,
}

fn push_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// HKDF info binding a share to its object and server.
fn share_binding(
    label: &[u8],
    package_id: &ObjectId,
    identity: &[u8],
    server: &KeyServerId,
) -> Vec<u8> {
    let mut info = label.to_vec();
    info.extend_from_slice(package_id.as_bytes());
    push_prefixed(&mut info, identity);
    push_prefixed(&mut info, server.as_str().as_bytes());
    info
}

fn content_aad(package_id: &ObjectId, identity: &[u8]) -> Vec<u8> {
    let mut aad = CONTENT_LABEL.to_vec();
    aad.extend_from_slice(package_id.as_bytes());
    push_prefixed(&mut aad, identity);
    aad
}

/// Ephemeral-static ECDH to `recipient`, then HKDF with the ephemeral key as salt.
fn encrypt_to(
    recipient: &X25519PublicKey,
    info: &[u8],
    share: &Share,
) -> Result<(X25519PublicKey, EncryptionNonce, Vec<u8>)> {
    let ephemeral = X25519Secret::generate();
    let ephemeral_public = ephemeral.public_key();
    let kek = ephemeral
        .diffie_hellman(recipient)?
        .derive_kek(ephemeral_public.as_bytes(), info)?;
    let nonce = EncryptionNonce::generate();
    let ciphertext = kek.encrypt(&share.value, &[share.index], &nonce)?;
    Ok((ephemeral_public, nonce, ciphertext))
}

fn decrypt_from(
    secret: &X25519Secret,
    ephemeral_public: &X25519PublicKey,
    info: &[u8],
    index: u8,
    nonce: &EncryptionNonce,
    ciphertext: &[u8],
) -> Result<Share> {
    let kek = secret
        .diffie_hellman(ephemeral_public)?
        .derive_kek(ephemeral_public.as_bytes(), info)?;
    let value = kek.decrypt(ciphertext, &[index], nonce)?;
    Ok(Share { index, value })
}

/// A share encrypted to one key server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedShare {
    pub server_id: KeyServerId,
    pub share_index: u8,
    pub ephemeral_public: X25519PublicKey,
    pub nonce: EncryptionNonce,
    pub ciphertext: Vec<u8>,
}

impl EncryptedShare {
    /// Decrypt with the key server's static secret.
    pub fn decrypt(
        &self,
        server_secret: &X25519Secret,
        package_id: &ObjectId,
        identity: &[u8],
    ) -> Result<Share> {
        let info = share_binding(SHARE_LABEL, package_id, identity, &self.server_id);
        decrypt_from(
            server_secret,
            &self.ephemeral_public,
            &info,
            self.share_index,
            &self.nonce,
            &self.ciphertext,
        )
    }
}

/// A share re-encrypted by a key server to a client session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReencryptedShare {
    pub server_id: KeyServerId,
    pub share_index: u8,
    pub ephemeral_public: X25519PublicKey,
    pub nonce: EncryptionNonce,
    pub ciphertext: Vec<u8>,
}

impl ReencryptedShare {
    /// Re-encrypt a recovered share to `recipient`.
    pub fn seal(
        server_id: KeyServerId,
        share: &Share,
        recipient: &X25519PublicKey,
        package_id: &ObjectId,
        identity: &[u8],
    ) -> Result<Self> {
        let info = share_binding(REENCRYPT_LABEL, package_id, identity, &server_id);
        let (ephemeral_public, nonce, ciphertext) = encrypt_to(recipient, &info, share)?;
        Ok(Self {
            server_id,
            share_index: share.index,
            ephemeral_public,
            nonce,
            ciphertext,
        })
    }

    /// Open with the session key's ephemeral secret.
    pub fn open(
        &self,
        session_secret: &X25519Secret,
        package_id: &ObjectId,
        identity: &[u8],
    ) -> Result<Share> {
        let info = share_binding(REENCRYPT_LABEL, package_id, identity, &self.server_id);
        decrypt_from(
            session_secret,
            &self.ephemeral_public,
            &info,
            self.share_index,
            &self.nonce,
            &self.ciphertext,
        )
    }
}

/// A threshold-encrypted object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedObject {
    pub package_id: ObjectId,
    pub identity: Vec<u8>,
    pub threshold: u8,
    pub shares: Vec<EncryptedShare>,
    pub nonce: EncryptionNonce,
    pub ciphertext: Vec<u8>,
}

impl SealedObject {
    /// Encrypt `plaintext` so any `threshold` of `servers` can release it.
    pub fn seal(
        plaintext: &[u8],
        package_id: ObjectId,
        identity: Vec<u8>,
        servers: &[KeyServerInfo],
        threshold: u8,
    ) -> Result<Self> {
        let total = u8::try_from(servers.len()).map_err(|_| SealError::InvalidThreshold {
            threshold,
            shares: u8::MAX,
        })?;
        for (i, server) in servers.iter().enumerate() {
            if servers[..i].iter().any(|s| s.id == server.id) {
                return Err(SealError::InvalidShares(format!(
                    "duplicate key server {}",
                    server.id
                )));
            }
        }

        let content_key = Kek::generate();
        let shares = shamir::split(content_key.as_bytes(), threshold, total)?;

        let mut encrypted = Vec::with_capacity(servers.len());
        for (server, share) in servers.iter().zip(&shares) {
            let info = share_binding(SHARE_LABEL, &package_id, &identity, &server.id);
            let (ephemeral_public, nonce, ciphertext) =
                encrypt_to(&server.public_key, &info, share)?;
            encrypted.push(EncryptedShare {
                server_id: server.id.clone(),
                share_index: share.index,
                ephemeral_public,
                nonce,
                ciphertext,
            });
        }

        let nonce = EncryptionNonce::generate();
        let aad = content_aad(&package_id, &identity);
        let ciphertext = content_key.encrypt(plaintext, &aad, &nonce)?;

        Ok(Self {
            package_id,
            identity,
            threshold,
            shares: encrypted,
            nonce,
            ciphertext,
        })
    }

    /// Decrypt the content once the key has been recombined.
    pub fn open(&self, content_key: &Kek) -> Result<Vec<u8>> {
        Ok(content_key.decrypt(
            &self.ciphertext,
            &content_aad(&self.package_id, &self.identity),
            &self.nonce,
        )?)
    }

    /// Rebuild the content key from recovered shares.
    pub fn combine(&self, shares: &[Share]) -> Result<Kek> {
        if shares.len() < self.threshold as usize {
            return Err(SealError::ThresholdUnavailable {
                got: shares.len(),
                need: self.threshold as usize,
            });
        }
        let bytes = shamir::combine(shares)?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SealError::InvalidShares("content key length".into()))?;
        Ok(Kek::from_bytes(key))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| SealError::Encoding(e.to_string()))?;
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| SealError::Encoding(e.to_string()))
    }
}

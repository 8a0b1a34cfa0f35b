//! Seal session keys.
//!
//! A session key is an ephemeral X25519 key the wallet certifies once, so key
//! servers can re-encrypt shares to it without a wallet prompt per request.

use std::fmt;

use segvault_core::{
    Ed25519PublicKey, Ed25519Signature, Keypair, ObjectId, WalletAddress, X25519PublicKey,
    X25519Secret,
};

use crate::error::{Result, SealError};

/// Default session-key lifetime: 10 minutes.
pub const DEFAULT_SESSION_KEY_TTL_MS: i64 = 10 * 60 * 1000;

/// The message a wallet signs to certify a session key.
pub fn certificate_message(
    package_id: &ObjectId,
    ephemeral: &X25519PublicKey,
    created_at: i64,
    ttl_ms: i64,
) -> String {
    format!(
        "segvault-seal-session:v1\npackage:{}\nkey:{}\ncreated:{}\nttl_ms:{}",
        package_id.to_hex(),
        hex::encode(ephemeral.as_bytes()),
        created_at,
        ttl_ms
    )
}

/// What a key server sees: the public half of a signed session key.
#[derive(Debug, Clone)]
pub struct SessionCertificate {
    pub public_key: Ed25519PublicKey,
    pub package_id: ObjectId,
    pub ephemeral: X25519PublicKey,
    pub created_at: i64,
    pub ttl_ms: i64,
    pub signature: Ed25519Signature,
}

impl SessionCertificate {
    pub fn address(&self) -> WalletAddress {
        self.public_key.address()
    }

    pub fn expires_at(&self) -> i64 {
        self.created_at.saturating_add(self.ttl_ms)
    }

    /// Check the signature, the package binding and the validity window.
    pub fn verify(&self, package_id: &ObjectId, now: i64) -> Result<()> {
        if &self.package_id != package_id {
            return Err(SealError::InvalidSessionKey(format!(
                "certified for package {}, not {}",
                self.package_id, package_id
            )));
        }
        if self.ttl_ms <= 0 {
            return Err(SealError::InvalidSessionKey("non-positive ttl".into()));
        }
        if now >= self.expires_at() {
            return Err(SealError::SessionKeyExpired);
        }
        let message =
            certificate_message(&self.package_id, &self.ephemeral, self.created_at, self.ttl_ms);
        self.public_key
            .verify(message.as_bytes(), &self.signature)
            .map_err(|e| SealError::InvalidSessionKey(e.to_string()))
    }
}

/// A wallet-certified ephemeral key, held by the client.
pub struct SealSessionKey {
    address: WalletAddress,
    package_id: ObjectId,
    created_at: i64,
    ttl_ms: i64,
    ephemeral: X25519Secret,
    certificate: SessionCertificate,
}

impl SealSessionKey {
    /// Create and sign a session key with the wallet keypair.
    pub fn create(wallet: &Keypair, package_id: ObjectId, ttl_ms: i64, now: i64) -> Result<Self> {
        if ttl_ms <= 0 {
            return Err(SealError::InvalidSessionKey("non-positive ttl".into()));
        }
        let ephemeral = X25519Secret::generate();
        let ephemeral_public = ephemeral.public_key();
        let message = certificate_message(&package_id, &ephemeral_public, now, ttl_ms);
        let signature = wallet.sign(message.as_bytes());

        Ok(Self {
            address: wallet.address(),
            package_id,
            created_at: now,
            ttl_ms,
            ephemeral,
            certificate: SessionCertificate {
                public_key: wallet.public_key(),
                package_id,
                ephemeral: ephemeral_public,
                created_at: now,
                ttl_ms,
                signature,
            },
        })
    }

    pub fn address(&self) -> &WalletAddress {
        &self.address
    }

    pub fn package_id(&self) -> &ObjectId {
        &self.package_id
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.created_at.saturating_add(self.ttl_ms)
    }

    pub fn certificate(&self) -> &SessionCertificate {
        &self.certificate
    }

    pub(crate) fn ephemeral(&self) -> &X25519Secret {
        &self.ephemeral
    }
}

impl fmt::Debug for SealSessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealSessionKey")
            .field("address", &self.address)
            .field("package_id", &self.package_id)
            .field("created_at", &self.created_at)
            .field("ttl_ms", &self.ttl_ms)
            .finish_non_exhaustive()
    }
}

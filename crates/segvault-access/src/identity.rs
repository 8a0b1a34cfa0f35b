//! Wallet identity and signature verification.

use segvault_core::{ChainId, Ed25519PublicKey, Ed25519Signature, SessionId, WalletAddress};

use crate::error::AuthFailure;

/// The message a wallet signs to authenticate within one session.
pub fn auth_message(session_id: &SessionId, address: &WalletAddress, chain: &ChainId) -> String {
    format!("segvault-auth:v1\nsession:{session_id}\naddress:{address}\nchain:{chain}")
}

/// A requester's claimed identity, as carried by request metadata.
///
/// Nothing here is trusted until [`SignatureVerifier::verify`] passes.
#[derive(Debug, Clone)]
pub struct WalletIdentity {
    pub address: WalletAddress,
    pub chain: ChainId,
    pub public_key: Option<Ed25519PublicKey>,
    pub signature: Option<Ed25519Signature>,
    pub message: Vec<u8>,
}

impl WalletIdentity {
    /// Build a signed identity for a session.
    pub fn sign(keypair: &segvault_core::Keypair, chain: ChainId, session_id: &SessionId) -> Self {
        let address = keypair.address();
        let message = auth_message(session_id, &address, &chain).into_bytes();
        Self {
            signature: Some(keypair.sign(&message)),
            public_key: Some(keypair.public_key()),
            address,
            chain,
            message,
        }
    }
}

/// Proof that an identity passed verification.
///
/// Only the gate constructs this, so holding one means step 1 succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    address: WalletAddress,
    chain: ChainId,
}

impl VerifiedIdentity {
    pub(crate) fn new(address: WalletAddress, chain: ChainId) -> Self {
        Self { address, chain }
    }

    pub fn address(&self) -> &WalletAddress {
        &self.address
    }

    pub fn chain(&self) -> &ChainId {
        &self.chain
    }
}

/// Checks that an identity signed the expected session-bound message.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, identity: &WalletIdentity, expected_message: &[u8])
        -> Result<(), AuthFailure>;
}

/// Ed25519 wallets whose address is derived from the public key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(
        &self,
        identity: &WalletIdentity,
        expected_message: &[u8],
    ) -> Result<(), AuthFailure> {
        let signature = identity
            .signature
            .as_ref()
            .ok_or(AuthFailure::MissingSignature)?;
        let public_key = identity
            .public_key
            .as_ref()
            .ok_or(AuthFailure::MissingPublicKey)?;

        if public_key.address() != identity.address {
            return Err(AuthFailure::AddressMismatch);
        }
        if identity.message != expected_message {
            return Err(AuthFailure::MessageMismatch);
        }
        public_key
            .verify(&identity.message, signature)
            .map_err(|e| match e {
                segvault_core::CoreError::InvalidPublicKey => AuthFailure::MalformedPublicKey,
                _ => AuthFailure::BadSignature,
            })
    }
}

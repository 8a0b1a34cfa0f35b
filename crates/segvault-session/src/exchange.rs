//! The session key exchange.
//!
//! ```text
//! client                                   server
//!   ephemeral (c, C) ──── C ────────────▶  ephemeral (s, S), nonce N, id
//!                    ◀─── id, S, N ──────
//!   KEK = HKDF(N, DH(c, S), ctx)           KEK = HKDF(N, DH(s, C), ctx)
//! ```
//!
//! `ctx` binds the label, the session id and both public keys. The KEK is
//! never transmitted.

use serde::{Deserialize, Serialize};

use segvault_core::{
    Kek, RenditionName, SegmentIndex, SessionId, SharedKey, VideoId, X25519PublicKey,
    X25519Secret,
};

use crate::error::Result;

/// Domain-separation label for session KEKs.
pub const SESSION_KEK_LABEL: &[u8] = b"segvault/session-kek/v1";

/// 256-bit server nonce, used as the HKDF salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionNonce(pub [u8; 32]);

impl SessionNonce {
    pub fn generate() -> Self {
        Self(segvault_core::random_array())
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// The server's reply to a session request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHello {
    pub session_id: SessionId,
    pub server_public: X25519PublicKey,
    pub nonce: SessionNonce,
    /// Absolute expiry, Unix ms.
    pub expires_at: i64,
}

/// Derive the session KEK from a completed agreement.
pub fn derive_session_kek(
    shared: &SharedKey,
    nonce: &SessionNonce,
    session_id: &SessionId,
    client_public: &X25519PublicKey,
    server_public: &X25519PublicKey,
) -> Result<Kek> {
    let mut info = Vec::with_capacity(SESSION_KEK_LABEL.len() + 16 + 64);
    info.extend_from_slice(SESSION_KEK_LABEL);
    info.extend_from_slice(session_id.as_bytes());
    info.extend_from_slice(client_public.as_bytes());
    info.extend_from_slice(server_public.as_bytes());
    Ok(shared.derive_kek(nonce.as_bytes(), &info)?)
}

/// Associated data for wrapping one segment's DEK.
///
/// Binds the wrapped key to its session and segment so it cannot be
/// replayed as the key of another segment.
pub fn wrap_aad(
    session_id: &SessionId,
    video_id: &VideoId,
    rendition: &RenditionName,
    index: SegmentIndex,
) -> Vec<u8> {
    let video = video_id.as_str().as_bytes();
    let rendition = rendition.as_str().as_bytes();
    let mut aad = Vec::with_capacity(16 + 12 + video.len() + rendition.len());
    aad.extend_from_slice(session_id.as_bytes());
    aad.extend_from_slice(&(video.len() as u32).to_be_bytes());
    aad.extend_from_slice(video);
    aad.extend_from_slice(&(rendition.len() as u32).to_be_bytes());
    aad.extend_from_slice(rendition);
    aad.extend_from_slice(&index.get().to_be_bytes());
    aad
}

/// Client half of the exchange.
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    secret: X25519Secret,
}

impl ClientHandshake {
    /// Start a handshake with a fresh ephemeral key.
    pub fn generate() -> Self {
        Self {
            secret: X25519Secret::generate(),
        }
    }

    /// Start a handshake with a caller-provided key.
    pub fn from_secret(secret: X25519Secret) -> Self {
        Self { secret }
    }

    /// The public key to send to the server.
    pub fn public_key(&self) -> X25519PublicKey {
        self.secret.public_key()
    }

    /// Compute the session KEK from the server's reply.
    pub fn complete(&self, hello: &ServerHello) -> Result<Kek> {
        let shared = self.secret.diffie_hellman(&hello.server_public)?;
        derive_session_kek(
            &shared,
            &hello.nonce,
            &hello.session_id,
            &self.public_key(),
            &hello.server_public,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_aad_distinguishes_segments() {
        let sid = SessionId::from_bytes([1; 16]);
        let video = VideoId::new("v1").unwrap();
        let r = RenditionName::new("720p").unwrap();

        let a5 = wrap_aad(&sid, &video, &r, SegmentIndex::media(5));
        let a6 = wrap_aad(&sid, &video, &r, SegmentIndex::media(6));
        assert_ne!(a5, a6);

        let other = SessionId::from_bytes([2; 16]);
        assert_ne!(a5, wrap_aad(&other, &video, &r, SegmentIndex::media(5)));
    }

    #[test]
    fn test_nonce_changes_kek() {
        let client = X25519Secret::generate();
        let server = X25519Secret::generate();
        let shared = client.diffie_hellman(&server.public_key()).unwrap();
        let sid = SessionId::generate();

        let k1 = derive_session_kek(
            &shared,
            &SessionNonce([1; 32]),
            &sid,
            &client.public_key(),
            &server.public_key(),
        )
        .unwrap();
        let k2 = derive_session_kek(
            &shared,
            &SessionNonce([2; 32]),
            &sid,
            &client.public_key(),
            &server.public_key(),
        )
        .unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;
        use segvault_core::Dek;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn both_sides_derive_same_kek_and_unwrap_is_identity(
                client_seed in any::<[u8; 32]>(),
                server_seed in any::<[u8; 32]>(),
                nonce in any::<[u8; 32]>(),
                sid in any::<[u8; 16]>(),
                dek in any::<[u8; 16]>(),
                idx in 0u32..10_000,
            ) {
                let client = ClientHandshake::from_secret(X25519Secret::from_bytes(client_seed));
                let server = X25519Secret::from_bytes(server_seed);
                let hello = ServerHello {
                    session_id: SessionId::from_bytes(sid),
                    server_public: server.public_key(),
                    nonce: SessionNonce(nonce),
                    expires_at: 0,
                };

                let client_kek = client.complete(&hello).unwrap();
                let shared = server.diffie_hellman(&client.public_key()).unwrap();
                let server_kek = derive_session_kek(
                    &shared,
                    &hello.nonce,
                    &hello.session_id,
                    &client.public_key(),
                    &hello.server_public,
                ).unwrap();
                prop_assert_eq!(client_kek.as_bytes(), server_kek.as_bytes());

                let aad = wrap_aad(
                    &hello.session_id,
                    &VideoId::new("v1").unwrap(),
                    &RenditionName::new("720p").unwrap(),
                    SegmentIndex::media(idx),
                );
                let dek = Dek::from_bytes(dek);
                let wrapped = server_kek.wrap_dek(&dek, &aad).unwrap();
                prop_assert_eq!(client_kek.unwrap_dek(&wrapped, &aad).unwrap(), dek);
            }
        }
    }
}

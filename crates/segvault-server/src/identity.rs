//! Requester identity from request headers.
//!
//! Absent signature or public key headers are passed through as `None`;
//! the access gate decides what that means. Present but undecodable values
//! are rejected here.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use segvault::access::{AuthFailure, WalletIdentity};
use segvault::core::{ChainId, Ed25519PublicKey, Ed25519Signature, SessionId, WalletAddress};
use segvault::request::decode_b64;
use segvault::{RequestIdentity, ServiceError};

use crate::response::ApiError;

pub const SESSION_HEADER: &str = "x-session-id";
pub const ADDRESS_HEADER: &str = "x-wallet-address";
pub const CHAIN_HEADER: &str = "x-wallet-chain";
pub const PUBLIC_KEY_HEADER: &str = "x-wallet-public-key";
pub const SIGNATURE_HEADER: &str = "x-wallet-signature";
pub const MESSAGE_HEADER: &str = "x-wallet-message";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ServiceError> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map(str::trim)
                .map_err(|_| ServiceError::InvalidRequest(format!("{name}: not valid ASCII")))
        })
        .transpose()
}

fn required<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ServiceError> {
    header(headers, name)?
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServiceError::InvalidRequest(format!("missing {name} header")))
}

/// Parse the identity headers.
pub fn identity_from_headers(headers: &HeaderMap) -> Result<RequestIdentity, ServiceError> {
    let session_id = SessionId::from_hex(required(headers, SESSION_HEADER)?)?;
    let address = WalletAddress::parse(required(headers, ADDRESS_HEADER)?)?;
    let chain = ChainId::new(required(headers, CHAIN_HEADER)?)?;

    let public_key = header(headers, PUBLIC_KEY_HEADER)?
        .map(|hex| {
            Ed25519PublicKey::from_hex(hex)
                .map_err(|_| ServiceError::Authentication(AuthFailure::MalformedPublicKey))
        })
        .transpose()?;
    let signature = header(headers, SIGNATURE_HEADER)?
        .map(|hex| {
            Ed25519Signature::from_hex(hex)
                .map_err(|_| ServiceError::Authentication(AuthFailure::BadSignature))
        })
        .transpose()?;
    let message = match header(headers, MESSAGE_HEADER)? {
        Some(encoded) => decode_b64(MESSAGE_HEADER, encoded)?,
        None => Vec::new(),
    };

    Ok(RequestIdentity {
        session_id,
        wallet: WalletIdentity {
            address,
            chain,
            public_key,
            signature,
            message,
        },
    })
}

/// Write an identity into request headers. Used by clients and tests.
pub fn identity_headers(identity: &RequestIdentity) -> Vec<(&'static str, String)> {
    let wallet = &identity.wallet;
    let mut headers = vec![
        (SESSION_HEADER, identity.session_id.to_hex()),
        (ADDRESS_HEADER, wallet.address.to_string()),
        (CHAIN_HEADER, wallet.chain.to_string()),
        (MESSAGE_HEADER, segvault::request::encode_b64(&wallet.message)),
    ];
    if let Some(key) = &wallet.public_key {
        headers.push((PUBLIC_KEY_HEADER, key.to_hex()));
    }
    if let Some(sig) = &wallet.signature {
        headers.push((SIGNATURE_HEADER, sig.to_hex()));
    }
    headers
}

/// Extractor for the signed requester identity.
pub struct Identity(pub RequestIdentity);

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Identity(identity_from_headers(&parts.headers)?))
    }
}

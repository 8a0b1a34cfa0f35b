//! Wire shapes for the key delivery endpoints.
//!
//! Binary fields are standard base64, field names are camelCase. The two
//! batch input shapes and the prefetch range all normalise to one list of
//! [`KeyCoordRequest`] before any work happens.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use segvault_access::PaymentStatus;
use segvault_core::{SessionId, X25519PublicKey};
use segvault_session::{ServerHello, SessionNonce};

use crate::error::{Result, ServiceError};
use crate::service::{BatchItem, DeliveredKey, KeyMaterial, SealApproval};

pub fn encode_b64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

pub fn decode_b64(field: &str, value: &str) -> Result<Vec<u8>> {
    general_purpose::STANDARD
        .decode(value.trim())
        .map_err(|e| ServiceError::InvalidRequest(format!("{field}: invalid base64: {e}")))
}

/// One requested key, as sent by the client. Validated per item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyCoordRequest {
    pub rendition: String,
    pub seg_idx: i64,
}

/// Batch key request in either accepted shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchKeyRequest {
    /// `{keys: [{rendition, segIdx}, ...]}`
    Pairs { keys: Vec<KeyCoordRequest> },
    /// `{rendition, segIndices: [...]}`
    Indices {
        rendition: String,
        #[serde(rename = "segIndices")]
        seg_indices: Vec<i64>,
    },
}

impl BatchKeyRequest {
    pub fn item_count(&self) -> usize {
        match self {
            BatchKeyRequest::Pairs { keys } => keys.len(),
            BatchKeyRequest::Indices { seg_indices, .. } => seg_indices.len(),
        }
    }

    pub fn into_items(self) -> Vec<KeyCoordRequest> {
        match self {
            BatchKeyRequest::Pairs { keys } => keys,
            BatchKeyRequest::Indices {
                rendition,
                seg_indices,
            } => seg_indices
                .into_iter()
                .map(|seg_idx| KeyCoordRequest {
                    rendition: rendition.clone(),
                    seg_idx,
                })
                .collect(),
        }
    }
}

/// Prefetch request: a contiguous range or any batch shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefetchRequest {
    /// `{rendition, start, count}`
    Range {
        rendition: String,
        start: i64,
        count: u32,
    },
    Batch(BatchKeyRequest),
}

impl PrefetchRequest {
    pub fn item_count(&self) -> usize {
        match self {
            PrefetchRequest::Range { count, .. } => *count as usize,
            PrefetchRequest::Batch(batch) => batch.item_count(),
        }
    }

    /// Expand to items. Call only after [`item_count`](Self::item_count) is bounded.
    pub fn into_items(self) -> Vec<KeyCoordRequest> {
        match self {
            PrefetchRequest::Range {
                rendition,
                start,
                count,
            } => (0..i64::from(count))
                .map(|offset| KeyCoordRequest {
                    rendition: rendition.clone(),
                    seg_idx: start.saturating_add(offset),
                })
                .collect(),
            PrefetchRequest::Batch(batch) => batch.into_items(),
        }
    }
}

/// Single key response: `{wrappedKey | dek, iv}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrapped_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dek: Option<String>,
    pub iv: String,
}

impl From<&DeliveredKey> for KeyResponse {
    fn from(key: &DeliveredKey) -> Self {
        let (wrapped_key, dek) = match &key.material {
            KeyMaterial::Wrapped(wrapped) => (Some(encode_b64(wrapped.as_bytes())), None),
            KeyMaterial::Direct(dek) => (None, Some(encode_b64(dek.as_bytes()))),
        };
        Self {
            wrapped_key,
            dek,
            iv: encode_b64(key.iv.as_bytes()),
        }
    }
}

/// One entry of a batch response. Exactly one of a key or `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchKeyItem {
    pub rendition: String,
    pub seg_idx: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrapped_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dek: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&BatchItem> for BatchKeyItem {
    fn from(item: &BatchItem) -> Self {
        let mut out = Self {
            rendition: item.request.rendition.clone(),
            seg_idx: item.request.seg_idx,
            wrapped_key: None,
            dek: None,
            iv: None,
            error: None,
        };
        match &item.result {
            Ok(key) => {
                let response = KeyResponse::from(key);
                out.wrapped_key = response.wrapped_key;
                out.dek = response.dek;
                out.iv = Some(response.iv);
            }
            Err(e) => out.error = Some(e.client_message()),
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchKeyResponse {
    pub keys: Vec<BatchKeyItem>,
}

impl BatchKeyResponse {
    pub fn from_items(items: &[BatchItem]) -> Self {
        Self {
            keys: items.iter().map(BatchKeyItem::from).collect(),
        }
    }
}

/// Session establishment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub video_id: String,
    /// Client ephemeral X25519 public key, base64.
    pub client_public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    /// Hex session id.
    pub session_id: String,
    pub server_public_key: String,
    pub nonce: String,
    pub expires_at: i64,
}

impl From<&ServerHello> for SessionResponse {
    fn from(hello: &ServerHello) -> Self {
        Self {
            session_id: hello.session_id.to_hex(),
            server_public_key: encode_b64(hello.server_public.as_bytes()),
            nonce: encode_b64(hello.nonce.as_bytes()),
            expires_at: hello.expires_at,
        }
    }
}

impl SessionResponse {
    /// Client side: decode the server's reply for
    /// [`ClientHandshake::complete`](segvault_session::ClientHandshake::complete).
    pub fn to_hello(&self) -> Result<ServerHello> {
        let nonce: [u8; 32] = decode_b64("nonce", &self.nonce)?
            .try_into()
            .map_err(|_| ServiceError::InvalidRequest("nonce must be 32 bytes".into()))?;
        Ok(ServerHello {
            session_id: SessionId::from_hex(&self.session_id)?,
            server_public: X25519PublicKey::from_slice(&decode_b64(
                "serverPublicKey",
                &self.server_public_key,
            )?)?,
            nonce: SessionNonce(nonce),
            expires_at: self.expires_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub has_paid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_segment_ids: Option<Vec<u32>>,
}

impl From<PaymentStatus> for PaymentStatusResponse {
    fn from(status: PaymentStatus) -> Self {
        Self {
            has_paid: status.has_paid,
            paid_segment_ids: status.paid_segments.map(|s| s.into_iter().collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealApprovalResponse {
    /// CBOR approval transaction, base64.
    pub proof: String,
    /// CBOR sealed root secret, base64.
    pub sealed_root: String,
    pub threshold: u8,
}

impl SealApprovalResponse {
    pub fn from_approval(approval: &SealApproval) -> Result<Self> {
        Ok(Self {
            proof: encode_b64(&approval.proof.to_bytes()?),
            sealed_root: encode_b64(&approval.sealed_root),
            threshold: approval.threshold,
        })
    }
}

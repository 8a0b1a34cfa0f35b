//! Persisted entities.
//!
//! Only two long-lived secret artifacts are ever stored: the envelope of a
//! video's root secret and, for legacy segments, the envelope of a stored
//! DEK. Session keys and wrapped keys never reach this layer.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use segvault_core::{
    BlobId, ChainId, ChannelId, EncryptionMode, ObjectId, ObjectRef, RenditionName, Scheme,
    SegmentIndex, SegmentIv, VideoId, WalletAddress,
};

/// An ingested video. Immutable once inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    /// Envelope-encrypted root secret. Present when the mode includes the DEK scheme.
    pub root_secret_enc: Option<Vec<u8>>,
    /// Threshold-encrypted root secret. Present when the mode includes the seal scheme.
    pub sealed_root: Option<Vec<u8>>,
    pub duration_ms: u64,
    pub mode: EncryptionMode,
    /// Creator channel, required for the seal scheme.
    pub channel: Option<ChannelId>,
    pub created_at: i64,
}

/// One quality level of a video under one scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rendition {
    pub video_id: VideoId,
    pub scheme: Scheme,
    pub name: RenditionName,
    /// Bitrate in kbit/s.
    pub bitrate: u32,
    pub width: u32,
    pub height: u32,
}

/// Where a segment's DEK comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeySource {
    /// Re-derived from the video's root secret on demand.
    Derived,
    /// Legacy record: the DEK itself, envelope-encrypted under the master key.
    Stored(Vec<u8>),
}

/// One stored segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub video_id: VideoId,
    pub scheme: Scheme,
    pub rendition: RenditionName,
    pub index: SegmentIndex,
    pub blob_id: BlobId,
    /// `None` for the plaintext init segment.
    pub iv: Option<SegmentIv>,
    /// Stored size in bytes (ciphertext including tag).
    pub size: u64,
    pub key_source: KeySource,
}

impl Segment {
    pub fn is_encrypted(&self) -> bool {
        self.iv.is_some()
    }
}

/// Kind of settled access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Payment,
    Subscription,
}

impl AccessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessKind::Payment => "payment",
            AccessKind::Subscription => "subscription",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "payment" => Some(AccessKind::Payment),
            "subscription" => Some(AccessKind::Subscription),
            _ => None,
        }
    }
}

/// A payment or subscription record for one `(video, payer, chain)`.
///
/// Presence of an index in `paid_segments` grants access to that segment.
/// The set may be extended but never shrunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub video_id: VideoId,
    pub payer: WalletAddress,
    pub chain: ChainId,
    pub kind: AccessKind,
    pub paid_segments: BTreeSet<u32>,
    pub created_at: i64,
}

impl AccessRecord {
    pub fn covers(&self, index: u32) -> bool {
        self.paid_segments.contains(&index)
    }

    /// Merge a later record for the same key into this one.
    ///
    /// Segments are unioned. The original kind and creation time are kept.
    pub fn extend(&mut self, other: &AccessRecord) {
        self.paid_segments.extend(other.paid_segments.iter().copied());
    }
}

/// Channel configuration for the threshold path. Read-only to the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorConfig {
    pub channel_id: ChannelId,
    /// Subscription policy object, fully qualified.
    pub policy_object: ObjectRef,
    /// Policy package the key servers evaluate.
    pub package_id: ObjectId,
    /// Subscription fee in the chain's smallest unit.
    pub fee: u64,
    pub metadata: BTreeMap<String, String>,
}

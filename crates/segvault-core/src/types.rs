//! Strong type definitions for segvault.
//!
//! All identifiers are newtypes so a rendition name can never be passed
//! where a video id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create from a non-empty string.
            pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
                let value = value.into();
                if value.is_empty() || value.len() > 256 {
                    return Err(CoreError::InvalidIdentifier(format!(
                        "{}: length must be 1..=256",
                        stringify!($name)
                    )));
                }
                Ok(Self(value))
            }

            /// Borrow as str.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = CoreError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

string_id!(
    /// Identifier of an ingested video.
    VideoId
);

string_id!(
    /// Rendition name, e.g. `"720p"`.
    RenditionName
);

string_id!(
    /// Chain identifier a payment settled on, e.g. `"sui:mainnet"`.
    ChainId
);

string_id!(
    /// Opaque identifier in the content-addressed blob store.
    BlobId
);

string_id!(
    /// Creator channel identifier (subscription path).
    ChannelId
);

/// Index of a segment within a rendition.
///
/// `-1` is the synthetic init segment. It carries container metadata and is
/// stored unencrypted so the decoder can read it before any key exists.
/// This is a deliberate decoder-compatibility trade-off: codec and track
/// metadata in the init segment are not confidential.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct SegmentIndex(i32);

impl SegmentIndex {
    /// The init segment.
    pub const INIT: Self = Self(-1);

    /// Validate a raw index (must be >= -1 and fit in i32).
    pub fn new(raw: i64) -> Result<Self, CoreError> {
        if raw < -1 || raw > i32::MAX as i64 {
            return Err(CoreError::InvalidSegmentIndex(raw));
        }
        Ok(Self(raw as i32))
    }

    /// A media segment index (>= 0).
    pub const fn media(index: u32) -> Self {
        // Indices above i32::MAX are clamped; transcoders never emit them.
        if index > i32::MAX as u32 {
            Self(i32::MAX)
        } else {
            Self(index as i32)
        }
    }

    /// Whether this is the init segment.
    pub const fn is_init(&self) -> bool {
        self.0 == -1
    }

    /// Raw signed value.
    pub const fn get(&self) -> i32 {
        self.0
    }

    /// The media index, or `None` for the init segment.
    pub fn media_index(&self) -> Option<u32> {
        u32::try_from(self.0).ok()
    }
}

impl fmt::Debug for SegmentIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_init() {
            write!(f, "SegmentIndex(init)")
        } else {
            write!(f, "SegmentIndex({})", self.0)
        }
    }
}

impl fmt::Display for SegmentIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for SegmentIndex {
    type Error = CoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SegmentIndex> for i64 {
    fn from(idx: SegmentIndex) -> Self {
        idx.0 as i64
    }
}

/// Coordinates of a segment within a video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentCoord {
    pub rendition: RenditionName,
    pub index: SegmentIndex,
}

impl SegmentCoord {
    pub fn new(rendition: RenditionName, index: SegmentIndex) -> Self {
        Self { rendition, index }
    }
}

/// A 16-byte playback session identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub [u8; 16]);

impl SessionId {
    /// Generate a new random session id.
    pub fn generate() -> Self {
        Self(crate::crypto::random_array())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidIdentifier(e.to_string()))?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidIdentifier("session id must be 16 bytes".into()))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", &self.to_hex()[..8])
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A wallet address: `0x` followed by 64 lowercase hex characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Parse and normalise an address.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let lower = s.trim().to_ascii_lowercase();
        let hex_part = lower
            .strip_prefix("0x")
            .ok_or_else(|| CoreError::InvalidIdentifier("address must start with 0x".into()))?;
        if hex_part.len() != 64 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidIdentifier(
                "address must be 32 hex-encoded bytes".into(),
            ));
        }
        Ok(Self(lower))
    }

    /// Derive the address of an Ed25519 wallet key.
    ///
    /// `0x || hex(blake3(0x00 || public_key))`; the leading zero byte is the
    /// signature-scheme flag.
    pub fn from_public_key(public_key: &crate::wallet::Ed25519PublicKey) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[0x00]);
        hasher.update(public_key.as_bytes());
        Self(format!("0x{}", hasher.finalize().to_hex()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletAddress({}..)", &self.0[..10])
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WalletAddress> for String {
    fn from(addr: WalletAddress) -> Self {
        addr.0
    }
}

/// A 32-byte on-chain object identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub [u8; 32]);

impl ObjectId {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| CoreError::InvalidIdentifier(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidIdentifier("object id must be 32 bytes".into()))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..18])
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A fully-qualified object reference: id, version and digest.
///
/// Key servers can check a fully-qualified reference without an extra
/// round trip to resolve the current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub object_id: ObjectId,
    pub version: u64,
    pub digest: [u8; 32],
}

/// How a video's segments are protected. Chosen once at ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionMode {
    /// Per-video root secret under the master key; DEKs delivered by the key service.
    Dek,
    /// Root secret threshold-encrypted under the channel subscription policy.
    Seal,
    /// Uploaded twice, once under each scheme.
    Both,
}

impl EncryptionMode {
    /// Schemes a video in this mode carries.
    pub fn schemes(&self) -> &'static [Scheme] {
        match self {
            EncryptionMode::Dek => &[Scheme::Dek],
            EncryptionMode::Seal => &[Scheme::Seal],
            EncryptionMode::Both => &[Scheme::Dek, Scheme::Seal],
        }
    }

    /// Whether segments encrypted under `scheme` exist for this mode.
    pub fn supports(&self, scheme: Scheme) -> bool {
        self.schemes().contains(&scheme)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionMode::Dek => "dek",
            EncryptionMode::Seal => "seal",
            EncryptionMode::Both => "both",
        }
    }
}

impl FromStr for EncryptionMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dek" => Ok(EncryptionMode::Dek),
            "seal" => Ok(EncryptionMode::Seal),
            "both" => Ok(EncryptionMode::Both),
            other => Err(CoreError::InvalidIdentifier(format!(
                "unknown encryption mode: {other}"
            ))),
        }
    }
}

/// One protection scheme a segment copy is encrypted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Dek,
    Seal,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Dek => "dek",
            Scheme::Seal => "seal",
        }
    }
}

impl FromStr for Scheme {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dek" => Ok(Scheme::Dek),
            "seal" => Ok(Scheme::Seal),
            other => Err(CoreError::InvalidIdentifier(format!("unknown scheme: {other}"))),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_index_bounds() {
        assert!(SegmentIndex::new(-1).unwrap().is_init());
        assert_eq!(SegmentIndex::new(5).unwrap().media_index(), Some(5));
        assert!(SegmentIndex::new(-2).is_err());
        assert!(SegmentIndex::new(i64::from(i32::MAX) + 1).is_err());
        assert_eq!(SegmentIndex::INIT.media_index(), None);
    }

    #[test]
    fn test_segment_index_serde_rejects_below_init() {
        let idx: SegmentIndex = serde_json::from_str("7").unwrap();
        assert_eq!(idx.get(), 7);
        assert!(serde_json::from_str::<SegmentIndex>("-3").is_err());
    }

    #[test]
    fn test_session_id_hex_roundtrip() {
        let id = SessionId::generate();
        let recovered = SessionId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, recovered);
        assert!(SessionId::from_hex("abcd").is_err());
    }

    #[test]
    fn test_wallet_address_normalised() {
        let upper = format!("0x{}", "AB".repeat(32));
        let addr = WalletAddress::parse(&upper).unwrap();
        assert_eq!(addr.as_str(), format!("0x{}", "ab".repeat(32)));
        assert!(WalletAddress::parse("ab").is_err());
        assert!(WalletAddress::parse("0x1234").is_err());
    }

    #[test]
    fn test_empty_identifier_rejected() {
        assert!(VideoId::new("").is_err());
        assert_eq!(VideoId::new("v1").unwrap().as_str(), "v1");
    }

    #[test]
    fn test_encryption_mode_schemes() {
        assert!(EncryptionMode::Both.supports(Scheme::Dek));
        assert!(EncryptionMode::Both.supports(Scheme::Seal));
        assert!(!EncryptionMode::Dek.supports(Scheme::Seal));
        assert_eq!("seal".parse::<EncryptionMode>().unwrap(), EncryptionMode::Seal);
    }
}

//! Segment DEK derivation.
//!
//! A segment's DEK is a pure function of the video's root secret and the
//! segment coordinates, so the server can regenerate any key on demand and
//! never stores per-segment keys.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::crypto::{Dek, RootSecret};
use crate::error::{CoreError, Result};
use crate::types::{RenditionName, SegmentIndex, VideoId};

/// Domain-separation label for segment DEKs.
pub const DEK_INFO_LABEL: &[u8] = b"segvault/segment-dek/v1";

/// Derive the DEK for one media segment.
///
/// HKDF-SHA256 with the root secret as IKM and no salt. The info string is
/// the label followed by length-prefixed video id and rendition and the
/// big-endian segment index; the length prefixes keep the encoding injective.
///
/// Init segments (index -1) are rejected: they are never encrypted.
pub fn derive_segment_dek(
    root: &RootSecret,
    video_id: &VideoId,
    rendition: &RenditionName,
    index: SegmentIndex,
) -> Result<Dek> {
    if index.is_init() {
        return Err(CoreError::InitSegmentHasNoKey);
    }

    let info = dek_info(video_id, rendition, index);
    let hk = Hkdf::<Sha256>::new(None, root.as_bytes());
    let mut okm = [0u8; Dek::LEN];
    hk.expand(&info, &mut okm)
        .map_err(|e| CoreError::EncryptionFailed(format!("hkdf expand: {e}")))?;
    Ok(Dek::from_bytes(okm))
}

fn dek_info(video_id: &VideoId, rendition: &RenditionName, index: SegmentIndex) -> Vec<u8> {
    let video = video_id.as_str().as_bytes();
    let rendition = rendition.as_str().as_bytes();

    let mut info = Vec::with_capacity(DEK_INFO_LABEL.len() + 12 + video.len() + rendition.len());
    info.extend_from_slice(DEK_INFO_LABEL);
    info.extend_from_slice(&(video.len() as u32).to_be_bytes());
    info.extend_from_slice(video);
    info.extend_from_slice(&(rendition.len() as u32).to_be_bytes());
    info.extend_from_slice(rendition);
    info.extend_from_slice(&index.get().to_be_bytes());
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn coords(video: &str, rendition: &str) -> (VideoId, RenditionName) {
        (VideoId::new(video).unwrap(), RenditionName::new(rendition).unwrap())
    }

    #[test]
    fn test_same_coordinates_same_key() {
        let root = RootSecret::from_bytes([0x42; 32]);
        let (video, rendition) = coords("v1", "720p");

        let k1 = derive_segment_dek(&root, &video, &rendition, SegmentIndex::media(5)).unwrap();
        let k2 = derive_segment_dek(&root, &video, &rendition, SegmentIndex::media(5)).unwrap();
        assert_eq!(k1, k2);
        assert_eq!(k1.as_bytes().len(), 16);

        let k6 = derive_segment_dek(&root, &video, &rendition, SegmentIndex::media(6)).unwrap();
        assert_ne!(k1, k6);
    }

    #[test]
    fn test_known_vector() {
        let root = RootSecret::from_bytes([0x42; 32]);
        let (video, rendition) = coords("v1", "720p");
        let dek = derive_segment_dek(&root, &video, &rendition, SegmentIndex::media(5)).unwrap();
        assert_eq!(hex::encode(dek.as_bytes()), "ed0498a983924fe1bcd063d80595464a");
    }

    #[test]
    fn test_length_prefix_prevents_concatenation_collision() {
        let root = RootSecret::generate();
        let (v_a, r_a) = coords("ab", "c");
        let (v_b, r_b) = coords("a", "bc");
        let idx = SegmentIndex::media(0);

        let ka = derive_segment_dek(&root, &v_a, &r_a, idx).unwrap();
        let kb = derive_segment_dek(&root, &v_b, &r_b, idx).unwrap();
        assert_ne!(ka, kb);
    }

    #[test]
    fn test_init_segment_rejected() {
        let root = RootSecret::generate();
        let (video, rendition) = coords("v1", "720p");
        let err = derive_segment_dek(&root, &video, &rendition, SegmentIndex::INIT).unwrap_err();
        assert!(matches!(err, CoreError::InitSegmentHasNoKey));
    }

    #[test]
    fn test_different_roots_differ() {
        let (video, rendition) = coords("v1", "720p");
        let idx = SegmentIndex::media(1);
        let k1 = derive_segment_dek(&RootSecret::generate(), &video, &rendition, idx).unwrap();
        let k2 = derive_segment_dek(&RootSecret::generate(), &video, &rendition, idx).unwrap();
        assert_ne!(k1, k2);
    }

    proptest! {
        #[test]
        fn derivation_is_deterministic(
            root in any::<[u8; 32]>(),
            video in "[a-z0-9-]{1,24}",
            rendition in "[0-9]{3,4}p",
            idx in 0u32..100_000,
        ) {
            let root = RootSecret::from_bytes(root);
            let (video, rendition) = coords(&video, &rendition);
            let index = SegmentIndex::media(idx);
            let a = derive_segment_dek(&root, &video, &rendition, index).unwrap();
            let b = derive_segment_dek(&root, &video, &rendition, index).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}

//! Golden vectors for segment DEK derivation.
//!
//! Any implementation that derives segment keys (server, player, offline
//! packager) must reproduce these DEKs byte for byte, or the keys it hands
//! out will not open the stored ciphertext.

use segvault_core::{derive_segment_dek, RenditionName, RootSecret, SegmentIndex, VideoId};

/// A golden DEK vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub root_secret: [u8; 32],
    pub video_id: &'static str,
    pub rendition: &'static str,
    pub index: u32,
    /// Expected DEK (hex).
    pub expected_dek: &'static str,
}

fn counting_root() -> [u8; 32] {
    let mut root = [0u8; 32];
    for (i, byte) in root.iter_mut().enumerate() {
        *byte = i as u8;
    }
    root
}

/// Get all golden vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "720p segment 5",
            root_secret: [0x42; 32],
            video_id: "v1",
            rendition: "720p",
            index: 5,
            expected_dek: "ed0498a983924fe1bcd063d80595464a",
        },
        GoldenVector {
            name: "720p segment 6",
            root_secret: [0x42; 32],
            video_id: "v1",
            rendition: "720p",
            index: 6,
            expected_dek: "e2c233c6097c8b104393f71175597a70",
        },
        GoldenVector {
            name: "480p segment 0",
            root_secret: [0x42; 32],
            video_id: "v1",
            rendition: "480p",
            index: 0,
            expected_dek: "5deb44345f98bfa9c6eae0a28b3b84ef",
        },
        GoldenVector {
            name: "counting root, long id",
            root_secret: counting_root(),
            video_id: "video-7f3a",
            rendition: "1080p",
            index: 1234,
            expected_dek: "de919d6f11853926b1849d48d63da88e",
        },
    ]
}

/// Derive the DEK a vector describes, as hex.
pub fn derive_vector(vector: &GoldenVector) -> String {
    let root = RootSecret::from_bytes(vector.root_secret);
    let video = VideoId::new(vector.video_id).expect("golden video id is valid");
    let rendition = RenditionName::new(vector.rendition).expect("golden rendition is valid");
    let dek = derive_segment_dek(&root, &video, &rendition, SegmentIndex::media(vector.index))
        .expect("golden vectors are media segments");
    hex::encode(dek.as_bytes())
}

/// Check every vector. Returns `(name, matches, actual_hex)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let actual = derive_vector(v);
            (v.name.to_string(), actual == v.expected_dek, actual)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_match() {
        for (name, matches, actual) in verify_all_vectors() {
            assert!(matches, "vector '{name}' derived {actual}");
        }
    }

    #[test]
    fn test_adjacent_segments_differ() {
        let vectors = all_vectors();
        assert_ne!(vectors[0].expected_dek, vectors[1].expected_dek);
        assert_ne!(derive_vector(&vectors[0]), derive_vector(&vectors[1]));
    }
}

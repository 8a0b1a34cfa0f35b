//! Proptest generators for property-based testing.

use std::collections::BTreeSet;

use proptest::prelude::*;

use segvault_core::{
    ChainId, Keypair, RenditionName, RootSecret, SegmentIndex, SegmentIv, VideoId,
};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a root secret.
pub fn root_secret() -> impl Strategy<Value = RootSecret> {
    any::<[u8; 32]>().prop_map(RootSecret::from_bytes)
}

pub fn segment_iv() -> impl Strategy<Value = SegmentIv> {
    any::<[u8; 12]>().prop_map(SegmentIv::from_bytes)
}

/// Generate a video id.
pub fn video_id() -> impl Strategy<Value = VideoId> {
    "[a-z0-9][a-z0-9-]{0,63}".prop_map(|s| VideoId::new(s).expect("pattern is non-empty"))
}

/// Generate a rendition name such as `720p`.
pub fn rendition_name() -> impl Strategy<Value = RenditionName> {
    prop_oneof![
        Just("240p".to_string()),
        Just("480p".to_string()),
        Just("720p".to_string()),
        Just("1080p".to_string()),
        "[a-z0-9]{1,16}",
    ]
    .prop_map(|s| RenditionName::new(s).expect("pattern is non-empty"))
}

pub fn chain_id() -> impl Strategy<Value = ChainId> {
    prop_oneof![Just("sui:mainnet"), Just("sui:testnet"), Just("evm:8453")]
        .prop_map(|s| ChainId::new(s).expect("constant is valid"))
}

/// Generate a media segment index.
pub fn media_index() -> impl Strategy<Value = SegmentIndex> {
    (0u32..100_000).prop_map(SegmentIndex::media)
}

/// Generate a set of paid segment indices below `max`.
pub fn paid_segments(max: u32) -> impl Strategy<Value = BTreeSet<u32>> {
    prop::collection::btree_set(0..max, 0..=max as usize)
}

/// Generate segment plaintext up to `max_len` bytes.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Coordinates of one media segment.
#[derive(Debug, Clone)]
pub struct SegmentParams {
    pub video_id: VideoId,
    pub rendition: RenditionName,
    pub index: SegmentIndex,
}

impl Arbitrary for SegmentParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (video_id(), rendition_name(), media_index())
            .prop_map(|(video_id, rendition, index)| SegmentParams {
                video_id,
                rendition,
                index,
            })
            .boxed()
    }
}

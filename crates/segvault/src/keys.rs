//! Segment key resolution.
//!
//! A segment's DEK is either re-derived from the video's root secret or,
//! for legacy rows, opened from its stored envelope. Both go through the
//! master key, so every failure here is a data-integrity incident.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::error;

use segvault_core::{
    derive_segment_dek, Dek, EnvelopeStore, MasterKeyProvider, RootSecret, SegmentIv,
};
use segvault_store::{KeySource, Segment, Video};

use crate::error::{Result, ServiceError};

pub type Envelopes = EnvelopeStore<Arc<dyn MasterKeyProvider>>;

/// A lazily opened root secret.
///
/// Opened at most once, so a batch or a session pays for one KMS call.
#[derive(Default)]
pub struct RootSecretCell(OnceCell<RootSecret>);

impl RootSecretCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, envelopes: &Envelopes, video: &Video) -> Result<&RootSecret> {
        self.0
            .get_or_try_init(|| async {
                let sealed = video.root_secret_enc.as_deref().ok_or_else(|| {
                    ServiceError::NotFound(format!("video {} has no DEK root secret", video.id))
                })?;
                envelopes.decrypt_root_secret(sealed).await.map_err(|e| {
                    error!(
                        video_id = %video.id,
                        incident = "data_integrity",
                        error = %e,
                        "root secret envelope failed to open"
                    );
                    ServiceError::from(e)
                })
            })
            .await
    }
}

/// The DEK and IV of one encrypted segment.
pub async fn resolve_segment_key(
    envelopes: &Envelopes,
    root: &RootSecretCell,
    video: &Video,
    segment: &Segment,
) -> Result<(Dek, SegmentIv)> {
    let Some(iv) = segment.iv else {
        return Err(ServiceError::InvalidRequest(format!(
            "segment {} is not encrypted",
            segment.index
        )));
    };

    let dek = match &segment.key_source {
        KeySource::Derived => {
            let root = root.get(envelopes, video).await?;
            derive_segment_dek(root, &segment.video_id, &segment.rendition, segment.index)?
        }
        KeySource::Stored(sealed) => envelopes.decrypt_dek(sealed).await.map_err(|e| {
            error!(
                video_id = %segment.video_id,
                rendition = %segment.rendition,
                seg_idx = %segment.index,
                incident = "data_integrity",
                error = %e,
                "stored DEK envelope failed to open"
            );
            ServiceError::from(e)
        })?,
    };
    Ok((dek, iv))
}

#[cfg(test)]
mod tests {
    use super::*;
    use segvault_core::{
        BlobId, EncryptionMode, LocalMasterKey, RenditionName, Scheme, SegmentIndex, VideoId,
    };

    fn envelopes() -> Envelopes {
        let kms: Arc<dyn MasterKeyProvider> = Arc::new(LocalMasterKey::new("mk", [7; 32]));
        EnvelopeStore::new(kms)
    }

    fn video(root_secret_enc: Option<Vec<u8>>) -> Video {
        Video {
            id: VideoId::new("v1").unwrap(),
            root_secret_enc,
            sealed_root: None,
            duration_ms: 10_000,
            mode: EncryptionMode::Dek,
            channel: None,
            created_at: 0,
        }
    }

    fn segment(index: i64, key_source: KeySource) -> Segment {
        Segment {
            video_id: VideoId::new("v1").unwrap(),
            scheme: Scheme::Dek,
            rendition: RenditionName::new("720p").unwrap(),
            index: SegmentIndex::new(index).unwrap(),
            blob_id: BlobId::new("b").unwrap(),
            iv: Some(SegmentIv::from_bytes([1; 12])),
            size: 0,
            key_source,
        }
    }

    #[tokio::test]
    async fn test_derived_key_matches_direct_derivation() {
        let envelopes = envelopes();
        let (secret, sealed) = envelopes.generate_root_secret().await.unwrap();
        let video = video(Some(sealed));
        let cell = RootSecretCell::new();

        let derived = segment(5, KeySource::Derived);
        let (dek, iv) = resolve_segment_key(&envelopes, &cell, &video, &derived)
            .await
            .unwrap();
        let expected = derive_segment_dek(
            &secret,
            &video.id,
            &RenditionName::new("720p").unwrap(),
            SegmentIndex::new(5).unwrap(),
        )
        .unwrap();
        assert_eq!(dek, expected);
        assert_eq!(iv, SegmentIv::from_bytes([1; 12]));
    }

    #[tokio::test]
    async fn test_stored_key_needs_no_root_secret() {
        let envelopes = envelopes();
        let dek = Dek::generate();
        let sealed = envelopes.encrypt_dek(&dek).await.unwrap();

        let (resolved, _) = resolve_segment_key(
            &envelopes,
            &RootSecretCell::new(),
            &video(None),
            &segment(0, KeySource::Stored(sealed)),
        )
        .await
        .unwrap();
        assert_eq!(resolved, dek);
    }

    #[tokio::test]
    async fn test_corrupt_envelope_is_crypto_failure() {
        let envelopes = envelopes();
        let result = resolve_segment_key(
            &envelopes,
            &RootSecretCell::new(),
            &video(Some(b"garbage".to_vec())),
            &segment(0, KeySource::Derived),
        )
        .await;
        assert!(matches!(result, Err(ServiceError::Crypto(_))));
    }

    #[tokio::test]
    async fn test_plaintext_segment_has_no_key() {
        let mut init = segment(-1, KeySource::Derived);
        init.iv = None;
        let result =
            resolve_segment_key(&envelopes(), &RootSecretCell::new(), &video(None), &init).await;
        assert!(matches!(result, Err(ServiceError::InvalidRequest(_))));
    }
}

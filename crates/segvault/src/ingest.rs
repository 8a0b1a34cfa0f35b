//! Ingest of transcoder output.
//!
//! The root secret is generated and sealed before any segment is written,
//! so plaintext key material never reaches storage. Each media segment is
//! encrypted under its derived DEK with a fresh IV; the init segment is
//! stored as-is because decoders must read it before any key arrives.

use std::sync::Arc;

use bytes::Bytes;
use tracing::info;

use segvault_core::{
    derive_segment_dek, now_millis, ChannelId, Dek, EncryptionMode, EnvelopeStore,
    MasterKeyProvider, RenditionName, RootSecret, Scheme, SegmentIndex, SegmentIv, VideoId,
};
use segvault_seal::{channel_identity, KeyServerInfo, SealedObject};
use segvault_store::{BlobStore, InsertResult, KeySource, Rendition, Segment, Store, Video};

use crate::error::{Result, ServiceError};
use crate::keys::Envelopes;

/// One rendition as produced by the transcoder.
#[derive(Debug, Clone)]
pub struct RenditionInput {
    pub name: RenditionName,
    pub bitrate: u32,
    pub width: u32,
    pub height: u32,
    /// Container metadata segment (index -1).
    pub init: Bytes,
    /// Media segments in playback order (index 0..).
    pub segments: Vec<Bytes>,
}

/// A video ready for ingest.
#[derive(Debug, Clone)]
pub struct VideoInput {
    pub id: VideoId,
    pub duration_ms: u64,
    pub mode: EncryptionMode,
    /// Creator channel; required when the mode includes the seal scheme.
    pub channel: Option<ChannelId>,
    pub renditions: Vec<RenditionInput>,
}

/// Key servers a sealed root secret is split across.
#[derive(Debug, Clone)]
pub struct SealTarget {
    pub servers: Vec<KeyServerInfo>,
    pub threshold: u8,
}

/// How new segments get their keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStrategy {
    /// Derive from the root secret on demand.
    #[default]
    Derived,
    /// Random DEK per segment, stored under the master key.
    Stored,
}

/// Summary of an ingest.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub video: Video,
    pub segments: usize,
    pub bytes: u64,
}

pub struct Ingestor {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    envelopes: Envelopes,
    seal: Option<SealTarget>,
    strategy: KeyStrategy,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        kms: Arc<dyn MasterKeyProvider>,
    ) -> Self {
        Self {
            store,
            blobs,
            envelopes: EnvelopeStore::new(kms),
            seal: None,
            strategy: KeyStrategy::Derived,
        }
    }

    /// Enable the threshold scheme.
    pub fn with_seal_target(mut self, target: SealTarget) -> Self {
        self.seal = Some(target);
        self
    }

    pub fn with_key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Encrypt and store a video under its mode. A video is ingested once.
    pub async fn ingest(&self, input: VideoInput) -> Result<IngestReport> {
        if self.store.get_video(&input.id).await?.is_some() {
            return Err(ServiceError::InvalidRequest(format!(
                "video {} already ingested",
                input.id
            )));
        }

        let dek_root = if input.mode.supports(Scheme::Dek) {
            Some(self.envelopes.generate_root_secret().await?)
        } else {
            None
        };
        let seal_root = if input.mode.supports(Scheme::Seal) {
            Some(self.seal_root_secret(&input).await?)
        } else {
            None
        };

        let video = Video {
            id: input.id.clone(),
            root_secret_enc: dek_root.as_ref().map(|(_, sealed)| sealed.clone()),
            sealed_root: seal_root.as_ref().map(|(_, sealed)| sealed.clone()),
            duration_ms: input.duration_ms,
            mode: input.mode,
            channel: input.channel.clone(),
            created_at: now_millis(),
        };
        if self.store.insert_video(&video).await? == InsertResult::AlreadyExists {
            return Err(ServiceError::InvalidRequest(format!(
                "video {} already ingested",
                video.id
            )));
        }

        let mut report = IngestReport {
            video,
            segments: 0,
            bytes: 0,
        };
        let roots = [
            (Scheme::Dek, dek_root.as_ref().map(|(root, _)| root)),
            (Scheme::Seal, seal_root.as_ref().map(|(root, _)| root)),
        ];
        for (scheme, root) in roots {
            let Some(root) = root else { continue };
            for rendition in &input.renditions {
                self.ingest_rendition(&input.id, scheme, root, rendition, &mut report)
                    .await?;
            }
        }

        info!(
            video_id = %input.id,
            mode = input.mode.as_str(),
            segments = report.segments,
            bytes = report.bytes,
            "video ingested"
        );
        Ok(report)
    }

    async fn seal_root_secret(&self, input: &VideoInput) -> Result<(RootSecret, Vec<u8>)> {
        let target = self.seal.as_ref().ok_or_else(|| {
            ServiceError::InvalidRequest("no threshold key servers configured".into())
        })?;
        let channel = input.channel.as_ref().ok_or_else(|| {
            ServiceError::InvalidRequest("subscription mode needs a creator channel".into())
        })?;
        let config = self
            .store
            .get_creator_config(channel)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("creator channel {channel}")))?;

        let root = RootSecret::generate();
        let sealed = SealedObject::seal(
            root.as_bytes(),
            config.package_id,
            channel_identity(channel),
            &target.servers,
            target.threshold,
        )?;
        Ok((root, sealed.to_bytes()?))
    }

    async fn ingest_rendition(
        &self,
        video_id: &VideoId,
        scheme: Scheme,
        root: &RootSecret,
        input: &RenditionInput,
        report: &mut IngestReport,
    ) -> Result<()> {
        self.store
            .put_rendition(&Rendition {
                video_id: video_id.clone(),
                scheme,
                name: input.name.clone(),
                bitrate: input.bitrate,
                width: input.width,
                height: input.height,
            })
            .await?;

        let init_blob = self.blobs.put(input.init.clone()).await?;
        self.store
            .put_segment(&Segment {
                video_id: video_id.clone(),
                scheme,
                rendition: input.name.clone(),
                index: SegmentIndex::INIT,
                blob_id: init_blob,
                iv: None,
                size: input.init.len() as u64,
                key_source: KeySource::Derived,
            })
            .await?;
        report.segments += 1;
        report.bytes += input.init.len() as u64;

        for (i, plaintext) in input.segments.iter().enumerate() {
            let index = SegmentIndex::media(u32::try_from(i).map_err(|_| {
                ServiceError::InvalidRequest("too many segments in rendition".into())
            })?);

            // Legacy stored keys are only produced for the DEK scheme; sealed
            // content must stay derivable from the threshold root alone.
            let (dek, key_source) = match (self.strategy, scheme) {
                (KeyStrategy::Stored, Scheme::Dek) => {
                    let dek = Dek::generate();
                    let sealed = self.envelopes.encrypt_dek(&dek).await?;
                    (dek, KeySource::Stored(sealed))
                }
                _ => (
                    derive_segment_dek(root, video_id, &input.name, index)?,
                    KeySource::Derived,
                ),
            };

            let iv = SegmentIv::generate();
            let ciphertext = Bytes::from(dek.encrypt_segment(plaintext, &iv)?);
            let size = ciphertext.len() as u64;
            let blob_id = self.blobs.put(ciphertext).await?;
            self.store
                .put_segment(&Segment {
                    video_id: video_id.clone(),
                    scheme,
                    rendition: input.name.clone(),
                    index,
                    blob_id,
                    iv: Some(iv),
                    size,
                    key_source,
                })
                .await?;
            report.segments += 1;
            report.bytes += size;
        }
        Ok(())
    }
}

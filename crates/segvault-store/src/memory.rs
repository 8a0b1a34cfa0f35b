//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use segvault_core::{
    ChainId, ChannelId, RenditionName, Scheme, SegmentIndex, VideoId, WalletAddress,
};

use crate::error::{Result, StoreError};
use crate::model::{AccessRecord, CreatorConfig, Rendition, Segment, Video};
use crate::traits::{InsertResult, Store};

type SegmentKey = (VideoId, Scheme, RenditionName);
type AccessKey = (VideoId, WalletAddress, ChainId);

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    videos: HashMap<VideoId, Video>,

    /// Renditions keyed by (video, scheme, name) for stable ordering.
    renditions: BTreeMap<SegmentKey, Rendition>,

    /// Segments per rendition, ordered by index.
    segments: HashMap<SegmentKey, BTreeMap<SegmentIndex, Segment>>,

    access: HashMap<AccessKey, AccessRecord>,

    creators: HashMap<ChannelId, CreatorConfig>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Task(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Task(format!("lock poisoned: {e}")))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_video(&self, video: &Video) -> Result<InsertResult> {
        let mut inner = self.write()?;
        if inner.videos.contains_key(&video.id) {
            return Ok(InsertResult::AlreadyExists);
        }
        inner.videos.insert(video.id.clone(), video.clone());
        Ok(InsertResult::Inserted)
    }

    async fn get_video(&self, id: &VideoId) -> Result<Option<Video>> {
        Ok(self.read()?.videos.get(id).cloned())
    }

    async fn put_rendition(&self, rendition: &Rendition) -> Result<()> {
        let mut inner = self.write()?;
        if !inner.videos.contains_key(&rendition.video_id) {
            return Err(StoreError::NotFound(format!("video {}", rendition.video_id)));
        }
        let key = (
            rendition.video_id.clone(),
            rendition.scheme,
            rendition.name.clone(),
        );
        inner.renditions.insert(key, rendition.clone());
        Ok(())
    }

    async fn list_renditions(&self, video_id: &VideoId) -> Result<Vec<Rendition>> {
        let inner = self.read()?;
        Ok(inner
            .renditions
            .iter()
            .filter(|((v, _, _), _)| v == video_id)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn put_segment(&self, segment: &Segment) -> Result<()> {
        let mut inner = self.write()?;
        let key = (
            segment.video_id.clone(),
            segment.scheme,
            segment.rendition.clone(),
        );
        if !inner.renditions.contains_key(&key) {
            return Err(StoreError::NotFound(format!(
                "rendition {}/{}/{}",
                segment.video_id, segment.scheme, segment.rendition
            )));
        }
        inner
            .segments
            .entry(key)
            .or_default()
            .insert(segment.index, segment.clone());
        Ok(())
    }

    async fn get_segment(
        &self,
        video_id: &VideoId,
        scheme: Scheme,
        rendition: &RenditionName,
        index: SegmentIndex,
    ) -> Result<Option<Segment>> {
        let inner = self.read()?;
        let key = (video_id.clone(), scheme, rendition.clone());
        Ok(inner
            .segments
            .get(&key)
            .and_then(|segs| segs.get(&index))
            .cloned())
    }

    async fn list_segments(
        &self,
        video_id: &VideoId,
        scheme: Scheme,
        rendition: &RenditionName,
    ) -> Result<Vec<Segment>> {
        let inner = self.read()?;
        let key = (video_id.clone(), scheme, rendition.clone());
        Ok(inner
            .segments
            .get(&key)
            .map(|segs| segs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn upsert_access_record(&self, record: &AccessRecord) -> Result<AccessRecord> {
        let mut inner = self.write()?;
        let key = (
            record.video_id.clone(),
            record.payer.clone(),
            record.chain.clone(),
        );
        let stored = inner
            .access
            .entry(key)
            .and_modify(|existing| existing.extend(record))
            .or_insert_with(|| record.clone());
        Ok(stored.clone())
    }

    async fn get_access_record(
        &self,
        video_id: &VideoId,
        payer: &WalletAddress,
        chain: &ChainId,
    ) -> Result<Option<AccessRecord>> {
        let inner = self.read()?;
        let key = (video_id.clone(), payer.clone(), chain.clone());
        Ok(inner.access.get(&key).cloned())
    }

    async fn put_creator_config(&self, config: &CreatorConfig) -> Result<()> {
        self.write()?
            .creators
            .insert(config.channel_id.clone(), config.clone());
        Ok(())
    }

    async fn get_creator_config(&self, channel_id: &ChannelId) -> Result<Option<CreatorConfig>> {
        Ok(self.read()?.creators.get(channel_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccessKind, KeySource};
    use segvault_core::{BlobId, EncryptionMode, SegmentIv};

    fn video(id: &str) -> Video {
        Video {
            id: VideoId::new(id).unwrap(),
            root_secret_enc: Some(vec![1, 2, 3]),
            sealed_root: None,
            duration_ms: 60_000,
            mode: EncryptionMode::Dek,
            channel: None,
            created_at: 1000,
        }
    }

    fn rendition(video: &str, name: &str) -> Rendition {
        Rendition {
            video_id: VideoId::new(video).unwrap(),
            scheme: Scheme::Dek,
            name: RenditionName::new(name).unwrap(),
            bitrate: 2500,
            width: 1280,
            height: 720,
        }
    }

    fn segment(video: &str, name: &str, index: SegmentIndex) -> Segment {
        Segment {
            video_id: VideoId::new(video).unwrap(),
            scheme: Scheme::Dek,
            rendition: RenditionName::new(name).unwrap(),
            index,
            blob_id: BlobId::new(format!("blob-{}", index.get())).unwrap(),
            iv: (!index.is_init()).then(SegmentIv::generate),
            size: 1024,
            key_source: KeySource::Derived,
        }
    }

    #[tokio::test]
    async fn test_video_is_immutable() {
        let store = MemoryStore::new();
        let v = video("v1");
        assert_eq!(store.insert_video(&v).await.unwrap(), InsertResult::Inserted);

        let mut replacement = v.clone();
        replacement.root_secret_enc = Some(vec![9, 9, 9]);
        assert_eq!(
            store.insert_video(&replacement).await.unwrap(),
            InsertResult::AlreadyExists
        );

        let stored = store.get_video(&v.id).await.unwrap().unwrap();
        assert_eq!(stored.root_secret_enc, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_segments_ordered_with_init_first() {
        let store = MemoryStore::new();
        store.insert_video(&video("v1")).await.unwrap();
        store.put_rendition(&rendition("v1", "720p")).await.unwrap();

        for idx in [SegmentIndex::media(2), SegmentIndex::INIT, SegmentIndex::media(0)] {
            store.put_segment(&segment("v1", "720p", idx)).await.unwrap();
        }

        let name = RenditionName::new("720p").unwrap();
        let segs = store
            .list_segments(&VideoId::new("v1").unwrap(), Scheme::Dek, &name)
            .await
            .unwrap();
        let indices: Vec<i32> = segs.iter().map(|s| s.index.get()).collect();
        assert_eq!(indices, vec![-1, 0, 2]);
        assert!(!segs[0].is_encrypted());
    }

    #[tokio::test]
    async fn test_segment_requires_rendition() {
        let store = MemoryStore::new();
        store.insert_video(&video("v1")).await.unwrap();
        let err = store
            .put_segment(&segment("v1", "1080p", SegmentIndex::media(0)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_access_record_union() {
        let store = MemoryStore::new();
        let record = AccessRecord {
            video_id: VideoId::new("v1").unwrap(),
            payer: WalletAddress::parse(&format!("0x{}", "bb".repeat(32))).unwrap(),
            chain: ChainId::new("sui:testnet").unwrap(),
            kind: AccessKind::Payment,
            paid_segments: [0, 1].into_iter().collect(),
            created_at: 1000,
        };
        store.upsert_access_record(&record).await.unwrap();

        let mut more = record.clone();
        more.paid_segments = [5].into_iter().collect();
        let merged = store.upsert_access_record(&more).await.unwrap();
        assert_eq!(merged.paid_segments, [0, 1, 5].into_iter().collect());

        let fetched = store
            .get_access_record(&record.video_id, &record.payer, &record.chain)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, merged);

        let other_chain = ChainId::new("sui:mainnet").unwrap();
        assert!(store
            .get_access_record(&record.video_id, &record.payer, &other_chain)
            .await
            .unwrap()
            .is_none());
    }
}

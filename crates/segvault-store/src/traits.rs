//! Store trait: the abstract interface for catalog and ledger persistence.
//!
//! Implementations include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use segvault_core::{
    ChainId, ChannelId, RenditionName, Scheme, SegmentIndex, VideoId, WalletAddress,
};

use crate::error::Result;
use crate::model::{AccessRecord, CreatorConfig, Rendition, Segment, Video};

/// Result of inserting an immutable row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Row was inserted.
    Inserted,
    /// A row with this key already exists; it was left untouched.
    AlreadyExists,
}

/// Async interface for persistence.
///
/// For SQLite, `spawn_blocking` is used internally to avoid blocking the
/// runtime.
///
/// # Design Notes
///
/// - **Immutable videos**: a video's root secret envelope is written once.
///   Inserting the same id again returns `AlreadyExists` without overwriting.
/// - **Monotone access records**: upserting an access record unions the
///   paid segment set with any existing record; segments are never removed.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Catalog
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_video(&self, video: &Video) -> Result<InsertResult>;

    async fn get_video(&self, id: &VideoId) -> Result<Option<Video>>;

    /// Insert or replace a rendition row.
    async fn put_rendition(&self, rendition: &Rendition) -> Result<()>;

    /// All renditions of a video, ordered by scheme then name.
    async fn list_renditions(&self, video_id: &VideoId) -> Result<Vec<Rendition>>;

    /// Insert or replace a segment row.
    async fn put_segment(&self, segment: &Segment) -> Result<()>;

    async fn get_segment(
        &self,
        video_id: &VideoId,
        scheme: Scheme,
        rendition: &RenditionName,
        index: SegmentIndex,
    ) -> Result<Option<Segment>>;

    /// Segments of one rendition, ordered by index (init first).
    async fn list_segments(
        &self,
        video_id: &VideoId,
        scheme: Scheme,
        rendition: &RenditionName,
    ) -> Result<Vec<Segment>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Ledger
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a record, or union its segments into the existing one.
    ///
    /// Returns the record as stored after the merge.
    async fn upsert_access_record(&self, record: &AccessRecord) -> Result<AccessRecord>;

    async fn get_access_record(
        &self,
        video_id: &VideoId,
        payer: &WalletAddress,
        chain: &ChainId,
    ) -> Result<Option<AccessRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Creator channels
    // ─────────────────────────────────────────────────────────────────────────

    async fn put_creator_config(&self, config: &CreatorConfig) -> Result<()>;

    async fn get_creator_config(&self, channel_id: &ChannelId) -> Result<Option<CreatorConfig>>;
}

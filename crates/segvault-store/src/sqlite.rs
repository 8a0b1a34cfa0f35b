//! SQLite implementation of the Store trait.
//!
//! The primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};

use segvault_core::{
    BlobId, ChainId, ChannelId, EncryptionMode, ObjectId, ObjectRef, RenditionName, Scheme,
    SegmentIndex, SegmentIv, VideoId, WalletAddress,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::model::{AccessKind, AccessRecord, CreatorConfig, KeySource, Rendition, Segment, Video};
use crate::traits::{InsertResult, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Task(format!("mutex poisoned: {e}")))?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {e}")))?
    }
}

fn to_cbor<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn from_cbor<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn parse_scheme(s: &str) -> Result<Scheme> {
    Ok(s.parse::<Scheme>()?)
}

fn row_to_video(row: &Row<'_>) -> Result<Video> {
    let mode: String = row.get("mode")?;
    let channel: Option<String> = row.get("channel_id")?;
    Ok(Video {
        id: VideoId::new(row.get::<_, String>("video_id")?)?,
        root_secret_enc: row.get("root_secret_enc")?,
        sealed_root: row.get("sealed_root")?,
        duration_ms: row.get::<_, i64>("duration_ms")? as u64,
        mode: mode.parse::<EncryptionMode>()?,
        channel: channel.map(ChannelId::new).transpose()?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_rendition(row: &Row<'_>) -> Result<Rendition> {
    Ok(Rendition {
        video_id: VideoId::new(row.get::<_, String>("video_id")?)?,
        scheme: parse_scheme(&row.get::<_, String>("scheme")?)?,
        name: RenditionName::new(row.get::<_, String>("name")?)?,
        bitrate: row.get("bitrate")?,
        width: row.get("width")?,
        height: row.get("height")?,
    })
}

fn row_to_segment(row: &Row<'_>) -> Result<Segment> {
    let iv: Option<Vec<u8>> = row.get("iv")?;
    let stored_dek: Option<Vec<u8>> = row.get("stored_dek")?;
    Ok(Segment {
        video_id: VideoId::new(row.get::<_, String>("video_id")?)?,
        scheme: parse_scheme(&row.get::<_, String>("scheme")?)?,
        rendition: RenditionName::new(row.get::<_, String>("rendition")?)?,
        index: SegmentIndex::new(row.get("seg_idx")?)?,
        blob_id: BlobId::new(row.get::<_, String>("blob_id")?)?,
        iv: iv.as_deref().map(SegmentIv::from_slice).transpose()?,
        size: row.get::<_, i64>("size")? as u64,
        key_source: match stored_dek {
            Some(envelope) => KeySource::Stored(envelope),
            None => KeySource::Derived,
        },
    })
}

fn row_to_access(row: &Row<'_>) -> Result<AccessRecord> {
    let kind: String = row.get("kind")?;
    let paid: Vec<u8> = row.get("paid_segments")?;
    Ok(AccessRecord {
        video_id: VideoId::new(row.get::<_, String>("video_id")?)?,
        payer: WalletAddress::parse(&row.get::<_, String>("payer")?)?,
        chain: ChainId::new(row.get::<_, String>("chain")?)?,
        kind: AccessKind::parse(&kind)
            .ok_or_else(|| StoreError::InvalidData(format!("unknown access kind: {kind}")))?,
        paid_segments: from_cbor::<BTreeSet<u32>>(&paid)?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_creator(row: &Row<'_>) -> Result<CreatorConfig> {
    let policy: Vec<u8> = row.get("policy_object")?;
    let package: Vec<u8> = row.get("package_id")?;
    let metadata: Vec<u8> = row.get("metadata")?;
    let package: [u8; 32] = package
        .try_into()
        .map_err(|_| StoreError::InvalidData("package_id must be 32 bytes".into()))?;
    Ok(CreatorConfig {
        channel_id: ChannelId::new(row.get::<_, String>("channel_id")?)?,
        policy_object: from_cbor::<ObjectRef>(&policy)?,
        package_id: ObjectId::from_bytes(package),
        fee: row.get::<_, i64>("fee")? as u64,
        metadata: from_cbor::<BTreeMap<String, String>>(&metadata)?,
    })
}

/// Collect all rows of a prepared query through a fallible converter.
fn collect_rows<T>(
    mut rows: rusqlite::Rows<'_>,
    convert: fn(&Row<'_>) -> Result<T>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(convert(row)?);
    }
    Ok(out)
}

const VIDEO_COLUMNS: &str =
    "video_id, root_secret_enc, sealed_root, duration_ms, mode, channel_id, created_at";
const SEGMENT_COLUMNS: &str =
    "video_id, scheme, rendition, seg_idx, blob_id, iv, size, stored_dek";

#[async_trait]
impl Store for SqliteStore {
    async fn insert_video(&self, video: &Video) -> Result<InsertResult> {
        let video = video.clone();
        self.blocking(move |conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO videos
                    (video_id, root_secret_enc, sealed_root, duration_ms, mode,
                     channel_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    video.id.as_str(),
                    video.root_secret_enc,
                    video.sealed_root,
                    video.duration_ms as i64,
                    video.mode.as_str(),
                    video.channel.as_ref().map(|c| c.as_str()),
                    video.created_at,
                ],
            )?;
            Ok(if changed == 0 {
                InsertResult::AlreadyExists
            } else {
                InsertResult::Inserted
            })
        })
        .await
    }

    async fn get_video(&self, id: &VideoId) -> Result<Option<Video>> {
        let id = id.clone();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VIDEO_COLUMNS} FROM videos WHERE video_id = ?1"
            ))?;
            let mut rows = stmt.query(params![id.as_str()])?;
            let found = rows.next()?.map(row_to_video).transpose();
            found
        })
        .await
    }

    async fn put_rendition(&self, rendition: &Rendition) -> Result<()> {
        let r = rendition.clone();
        self.blocking(move |conn| {
            let exists: Option<String> = conn
                .query_row(
                    "SELECT video_id FROM videos WHERE video_id = ?1",
                    params![r.video_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound(format!("video {}", r.video_id)));
            }
            conn.execute(
                "INSERT INTO renditions (video_id, scheme, name, bitrate, width, height)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(video_id, scheme, name) DO UPDATE SET
                    bitrate = excluded.bitrate,
                    width = excluded.width,
                    height = excluded.height",
                params![
                    r.video_id.as_str(),
                    r.scheme.as_str(),
                    r.name.as_str(),
                    r.bitrate,
                    r.width,
                    r.height,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_renditions(&self, video_id: &VideoId) -> Result<Vec<Rendition>> {
        let video_id = video_id.clone();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT video_id, scheme, name, bitrate, width, height
                 FROM renditions WHERE video_id = ?1 ORDER BY scheme, name",
            )?;
            let rows = stmt.query(params![video_id.as_str()])?;
            collect_rows(rows, row_to_rendition)
        })
        .await
    }

    async fn put_segment(&self, segment: &Segment) -> Result<()> {
        let s = segment.clone();
        self.blocking(move |conn| {
            let exists: Option<String> = conn
                .query_row(
                    "SELECT name FROM renditions WHERE video_id = ?1 AND scheme = ?2 AND name = ?3",
                    params![s.video_id.as_str(), s.scheme.as_str(), s.rendition.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound(format!(
                    "rendition {}/{}/{}",
                    s.video_id, s.scheme, s.rendition
                )));
            }
            let stored_dek = match &s.key_source {
                KeySource::Derived => None,
                KeySource::Stored(envelope) => Some(envelope.clone()),
            };
            conn.execute(
                "INSERT OR REPLACE INTO segments
                    (video_id, scheme, rendition, seg_idx, blob_id, iv, size, stored_dek)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    s.video_id.as_str(),
                    s.scheme.as_str(),
                    s.rendition.as_str(),
                    s.index.get(),
                    s.blob_id.as_str(),
                    s.iv.as_ref().map(|iv| iv.as_bytes().to_vec()),
                    s.size as i64,
                    stored_dek,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_segment(
        &self,
        video_id: &VideoId,
        scheme: Scheme,
        rendition: &RenditionName,
        index: SegmentIndex,
    ) -> Result<Option<Segment>> {
        let video_id = video_id.clone();
        let rendition = rendition.clone();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SEGMENT_COLUMNS} FROM segments
                 WHERE video_id = ?1 AND scheme = ?2 AND rendition = ?3 AND seg_idx = ?4"
            ))?;
            let mut rows = stmt.query(params![
                video_id.as_str(),
                scheme.as_str(),
                rendition.as_str(),
                index.get()
            ])?;
            let found = rows.next()?.map(row_to_segment).transpose();
            found
        })
        .await
    }

    async fn list_segments(
        &self,
        video_id: &VideoId,
        scheme: Scheme,
        rendition: &RenditionName,
    ) -> Result<Vec<Segment>> {
        let video_id = video_id.clone();
        let rendition = rendition.clone();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SEGMENT_COLUMNS} FROM segments
                 WHERE video_id = ?1 AND scheme = ?2 AND rendition = ?3
                 ORDER BY seg_idx"
            ))?;
            let rows = stmt.query(params![video_id.as_str(), scheme.as_str(), rendition.as_str()])?;
            collect_rows(rows, row_to_segment)
        })
        .await
    }

    async fn upsert_access_record(&self, record: &AccessRecord) -> Result<AccessRecord> {
        let record = record.clone();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            let existing = {
                let mut stmt = tx.prepare(
                    "SELECT video_id, payer, chain, kind, paid_segments, created_at
                     FROM access_records WHERE video_id = ?1 AND payer = ?2 AND chain = ?3",
                )?;
                let mut rows = stmt.query(params![
                    record.video_id.as_str(),
                    record.payer.as_str(),
                    record.chain.as_str()
                ])?;
                let found = rows.next()?.map(row_to_access).transpose()?;
                found
            };

            let merged = match existing {
                Some(mut stored) => {
                    stored.extend(&record);
                    stored
                }
                None => record.clone(),
            };

            tx.execute(
                "INSERT INTO access_records
                    (video_id, payer, chain, kind, paid_segments, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(video_id, payer, chain) DO UPDATE SET
                    paid_segments = excluded.paid_segments,
                    updated_at = excluded.updated_at",
                params![
                    merged.video_id.as_str(),
                    merged.payer.as_str(),
                    merged.chain.as_str(),
                    merged.kind.as_str(),
                    to_cbor(&merged.paid_segments)?,
                    merged.created_at,
                    segvault_core::now_millis(),
                ],
            )?;
            tx.commit()?;
            Ok(merged)
        })
        .await
    }

    async fn get_access_record(
        &self,
        video_id: &VideoId,
        payer: &WalletAddress,
        chain: &ChainId,
    ) -> Result<Option<AccessRecord>> {
        let video_id = video_id.clone();
        let payer = payer.clone();
        let chain = chain.clone();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT video_id, payer, chain, kind, paid_segments, created_at
                 FROM access_records WHERE video_id = ?1 AND payer = ?2 AND chain = ?3",
            )?;
            let mut rows = stmt.query(params![video_id.as_str(), payer.as_str(), chain.as_str()])?;
            let found = rows.next()?.map(row_to_access).transpose();
            found
        })
        .await
    }

    async fn put_creator_config(&self, config: &CreatorConfig) -> Result<()> {
        let c = config.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO creator_configs
                    (channel_id, policy_object, package_id, fee, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    c.channel_id.as_str(),
                    to_cbor(&c.policy_object)?,
                    c.package_id.as_bytes().to_vec(),
                    c.fee as i64,
                    to_cbor(&c.metadata)?,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_creator_config(&self, channel_id: &ChannelId) -> Result<Option<CreatorConfig>> {
        let channel_id = channel_id.clone();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT channel_id, policy_object, package_id, fee, metadata
                 FROM creator_configs WHERE channel_id = ?1",
            )?;
            let mut rows = stmt.query(params![channel_id.as_str()])?;
            let found = rows.next()?.map(row_to_creator).transpose();
            found
        })
        .await
    }
}

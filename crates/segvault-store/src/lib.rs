//! # Segvault Store
//!
//! Persistence for the segvault catalog and payment ledger, plus the blob
//! storage seam that holds segment ciphertext.
//!
//! ## Key Types
//!
//! - [`Store`] - async trait for catalog, ledger and creator-channel rows
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - in-memory storage for tests
//! - [`BlobStore`] - content-addressed blob storage ([`MemoryBlobStore`], [`FsBlobStore`])
//!
//! ## Design Notes
//!
//! - **Immutable videos**: re-inserting a video returns `AlreadyExists`.
//! - **Monotone ledger**: access records are unioned on upsert, never shrunk.
//! - **Two key sources**: a segment's DEK is either derived on demand or,
//!   for legacy rows, stored as an envelope ([`KeySource`]).

pub mod blob;
pub mod error;
pub mod memory;
pub mod migration;
pub mod model;
pub mod sqlite;
pub mod traits;

pub use blob::{blob_id_for, BlobStore, FsBlobStore, MemoryBlobStore};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use model::{AccessKind, AccessRecord, CreatorConfig, KeySource, Rendition, Segment, Video};
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, Store};

//! # Segvault
//!
//! Pay-per-segment video delivery. Every media segment is encrypted under
//! its own key; a viewer receives a segment's key only after proving wallet
//! ownership and only if their payment covers that segment.
//!
//! ## Overview
//!
//! - [`Ingestor`] encrypts transcoder output and seals each video's root secret
//! - [`KeyService`] runs the session exchange and releases wrapped keys
//!   through the access gate, one at a time or in batches
//! - [`Playback`] is the viewer side: handshake, unwrap, decrypt
//! - [`DecryptionPool`] decrypts segments on worker threads
//!
//! Subscription content takes the threshold path instead: the service hands
//! out the sealed root secret and an approval proof, and the viewer recovers
//! the root from the key servers (see [`seal`]).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use segvault::{DecryptionPool, KeyService, PipelineConfig, Playback, ServiceConfig};
//! use segvault::core::{ChainId, Keypair, LocalMasterKey, RenditionName, SegmentIndex, VideoId};
//! use segvault::store::{MemoryBlobStore, MemoryStore};
//!
//! async fn example() -> segvault::Result<()> {
//!     let service = Arc::new(KeyService::new(
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(MemoryBlobStore::new()),
//!         Arc::new(LocalMasterKey::generate("local")),
//!         ServiceConfig::default(),
//!     ));
//!     let pool = Arc::new(DecryptionPool::new(&PipelineConfig::default())?);
//!
//!     let wallet = Keypair::generate();
//!     let playback = Playback::start(
//!         service,
//!         pool,
//!         VideoId::new("v1")?,
//!         &wallet,
//!         ChainId::new("sui:mainnet")?,
//!     )
//!     .await?;
//!     let rendition = RenditionName::new("720p")?;
//!     let _init = playback.play_segment(&rendition, SegmentIndex::INIT).await?;
//!     let _first = playback.play_segment(&rendition, SegmentIndex::media(0)).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `segvault::core` - identifiers, segment AEAD, key derivation, envelopes
//! - `segvault::store` - catalog, ledger and blob storage
//! - `segvault::session` - ephemeral key exchange and session store
//! - `segvault::access` - wallet authentication and payment gate
//! - `segvault::seal` - threshold encryption for subscriptions

pub mod client;
pub mod config;
pub mod error;
pub mod ingest;
pub mod keys;
pub mod pipeline;
pub mod request;
pub mod service;

pub use segvault_access as access;
pub use segvault_core as core;
pub use segvault_seal as seal;
pub use segvault_session as session;
pub use segvault_store as store;

pub use client::Playback;
pub use config::{BatchLimits, PipelineConfig, ServiceConfig};
pub use error::{Result, ServiceError, UserAction};
pub use ingest::{IngestReport, Ingestor, KeyStrategy, RenditionInput, SealTarget, VideoInput};
pub use keys::{resolve_segment_key, RootSecretCell};
pub use pipeline::{DecryptionPool, PoolStats};
pub use request::{BatchKeyRequest, KeyCoordRequest, PrefetchRequest};
pub use service::{
    select_scheme, BatchItem, DeliveredKey, DeliveryMode, KeyMaterial, KeyService,
    RequestIdentity, SealApproval, SegmentPayload,
};

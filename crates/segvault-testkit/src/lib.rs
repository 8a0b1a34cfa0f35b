//! # Segvault Testkit
//!
//! Testing utilities for segvault.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: known segment DEKs for cross-implementation checks
//! - **Generators**: proptest strategies for identifiers, secrets and payloads
//! - **Fixtures**: an in-memory deployment and a local threshold network
//!
//! ## Golden Vectors
//!
//! ```rust
//! use segvault_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, dek) in verify_all_vectors() {
//!     assert!(matches, "{name}: {dek}");
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use segvault_testkit::fixtures::{sample_video, TestFixture};
//! use segvault::core::EncryptionMode;
//!
//! async fn example() {
//!     let fixture = TestFixture::new();
//!     fixture.ingest(sample_video("v1", EncryptionMode::Dek, &["720p"], 4)).await;
//!     fixture.pay("v1", &[0, 1]).await;
//!     let playback = fixture.playback("v1").await.unwrap();
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{
    init_segment, sample_video, segment_plaintext, FixtureOptions, SealFixture, TestFixture,
    TEST_CHAIN,
};
pub use generators::SegmentParams;
pub use vectors::{all_vectors, derive_vector, verify_all_vectors, GoldenVector};

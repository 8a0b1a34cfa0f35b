//! End-to-end playback scenarios against an in-memory deployment.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use segvault::access::{AuthFailure, Denial};
use segvault::core::{
    ChainId, ChannelId, EncryptionMode, Keypair, RenditionName, Scheme, SegmentIndex, VideoId,
    WalletAddress,
};
use segvault::seal::PolicyOracle;
use segvault::session::{wrap_aad, ClientHandshake, SessionConfig};
use segvault::store::{
    AccessRecord, BlobStore, CreatorConfig, InsertResult, KeySource, MemoryStore, Rendition,
    Result as StoreResult, Segment, Store, Video,
};
use segvault::{
    BatchKeyRequest, DeliveryMode, KeyMaterial, KeyService, KeyStrategy, PrefetchRequest,
    ServiceConfig, ServiceError, UserAction,
};
use segvault_testkit::{
    init_segment, sample_video, segment_plaintext, FixtureOptions, SealFixture, TestFixture,
};

fn r720() -> RenditionName {
    RenditionName::new("720p").unwrap()
}

fn vid(id: &str) -> VideoId {
    VideoId::new(id).unwrap()
}

async fn dek_fixture(segments: u32) -> TestFixture {
    let fixture = TestFixture::new();
    fixture
        .ingest(sample_video("v1", EncryptionMode::Dek, &["720p"], segments))
        .await;
    fixture
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment gating
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn paid_segments_play_and_unpaid_are_refused() {
    let fixture = dek_fixture(5).await;
    fixture.pay("v1", &[0, 1, 2]).await;
    let playback = fixture.playback("v1").await.unwrap();

    for i in 0..3 {
        let plaintext = playback
            .play_segment(&r720(), SegmentIndex::media(i))
            .await
            .unwrap();
        assert_eq!(plaintext, segment_plaintext("720p", i));
    }

    let err = playback
        .play_segment(&r720(), SegmentIndex::media(3))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Authorization(Denial::SegmentNotCovered)));
    assert_eq!(err.status_code(), 401);
}

#[tokio::test]
async fn init_segment_plays_without_payment() {
    let fixture = dek_fixture(2).await;
    let playback = fixture.playback("v1").await.unwrap();
    let init = playback
        .play_segment(&r720(), SegmentIndex::INIT)
        .await
        .unwrap();
    assert_eq!(init, init_segment("720p"));
}

#[tokio::test]
async fn viewer_without_record_needs_payment() {
    let fixture = dek_fixture(2).await;
    let playback = fixture.playback("v1").await.unwrap();
    let err = playback
        .segment_key(&r720(), SegmentIndex::media(0))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Authorization(Denial::PaymentRequired)));
    assert_eq!(err.code(), "payment_required");
}

#[tokio::test]
async fn payments_only_grow() {
    let fixture = dek_fixture(4).await;
    fixture.pay("v1", &[0, 1]).await;
    let merged = fixture.pay("v1", &[3]).await;
    assert_eq!(merged.paid_segments.into_iter().collect::<Vec<_>>(), vec![0, 1, 3]);

    let playback = fixture.playback("v1").await.unwrap();
    let status = fixture
        .service
        .check_payment(&vid("v1"), playback.identity())
        .await
        .unwrap();
    assert!(status.has_paid);
    assert_eq!(
        status.paid_segments.unwrap().into_iter().collect::<Vec<_>>(),
        vec![0, 1, 3]
    );
}

#[tokio::test]
async fn forged_identity_is_unauthenticated() {
    let fixture = dek_fixture(2).await;
    fixture.pay("v1", &[0, 1]).await;
    let playback = fixture.playback("v1").await.unwrap();

    // Another wallet's key claiming the paying address.
    let mut identity = playback.identity().clone();
    identity.wallet.public_key = Some(Keypair::generate().public_key());

    let err = fixture
        .service
        .get_key(&vid("v1"), "720p", 0, &identity, DeliveryMode::Wrapped)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Authentication(AuthFailure::AddressMismatch)
    ));
    assert_eq!(err.client_message(), "authentication required");
}

// ─────────────────────────────────────────────────────────────────────────────
// Key wrapping
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn wrapped_key_is_bound_to_its_segment() {
    let fixture = dek_fixture(3).await;
    fixture.pay("v1", &[0, 1]).await;

    let handshake = ClientHandshake::generate();
    let hello = fixture
        .service
        .start_session(&vid("v1"), handshake.public_key())
        .await
        .unwrap();
    let kek = handshake.complete(&hello).unwrap();
    let identity = fixture.identity(hello.session_id);

    let key = fixture
        .service
        .get_key(&vid("v1"), "720p", 0, &identity, DeliveryMode::Wrapped)
        .await
        .unwrap();
    let KeyMaterial::Wrapped(wrapped) = &key.material else {
        panic!("canonical delivery must be wrapped");
    };

    let right = wrap_aad(&hello.session_id, &vid("v1"), &r720(), SegmentIndex::media(0));
    let wrong = wrap_aad(&hello.session_id, &vid("v1"), &r720(), SegmentIndex::media(1));
    let dek = kek.unwrap_dek(wrapped, &right).unwrap();
    assert!(kek.unwrap_dek(wrapped, &wrong).is_err());

    let payload = fixture
        .service
        .fetch_segment(&vid("v1"), Scheme::Dek, "720p", 0)
        .await
        .unwrap();
    assert_eq!(payload.iv, Some(key.iv));
    let plaintext = dek.decrypt_segment(&payload.bytes, &key.iv).unwrap();
    assert_eq!(Bytes::from(plaintext), segment_plaintext("720p", 0));
}

#[tokio::test]
async fn direct_delivery_returns_raw_dek_when_allowed() {
    let fixture = dek_fixture(1).await;
    fixture.pay("v1", &[0]).await;
    let playback = fixture.playback("v1").await.unwrap();

    let key = fixture
        .service
        .get_key(&vid("v1"), "720p", 0, playback.identity(), DeliveryMode::Direct)
        .await
        .unwrap();
    let KeyMaterial::Direct(dek) = key.material else {
        panic!("expected direct material");
    };
    let (unwrapped, _) = playback
        .segment_key(&r720(), SegmentIndex::media(0))
        .await
        .unwrap();
    assert_eq!(dek, unwrapped);
}

#[tokio::test]
async fn direct_delivery_can_be_disabled() {
    let fixture = TestFixture::with_config(ServiceConfig {
        allow_direct_keys: false,
        ..ServiceConfig::default()
    });
    fixture
        .ingest(sample_video("v1", EncryptionMode::Dek, &["720p"], 1))
        .await;
    fixture.pay("v1", &[0]).await;
    let playback = fixture.playback("v1").await.unwrap();

    let err = fixture
        .service
        .get_key(&vid("v1"), "720p", 0, playback.identity(), DeliveryMode::Direct)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidRequest(_)));
}

#[tokio::test]
async fn init_key_request_is_invalid() {
    let fixture = dek_fixture(1).await;
    fixture.pay("v1", &[0]).await;
    let playback = fixture.playback("v1").await.unwrap();
    let err = playback
        .segment_key(&r720(), SegmentIndex::INIT)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidRequest(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Batches
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_fails_per_item() {
    let fixture = dek_fixture(3).await;
    fixture.pay("v1", &[0, 1, 2]).await;
    let playback = fixture.playback("v1").await.unwrap();

    let items = fixture
        .service
        .get_keys_batch(
            &vid("v1"),
            BatchKeyRequest::Indices {
                rendition: "720p".into(),
                seg_indices: vec![0, 1, 999],
            },
            playback.identity(),
            DeliveryMode::Wrapped,
        )
        .await
        .unwrap();

    assert_eq!(items.len(), 3);
    assert!(items[0].result.is_ok());
    assert!(items[1].result.is_ok());
    assert!(items[2].result.is_err());
    assert_eq!(items[2].request.seg_idx, 999);
}

#[tokio::test]
async fn batch_without_record_denies_every_item() {
    let fixture = dek_fixture(2).await;
    let playback = fixture.playback("v1").await.unwrap();
    let items = fixture
        .service
        .get_keys_batch(
            &vid("v1"),
            BatchKeyRequest::Indices {
                rendition: "720p".into(),
                seg_indices: vec![0, 1],
            },
            playback.identity(),
            DeliveryMode::Wrapped,
        )
        .await
        .unwrap();
    for item in items {
        assert!(matches!(
            item.result,
            Err(ServiceError::Authorization(Denial::PaymentRequired))
        ));
    }
}

#[tokio::test]
async fn batch_with_bad_signature_fails_whole() {
    let fixture = dek_fixture(2).await;
    fixture.pay("v1", &[0, 1]).await;
    let playback = fixture.playback("v1").await.unwrap();
    let mut identity = playback.identity().clone();
    identity.wallet.signature = None;

    let err = fixture
        .service
        .get_keys_batch(
            &vid("v1"),
            BatchKeyRequest::Indices {
                rendition: "720p".into(),
                seg_indices: vec![0, 1],
            },
            &identity,
            DeliveryMode::Wrapped,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Authentication(_)));
}

#[tokio::test]
async fn batch_size_is_bounded() {
    let fixture = dek_fixture(1).await;
    let playback = fixture.playback("v1").await.unwrap();

    let too_many = BatchKeyRequest::Indices {
        rendition: "720p".into(),
        seg_indices: (0..101).collect(),
    };
    let err = fixture
        .service
        .get_keys_batch(&vid("v1"), too_many, playback.identity(), DeliveryMode::Wrapped)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidRequest(_)));

    let empty = BatchKeyRequest::Pairs { keys: vec![] };
    assert!(fixture
        .service
        .get_keys_batch(&vid("v1"), empty, playback.identity(), DeliveryMode::Wrapped)
        .await
        .is_err());

    let prefetch = PrefetchRequest::Range {
        rendition: "720p".into(),
        start: 0,
        count: 21,
    };
    let err = fixture
        .service
        .prefetch(&vid("v1"), prefetch, playback.identity(), DeliveryMode::Wrapped)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidRequest(_)));
}

/// A store whose segment lookups take `delay` each.
struct DelayedStore {
    inner: Arc<MemoryStore>,
    delay: Duration,
}

#[async_trait]
impl Store for DelayedStore {
    async fn insert_video(&self, video: &Video) -> StoreResult<InsertResult> {
        self.inner.insert_video(video).await
    }

    async fn get_video(&self, id: &VideoId) -> StoreResult<Option<Video>> {
        self.inner.get_video(id).await
    }

    async fn put_rendition(&self, rendition: &Rendition) -> StoreResult<()> {
        self.inner.put_rendition(rendition).await
    }

    async fn list_renditions(&self, video_id: &VideoId) -> StoreResult<Vec<Rendition>> {
        self.inner.list_renditions(video_id).await
    }

    async fn put_segment(&self, segment: &Segment) -> StoreResult<()> {
        self.inner.put_segment(segment).await
    }

    async fn get_segment(
        &self,
        video_id: &VideoId,
        scheme: Scheme,
        rendition: &RenditionName,
        index: SegmentIndex,
    ) -> StoreResult<Option<Segment>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_segment(video_id, scheme, rendition, index).await
    }

    async fn list_segments(
        &self,
        video_id: &VideoId,
        scheme: Scheme,
        rendition: &RenditionName,
    ) -> StoreResult<Vec<Segment>> {
        self.inner.list_segments(video_id, scheme, rendition).await
    }

    async fn upsert_access_record(&self, record: &AccessRecord) -> StoreResult<AccessRecord> {
        self.inner.upsert_access_record(record).await
    }

    async fn get_access_record(
        &self,
        video_id: &VideoId,
        payer: &WalletAddress,
        chain: &ChainId,
    ) -> StoreResult<Option<AccessRecord>> {
        self.inner.get_access_record(video_id, payer, chain).await
    }

    async fn put_creator_config(&self, config: &CreatorConfig) -> StoreResult<()> {
        self.inner.put_creator_config(config).await
    }

    async fn get_creator_config(
        &self,
        channel_id: &ChannelId,
    ) -> StoreResult<Option<CreatorConfig>> {
        self.inner.get_creator_config(channel_id).await
    }
}

#[tokio::test(start_paused = true)]
async fn batch_deadline_fails_remaining_items() {
    let fixture = dek_fixture(5).await;
    fixture.pay("v1", &[0, 1, 2, 3, 4]).await;

    // 100ms per segment lookup against a 250ms budget: two items fit.
    let store = Arc::new(DelayedStore {
        inner: fixture.store.clone(),
        delay: Duration::from_millis(100),
    });
    let service = KeyService::new(
        store,
        fixture.blobs.clone(),
        fixture.kms.clone(),
        ServiceConfig {
            batch_deadline_ms: 250,
            ..ServiceConfig::default()
        },
    );

    let handshake = ClientHandshake::generate();
    let hello = service
        .start_session(&vid("v1"), handshake.public_key())
        .await
        .unwrap();
    let identity = fixture.identity(hello.session_id);

    let items = service
        .get_keys_batch(
            &vid("v1"),
            BatchKeyRequest::Indices {
                rendition: "720p".into(),
                seg_indices: vec![0, 1, 2, 3, 4],
            },
            &identity,
            DeliveryMode::Wrapped,
        )
        .await
        .unwrap();

    assert_eq!(items.len(), 5);
    assert!(items[0].result.is_ok());
    assert!(items[1].result.is_ok());
    for item in &items[2..] {
        let err = item.result.as_ref().unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert!(err.is_retryable());
    }
    assert_eq!(
        items.iter().map(|item| item.request.seg_idx).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
}

#[tokio::test]
async fn prefetch_caches_granted_keys() {
    let fixture = dek_fixture(4).await;
    fixture.pay("v1", &[0, 1]).await;
    let playback = fixture.playback("v1").await.unwrap();

    let cached = playback.prefetch(&r720(), 0, 4).await.unwrap();
    assert_eq!(cached, 2);

    // Cached keys play even after the session ends server-side.
    let session_id = *playback.session_id();
    assert!(fixture.service.end_session(&session_id));
    let plaintext = playback
        .play_segment(&r720(), SegmentIndex::media(1))
        .await
        .unwrap();
    assert_eq!(plaintext, segment_plaintext("720p", 1));
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

static NOW: AtomicI64 = AtomicI64::new(1_700_000_000_000);

fn test_clock() -> i64 {
    NOW.load(Ordering::SeqCst)
}

#[tokio::test]
async fn idle_session_expires_and_renegotiates_fresh_kek() {
    let fixture = TestFixture::with_options(FixtureOptions {
        config: ServiceConfig {
            session: SessionConfig {
                ttl_ms: 60 * 60 * 1000,
                idle_timeout_ms: 10 * 60 * 1000,
                max_sessions: 16,
            },
            ..ServiceConfig::default()
        },
        clock: Some(test_clock),
        ..FixtureOptions::default()
    });
    fixture
        .ingest(sample_video("v1", EncryptionMode::Dek, &["720p"], 2))
        .await;
    fixture.pay("v1", &[0, 1]).await;

    let first = ClientHandshake::generate();
    let hello = fixture
        .service
        .start_session(&vid("v1"), first.public_key())
        .await
        .unwrap();
    let first_kek = first.complete(&hello).unwrap();
    let identity = fixture.identity(hello.session_id);
    fixture
        .service
        .get_key(&vid("v1"), "720p", 0, &identity, DeliveryMode::Wrapped)
        .await
        .unwrap();

    NOW.fetch_add(11 * 60 * 1000, Ordering::SeqCst);
    let err = fixture
        .service
        .get_key(&vid("v1"), "720p", 0, &identity, DeliveryMode::Wrapped)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SessionExpired(_)));
    assert_eq!(err.user_action(), UserAction::Reauthenticate);

    let second = ClientHandshake::generate();
    let renewed = fixture
        .service
        .start_session(&vid("v1"), second.public_key())
        .await
        .unwrap();
    let second_kek = second.complete(&renewed).unwrap();
    assert_ne!(renewed.session_id, hello.session_id);
    assert_ne!(first_kek.as_bytes(), second_kek.as_bytes());

    let identity = fixture.identity(renewed.session_id);
    fixture
        .service
        .get_key(&vid("v1"), "720p", 1, &identity, DeliveryMode::Wrapped)
        .await
        .unwrap();
    // The stale session was dropped when it was refused.
    assert_eq!(fixture.service.sessions().len(), 1);
    assert_eq!(fixture.service.evict_expired(), 0);
}

#[tokio::test]
async fn ended_session_is_rejected() {
    let fixture = dek_fixture(1).await;
    fixture.pay("v1", &[0]).await;
    let playback = fixture.playback("v1").await.unwrap();
    let identity = playback.identity().clone();
    assert!(playback.close());

    let err = fixture
        .service
        .get_key(&vid("v1"), "720p", 0, &identity, DeliveryMode::Wrapped)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SessionExpired(_)));
}

#[tokio::test]
async fn session_is_bound_to_its_video() {
    let fixture = dek_fixture(1).await;
    fixture
        .ingest(sample_video("v2", EncryptionMode::Dek, &["720p"], 1))
        .await;
    fixture.pay("v2", &[0]).await;
    let playback = fixture.playback("v1").await.unwrap();

    let err = fixture
        .service
        .get_key(&vid("v2"), "720p", 0, playback.identity(), DeliveryMode::Wrapped)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidRequest(_)));
}

#[tokio::test]
async fn unknown_video_has_no_session() {
    let fixture = TestFixture::new();
    let err = fixture.playback("missing").await.err().unwrap();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage paths
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn legacy_stored_keys_play() {
    let fixture = TestFixture::new();
    fixture
        .ingestor()
        .with_key_strategy(KeyStrategy::Stored)
        .ingest(sample_video("legacy", EncryptionMode::Dek, &["720p"], 3))
        .await
        .unwrap();
    fixture.pay("legacy", &[0, 1, 2]).await;

    let segment = fixture
        .store
        .get_segment(&vid("legacy"), Scheme::Dek, &r720(), SegmentIndex::media(2))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(segment.key_source, KeySource::Stored(_)));

    let playback = fixture.playback("legacy").await.unwrap();
    for i in 0..3 {
        let plaintext = playback
            .play_segment(&r720(), SegmentIndex::media(i))
            .await
            .unwrap();
        assert_eq!(plaintext, segment_plaintext("720p", i));
    }
}

#[tokio::test]
async fn tampered_segment_is_broken_content() {
    let fixture = dek_fixture(1).await;
    fixture.pay("v1", &[0]).await;

    let segment = fixture
        .store
        .get_segment(&vid("v1"), Scheme::Dek, &r720(), SegmentIndex::media(0))
        .await
        .unwrap()
        .unwrap();
    let mut bytes = fixture
        .blobs
        .get(&segment.blob_id)
        .await
        .unwrap()
        .unwrap()
        .to_vec();
    bytes[3] ^= 0x80;
    fixture.blobs.overwrite(&segment.blob_id, Bytes::from(bytes));

    let playback = fixture.playback("v1").await.unwrap();
    let err = playback
        .play_segment(&r720(), SegmentIndex::media(0))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Crypto(_)));
    assert!(!err.is_retryable());
}

// ─────────────────────────────────────────────────────────────────────────────
// Threshold path
// ─────────────────────────────────────────────────────────────────────────────

async fn seal_fixture() -> (TestFixture, SealFixture) {
    let seal = SealFixture::new("creator-1", 3, 2);
    let oracle: Arc<dyn PolicyOracle> = seal.oracle.clone();
    let mut fixture = TestFixture::with_options(FixtureOptions {
        oracle: Some(oracle),
        ..FixtureOptions::default()
    });
    fixture.install_seal(&seal).await;

    let mut input = sample_video("sv", EncryptionMode::Both, &["720p"], 3);
    input.channel = Some(seal.config.channel_id.clone());
    fixture.ingest(input).await;
    (fixture, seal)
}

#[tokio::test]
async fn subscriber_plays_sealed_segments() {
    let (fixture, seal) = seal_fixture().await;
    seal.subscribe(fixture.wallet.address());

    let playback = fixture.playback("sv").await.unwrap();
    assert_eq!(
        fixture
            .service
            .playback_scheme(&vid("sv"), playback.identity())
            .await
            .unwrap(),
        Some(Scheme::Seal)
    );

    playback
        .unlock_sealed(&seal.client(), &seal.session_key(&fixture.wallet))
        .await
        .unwrap();
    for i in 0..3 {
        let plaintext = playback
            .play_sealed_segment(&r720(), SegmentIndex::media(i))
            .await
            .unwrap();
        assert_eq!(plaintext, segment_plaintext("720p", i));
    }
    let init = playback
        .play_sealed_segment(&r720(), SegmentIndex::INIT)
        .await
        .unwrap();
    assert_eq!(init, init_segment("720p"));
}

#[tokio::test]
async fn sealed_and_dek_copies_use_different_keys() {
    let (fixture, _seal) = seal_fixture().await;
    let dek_row = fixture
        .store
        .get_segment(&vid("sv"), Scheme::Dek, &r720(), SegmentIndex::media(0))
        .await
        .unwrap()
        .unwrap();
    let seal_row = fixture
        .store
        .get_segment(&vid("sv"), Scheme::Seal, &r720(), SegmentIndex::media(0))
        .await
        .unwrap()
        .unwrap();
    assert_ne!(dek_row.blob_id, seal_row.blob_id);
}

#[tokio::test]
async fn non_subscriber_cannot_unlock() {
    let (fixture, seal) = seal_fixture().await;
    let playback = fixture.playback("sv").await.unwrap();
    assert_eq!(
        fixture
            .service
            .playback_scheme(&vid("sv"), playback.identity())
            .await
            .unwrap(),
        None
    );

    let err = playback
        .unlock_sealed(&seal.client(), &seal.session_key(&fixture.wallet))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Authorization(_)));

    let err = playback
        .play_sealed_segment(&r720(), SegmentIndex::media(0))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidRequest(_)));
}

#[tokio::test]
async fn payment_takes_precedence_over_subscription() {
    let (fixture, seal) = seal_fixture().await;
    seal.subscribe(fixture.wallet.address());
    fixture.pay("sv", &[0]).await;
    let playback = fixture.playback("sv").await.unwrap();

    assert_eq!(
        fixture
            .service
            .playback_scheme(&vid("sv"), playback.identity())
            .await
            .unwrap(),
        Some(Scheme::Dek)
    );
    let plaintext = playback
        .play_segment(&r720(), SegmentIndex::media(0))
        .await
        .unwrap();
    assert_eq!(plaintext, segment_plaintext("720p", 0));
}

#[tokio::test]
async fn seal_only_video_refuses_key_service() {
    let seal = SealFixture::new("creator-2", 2, 2);
    let mut fixture = TestFixture::new();
    fixture.install_seal(&seal).await;
    let mut input = sample_video("so", EncryptionMode::Seal, &["720p"], 1);
    input.channel = Some(seal.config.channel_id.clone());
    let report = fixture.ingest(input).await;
    assert!(report.video.root_secret_enc.is_none());
    fixture.pay("so", &[0]).await;

    let playback = fixture.playback("so").await.unwrap();
    let err = playback
        .segment_key(&r720(), SegmentIndex::media(0))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidRequest(_)));
}

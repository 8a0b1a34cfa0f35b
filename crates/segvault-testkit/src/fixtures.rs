//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: an in-memory deployment of the
//! key service, deterministic sample videos and a local threshold network.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bytes::Bytes;

use segvault::{
    DecryptionPool, IngestReport, Ingestor, KeyService, PipelineConfig, Playback,
    RenditionInput, RequestIdentity, SealTarget, ServiceConfig, VideoInput,
};
use segvault_core::{
    now_millis, ChainId, ChannelId, EncryptionMode, Keypair, LocalMasterKey, ObjectId, ObjectRef,
    RenditionName, SessionId, VideoId, WalletAddress, X25519Secret,
};
use segvault_seal::{
    channel_identity, KeyServerId, LocalKeyServer, MemoryPolicyOracle, PolicyOracle, SealClient,
    SealConfig, SealSessionKey, DEFAULT_SESSION_KEY_TTL_MS,
};
use segvault_store::{AccessKind, AccessRecord, CreatorConfig, MemoryBlobStore, MemoryStore, Store};

/// Chain used by fixture wallets.
pub const TEST_CHAIN: &str = "sui:testnet";

/// Deterministic plaintext for a media segment.
pub fn segment_plaintext(rendition: &str, index: u32) -> Bytes {
    Bytes::from(format!("{rendition}:{index:06}|").repeat(64))
}

/// Deterministic init segment for a rendition.
pub fn init_segment(rendition: &str) -> Bytes {
    Bytes::from(format!("ftyp isom moov {rendition}"))
}

/// A video with `segments` media segments per rendition.
pub fn sample_video(
    id: &str,
    mode: EncryptionMode,
    renditions: &[&str],
    segments: u32,
) -> VideoInput {
    VideoInput {
        id: VideoId::new(id).expect("fixture video id is valid"),
        duration_ms: u64::from(segments) * 4_000,
        mode,
        channel: None,
        renditions: renditions
            .iter()
            .map(|name| RenditionInput {
                name: RenditionName::new(*name).expect("fixture rendition is valid"),
                bitrate: 1_000,
                width: 1280,
                height: 720,
                init: init_segment(name),
                segments: (0..segments).map(|i| segment_plaintext(name, i)).collect(),
            })
            .collect(),
    }
}

/// Options for [`TestFixture::with_options`].
#[derive(Default)]
pub struct FixtureOptions {
    pub config: ServiceConfig,
    pub clock: Option<fn() -> i64>,
    pub oracle: Option<Arc<dyn PolicyOracle>>,
    pub pipeline: PipelineConfig,
}

/// An in-memory deployment with one viewer wallet.
pub struct TestFixture {
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub kms: Arc<LocalMasterKey>,
    pub service: Arc<KeyService>,
    pub pool: Arc<DecryptionPool>,
    pub wallet: Keypair,
    pub chain: ChainId,
    seal_target: Option<SealTarget>,
}

impl TestFixture {
    /// Create a fixture with default configuration and a random wallet.
    pub fn new() -> Self {
        Self::with_options(FixtureOptions::default())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        Self::with_options(FixtureOptions {
            config,
            ..FixtureOptions::default()
        })
    }

    pub fn with_options(options: FixtureOptions) -> Self {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let kms = Arc::new(LocalMasterKey::generate("fixture"));

        let mut service =
            KeyService::new(store.clone(), blobs.clone(), kms.clone(), options.config);
        if let Some(clock) = options.clock {
            service = service.with_clock(clock);
        }
        if let Some(oracle) = options.oracle {
            service = service.with_policy_oracle(oracle);
        }

        Self {
            store,
            blobs,
            kms,
            service: Arc::new(service),
            pool: Arc::new(
                DecryptionPool::new(&options.pipeline).expect("decryption pool starts"),
            ),
            wallet: Keypair::generate(),
            chain: ChainId::new(TEST_CHAIN).expect("test chain is valid"),
            seal_target: None,
        }
    }

    /// Register a creator channel and its key servers for seal-mode ingest.
    pub async fn install_seal(&mut self, seal: &SealFixture) {
        self.store
            .put_creator_config(&seal.config)
            .await
            .expect("creator config stored");
        self.seal_target = Some(seal.target());
    }

    pub fn ingestor(&self) -> Ingestor {
        let ingestor = Ingestor::new(self.store.clone(), self.blobs.clone(), self.kms.clone());
        match &self.seal_target {
            Some(target) => ingestor.with_seal_target(target.clone()),
            None => ingestor,
        }
    }

    /// Ingest a video, panicking on failure.
    pub async fn ingest(&self, input: VideoInput) -> IngestReport {
        self.ingestor().ingest(input).await.expect("ingest succeeds")
    }

    /// Record a payment by the fixture wallet.
    pub async fn pay(&self, video_id: &str, segments: &[u32]) -> AccessRecord {
        self.pay_as(&self.wallet.address(), video_id, segments).await
    }

    /// Record a payment by any address.
    pub async fn pay_as(
        &self,
        payer: &WalletAddress,
        video_id: &str,
        segments: &[u32],
    ) -> AccessRecord {
        let record = AccessRecord {
            video_id: VideoId::new(video_id).expect("fixture video id is valid"),
            payer: payer.clone(),
            chain: self.chain.clone(),
            kind: AccessKind::Payment,
            paid_segments: segments.iter().copied().collect::<BTreeSet<_>>(),
            created_at: now_millis(),
        };
        self.service
            .record_payment(&record)
            .await
            .expect("payment recorded")
    }

    /// Open a playback of `video_id` as the fixture wallet.
    pub async fn playback(&self, video_id: &str) -> segvault::Result<Playback> {
        Playback::start(
            self.service.clone(),
            self.pool.clone(),
            VideoId::new(video_id)?,
            &self.wallet,
            self.chain.clone(),
        )
        .await
    }

    /// The fixture wallet's identity for a session.
    pub fn identity(&self, session_id: SessionId) -> RequestIdentity {
        RequestIdentity::sign(&self.wallet, self.chain.clone(), session_id)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A creator channel behind `n` local key servers.
pub struct SealFixture {
    pub oracle: Arc<MemoryPolicyOracle>,
    pub servers: Vec<Arc<LocalKeyServer<MemoryPolicyOracle>>>,
    pub config: CreatorConfig,
    pub threshold: u8,
}

impl SealFixture {
    pub fn new(channel: &str, servers: usize, threshold: u8) -> Self {
        let channel_id = ChannelId::new(channel).expect("fixture channel is valid");
        let oracle = Arc::new(MemoryPolicyOracle::new());
        let policy_object = ObjectRef {
            object_id: ObjectId::from_bytes([0x5e; 32]),
            version: 1,
            digest: [0x01; 32],
        };
        oracle.publish(policy_object, channel_identity(&channel_id));

        let servers = (0..servers)
            .map(|i| {
                Arc::new(LocalKeyServer::new(
                    KeyServerId::new(format!("ks-{i}")),
                    X25519Secret::generate(),
                    oracle.clone(),
                ))
            })
            .collect();

        Self {
            oracle,
            servers,
            config: CreatorConfig {
                channel_id,
                policy_object,
                package_id: ObjectId::from_bytes([0x9a; 32]),
                fee: 1_000,
                metadata: BTreeMap::new(),
            },
            threshold,
        }
    }

    pub fn target(&self) -> SealTarget {
        SealTarget {
            servers: self.servers.iter().map(|s| s.info()).collect(),
            threshold: self.threshold,
        }
    }

    /// A client that knows every server.
    pub fn client(&self) -> SealClient {
        self.servers
            .iter()
            .fold(SealClient::new(SealConfig::default()), |client, server| {
                client.with_server(server.clone())
            })
    }

    /// Subscribe `subscriber` for an hour.
    pub fn subscribe(&self, subscriber: WalletAddress) {
        self.oracle.subscribe(
            &self.config.policy_object.object_id,
            subscriber,
            now_millis() + 3_600_000,
        );
    }

    pub fn session_key(&self, wallet: &Keypair) -> SealSessionKey {
        SealSessionKey::create(
            wallet,
            self.config.package_id,
            DEFAULT_SESSION_KEY_TTL_MS,
            now_millis(),
        )
        .expect("session key created")
    }
}

//! The key service: session establishment, gated key delivery, payment
//! checks and the threshold-path approval.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use segvault_access::{
    auth_message, check_segment, AccessError, AccessGate, Denial, Grant, PaymentStatus,
    StoreLedger, WalletIdentity,
};
use segvault_core::{
    now_millis, ChainId, Dek, EncryptionMode, EnvelopeStore, Keypair, MasterKeyProvider,
    RenditionName, Scheme, SegmentIndex, SegmentIv, SessionId, VideoId, WrappedKey,
    X25519PublicKey,
};
use segvault_seal::{channel_identity, ApprovalProof, PolicyOracle, SealedObject};
use segvault_session::{wrap_aad, PlaybackSession, ServerHello, SessionStore};
use segvault_store::{AccessRecord, BlobStore, CreatorConfig, Store, Video};

use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::keys::{resolve_segment_key, Envelopes, RootSecretCell};
use crate::request::{BatchKeyRequest, KeyCoordRequest, PrefetchRequest};

/// How a key is handed to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Wrapped under the session KEK. Canonical.
    #[default]
    Wrapped,
    /// Raw DEK, for transports trusted by other means. Deprecated.
    Direct,
}

impl FromStr for DeliveryMode {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "wrapped" => Ok(DeliveryMode::Wrapped),
            "direct" => Ok(DeliveryMode::Direct),
            other => Err(ServiceError::InvalidRequest(format!(
                "unknown delivery mode: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    Wrapped(WrappedKey),
    Direct(Dek),
}

/// A released segment key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredKey {
    pub material: KeyMaterial,
    pub iv: SegmentIv,
}

/// Who is asking, and in which session.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub session_id: SessionId,
    pub wallet: WalletIdentity,
}

impl RequestIdentity {
    /// Sign the session-bound message with a wallet keypair.
    pub fn sign(keypair: &Keypair, chain: ChainId, session_id: SessionId) -> Self {
        Self {
            wallet: WalletIdentity::sign(keypair, chain, &session_id),
            session_id,
        }
    }

    /// The message the wallet must have signed for this session.
    pub fn expected_message(&self) -> Vec<u8> {
        auth_message(&self.session_id, &self.wallet.address, &self.wallet.chain).into_bytes()
    }
}

/// Outcome of one batch entry.
#[derive(Debug)]
pub struct BatchItem {
    pub request: KeyCoordRequest,
    pub result: Result<DeliveredKey>,
}

/// Stored bytes of one segment.
#[derive(Debug, Clone)]
pub struct SegmentPayload {
    pub bytes: Bytes,
    /// `None` for the plaintext init segment.
    pub iv: Option<SegmentIv>,
}

/// What a subscriber needs to open a sealed video.
#[derive(Debug, Clone)]
pub struct SealApproval {
    pub proof: ApprovalProof,
    pub sealed_root: Vec<u8>,
    pub threshold: u8,
}

/// Which scheme a viewer should play, if any.
///
/// A payment covering the video selects the DEK path; otherwise an active
/// subscription selects the threshold path.
pub fn select_scheme(
    mode: EncryptionMode,
    has_payment: bool,
    has_subscription: bool,
) -> Option<Scheme> {
    let dek = (mode.supports(Scheme::Dek) && has_payment).then_some(Scheme::Dek);
    let seal = (mode.supports(Scheme::Seal) && has_subscription).then_some(Scheme::Seal);
    dek.or(seal)
}

/// A validated key coordinate.
struct Coord {
    rendition: RenditionName,
    index: SegmentIndex,
}

fn parse_coord(rendition: &str, seg_idx: i64) -> Result<Coord> {
    let rendition = RenditionName::new(rendition)?;
    let index = SegmentIndex::new(seg_idx)?;
    if index.is_init() {
        return Err(ServiceError::InvalidRequest(
            "init segment is served in plaintext and has no key".into(),
        ));
    }
    Ok(Coord { rendition, index })
}

/// Per-session cache of the video's creator channel.
#[derive(Default)]
struct ChannelCell(OnceCell<CreatorConfig>);

/// The key delivery service.
///
/// Stateless per request apart from the injected [`SessionStore`]; many
/// viewers proceed concurrently without a shared lock on the hot path.
pub struct KeyService {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    envelopes: Envelopes,
    sessions: Arc<SessionStore>,
    gate: AccessGate<StoreLedger<dyn Store>>,
    oracle: Option<Arc<dyn PolicyOracle>>,
    config: ServiceConfig,
    clock: fn() -> i64,
}

impl KeyService {
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        kms: Arc<dyn MasterKeyProvider>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            gate: AccessGate::new(StoreLedger::new(store.clone())),
            sessions: Arc::new(SessionStore::new(config.session.clone())),
            envelopes: EnvelopeStore::new(kms),
            store,
            blobs,
            oracle: None,
            config,
            clock: now_millis,
        }
    }

    /// Consult on-chain subscription state for scheme selection.
    pub fn with_policy_oracle(mut self, oracle: Arc<dyn PolicyOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────────

    /// Server half of the key exchange for one video.
    pub async fn start_session(
        &self,
        video_id: &VideoId,
        client_public: X25519PublicKey,
    ) -> Result<ServerHello> {
        let video = self.require_video(video_id).await?;
        let hello = self
            .sessions
            .create(video.id, client_public, (self.clock)())?;
        info!(session_id = %hello.session_id, video_id = %video_id, "playback session started");
        Ok(hello)
    }

    /// Discard a session and its ephemeral key. Returns whether it existed.
    pub fn end_session(&self, session_id: &SessionId) -> bool {
        let existed = self.sessions.remove(session_id);
        if existed {
            info!(session_id = %session_id, "playback session ended");
        }
        existed
    }

    /// Sweep expired sessions.
    pub fn evict_expired(&self) -> usize {
        self.sessions.evict_expired((self.clock)())
    }

    fn active_session(
        &self,
        identity: &RequestIdentity,
        video_id: &VideoId,
    ) -> Result<Arc<PlaybackSession>> {
        let session = self.sessions.touch(&identity.session_id, (self.clock)())?;
        session.ensure_video(video_id)?;
        Ok(session)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key delivery
    // ─────────────────────────────────────────────────────────────────────────

    /// Release one segment key.
    ///
    /// Fails as a whole on any error: session, authentication, payment,
    /// lookup or crypto.
    pub async fn get_key(
        &self,
        video_id: &VideoId,
        rendition: &str,
        seg_idx: i64,
        identity: &RequestIdentity,
        mode: DeliveryMode,
    ) -> Result<DeliveredKey> {
        let coord = parse_coord(rendition, seg_idx)?;
        let session = self.active_session(identity, video_id)?;
        self.gate
            .authorize_segment(
                video_id,
                coord.index,
                &identity.wallet,
                &identity.expected_message(),
            )
            .await?;
        let video = self.require_video(video_id).await?;
        self.deliver(&session, &video, &coord, mode).await
    }

    /// Release keys for a batch. Entries fail independently.
    pub async fn get_keys_batch(
        &self,
        video_id: &VideoId,
        request: BatchKeyRequest,
        identity: &RequestIdentity,
        mode: DeliveryMode,
    ) -> Result<Vec<BatchItem>> {
        check_count(request.item_count(), self.config.batch.max_batch)?;
        self.run_batch(video_id, request.into_items(), identity, mode)
            .await
    }

    /// Prefetch-oriented batch with a tighter cap.
    pub async fn prefetch(
        &self,
        video_id: &VideoId,
        request: PrefetchRequest,
        identity: &RequestIdentity,
        mode: DeliveryMode,
    ) -> Result<Vec<BatchItem>> {
        check_count(request.item_count(), self.config.batch.max_prefetch)?;
        self.run_batch(video_id, request.into_items(), identity, mode)
            .await
    }

    async fn run_batch(
        &self,
        video_id: &VideoId,
        items: Vec<KeyCoordRequest>,
        identity: &RequestIdentity,
        mode: DeliveryMode,
    ) -> Result<Vec<BatchItem>> {
        let session = self.active_session(identity, video_id)?;
        let grant = match self
            .gate
            .authorize_video(video_id, &identity.wallet, &identity.expected_message())
            .await
        {
            Ok(grant) => Ok(grant),
            Err(AccessError::Denied(denial)) => Err(denial),
            Err(e) => return Err(e.into()),
        };
        let video = self.require_video(video_id).await?;

        let deadline = Instant::now() + Duration::from_millis(self.config.batch_deadline_ms);
        let mut out = Vec::with_capacity(items.len());
        for request in items {
            let result = if Instant::now() >= deadline {
                Err(deadline_exceeded())
            } else {
                tokio::time::timeout_at(
                    deadline,
                    self.batch_item(&session, &video, &grant, &request, mode),
                )
                .await
                .unwrap_or_else(|_| Err(deadline_exceeded()))
            };
            out.push(BatchItem { request, result });
        }

        let failed = out.iter().filter(|item| item.result.is_err()).count();
        debug!(
            video_id = %video_id,
            session_id = %identity.session_id,
            total = out.len(),
            failed,
            "batch served"
        );
        Ok(out)
    }

    async fn batch_item(
        &self,
        session: &PlaybackSession,
        video: &Video,
        grant: &std::result::Result<Grant, Denial>,
        request: &KeyCoordRequest,
        mode: DeliveryMode,
    ) -> Result<DeliveredKey> {
        let coord = parse_coord(&request.rendition, request.seg_idx)?;
        let grant = grant
            .as_ref()
            .map_err(|denial| ServiceError::Authorization(*denial))?;
        check_segment(&grant.record, &video.id, &grant.identity, coord.index)?;
        self.deliver(session, video, &coord, mode).await
    }

    async fn deliver(
        &self,
        session: &PlaybackSession,
        video: &Video,
        coord: &Coord,
        mode: DeliveryMode,
    ) -> Result<DeliveredKey> {
        if !video.mode.supports(Scheme::Dek) {
            return Err(ServiceError::InvalidRequest(format!(
                "video {} is only available by subscription",
                video.id
            )));
        }
        let segment = self
            .store
            .get_segment(&video.id, Scheme::Dek, &coord.rendition, coord.index)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("segment {}/{}", coord.rendition, coord.index))
            })?;

        let root = session.handle_or_init(RootSecretCell::new);
        let (dek, iv) = resolve_segment_key(&self.envelopes, &root, video, &segment).await?;

        let material = match mode {
            DeliveryMode::Wrapped => {
                let aad = wrap_aad(&session.id, &video.id, &coord.rendition, coord.index);
                let wrapped = session.kek()?.wrap_dek(&dek, &aad)?;
                KeyMaterial::Wrapped(wrapped)
            }
            DeliveryMode::Direct => {
                if !self.config.allow_direct_keys {
                    return Err(ServiceError::InvalidRequest(
                        "direct key delivery is disabled".into(),
                    ));
                }
                warn!(
                    video_id = %video.id,
                    session_id = %session.id,
                    seg_idx = %coord.index,
                    "serving unwrapped DEK; direct delivery is deprecated"
                );
                KeyMaterial::Direct(dek)
            }
        };
        debug!(
            video_id = %video.id,
            rendition = %coord.rendition,
            seg_idx = %coord.index,
            session_id = %session.id,
            "key released"
        );
        Ok(DeliveredKey { material, iv })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Payments
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether the requester has paid, and for which segments.
    ///
    /// Stateless: the identity must be signed for `identity.session_id`, but
    /// the session need not be live.
    pub async fn check_payment(
        &self,
        video_id: &VideoId,
        identity: &RequestIdentity,
    ) -> Result<PaymentStatus> {
        Ok(self
            .gate
            .payment_status(video_id, &identity.wallet, &identity.expected_message())
            .await?)
    }

    /// Apply a settled payment or subscription. Paid segments only grow.
    pub async fn record_payment(&self, record: &AccessRecord) -> Result<AccessRecord> {
        self.require_video(&record.video_id).await?;
        let stored = self.store.upsert_access_record(record).await?;
        info!(
            video_id = %stored.video_id,
            payer = %stored.payer,
            chain = %stored.chain,
            kind = stored.kind.as_str(),
            paid = stored.paid_segments.len(),
            "access recorded"
        );
        Ok(stored)
    }

    /// Pick the scheme a viewer is entitled to play.
    pub async fn playback_scheme(
        &self,
        video_id: &VideoId,
        identity: &RequestIdentity,
    ) -> Result<Option<Scheme>> {
        let verified = self
            .gate
            .authenticate(&identity.wallet, &identity.expected_message())?;
        let video = self.require_video(video_id).await?;

        let has_payment = video.mode.supports(Scheme::Dek)
            && self.gate.lookup(video_id, &verified).await?.is_some();

        let has_subscription = match (&self.oracle, video.mode.supports(Scheme::Seal)) {
            (Some(oracle), true) => {
                let config = self.load_channel(&video).await?;
                oracle
                    .is_subscribed(
                        &config.policy_object,
                        &channel_identity(&config.channel_id),
                        verified.address(),
                        (self.clock)(),
                    )
                    .await?
            }
            _ => false,
        };
        Ok(select_scheme(video.mode, has_payment, has_subscription))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Segments and the threshold path
    // ─────────────────────────────────────────────────────────────────────────

    /// Stored bytes and IV of a segment. Ciphertext is not secret; no gate.
    pub async fn fetch_segment(
        &self,
        video_id: &VideoId,
        scheme: Scheme,
        rendition: &str,
        seg_idx: i64,
    ) -> Result<SegmentPayload> {
        let rendition = RenditionName::new(rendition)?;
        let index = SegmentIndex::new(seg_idx)?;
        let segment = self
            .store
            .get_segment(video_id, scheme, &rendition, index)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("segment {rendition}/{index}")))?;
        let bytes = self.blobs.get(&segment.blob_id).await?.ok_or_else(|| {
            warn!(
                video_id = %video_id,
                blob_id = %segment.blob_id,
                "segment row without blob"
            );
            ServiceError::Storage(format!("blob {} missing", segment.blob_id))
        })?;
        Ok(SegmentPayload {
            bytes,
            iv: segment.iv,
        })
    }

    /// Build the approval proof and return the sealed root for a subscriber.
    pub async fn seal_approval(
        &self,
        video_id: &VideoId,
        identity: &RequestIdentity,
    ) -> Result<SealApproval> {
        let session = self.active_session(identity, video_id)?;
        let verified = self
            .gate
            .authenticate(&identity.wallet, &identity.expected_message())?;
        let video = self.require_video(video_id).await?;
        let sealed_root = match (&video.sealed_root, video.mode.supports(Scheme::Seal)) {
            (Some(sealed), true) => sealed.clone(),
            _ => {
                return Err(ServiceError::InvalidRequest(format!(
                    "video {video_id} is not available by subscription"
                )))
            }
        };
        let threshold = SealedObject::from_bytes(&sealed_root)?.threshold;

        let cell = session.handle_or_init(ChannelCell::default);
        let config = cell.0.get_or_try_init(|| self.load_channel(&video)).await?;

        Ok(SealApproval {
            proof: ApprovalProof::for_channel(config, verified.address().clone()),
            sealed_root,
            threshold,
        })
    }

    async fn load_channel(&self, video: &Video) -> Result<CreatorConfig> {
        let channel = video.channel.as_ref().ok_or_else(|| {
            ServiceError::InvalidRequest(format!("video {} has no creator channel", video.id))
        })?;
        self.store
            .get_creator_config(channel)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("creator channel {channel}")))
    }

    async fn require_video(&self, video_id: &VideoId) -> Result<Video> {
        self.store
            .get_video(video_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("video {video_id}")))
    }
}

fn check_count(count: usize, max: usize) -> Result<()> {
    if count == 0 || count > max {
        return Err(ServiceError::InvalidRequest(format!(
            "batch must contain between 1 and {max} keys, got {count}"
        )));
    }
    Ok(())
}

fn deadline_exceeded() -> ServiceError {
    ServiceError::Unavailable("batch deadline exceeded".into())
}

//! Viewer-side playback: session handshake, key unwrap and decryption.
//!
//! The client never sees a raw DEK from the network on the canonical path.
//! It unwraps each key under its session KEK, binding it to the exact
//! segment it asked for, then hands the ciphertext to the decryption pool.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::debug;

use segvault_core::{
    derive_segment_dek, ChainId, Dek, Kek, Keypair, RenditionName, RootSecret, Scheme,
    SegmentIndex, SegmentIv, SessionId, VideoId,
};
use segvault_seal::{SealClient, SealSessionKey, SealedObject};
use segvault_session::{wrap_aad, ClientHandshake};

use crate::error::{Result, ServiceError};
use crate::pipeline::DecryptionPool;
use crate::request::{KeyCoordRequest, PrefetchRequest};
use crate::service::{DeliveredKey, DeliveryMode, KeyMaterial, KeyService, RequestIdentity};

/// An open playback of one video.
pub struct Playback {
    service: Arc<KeyService>,
    pool: Arc<DecryptionPool>,
    video_id: VideoId,
    identity: RequestIdentity,
    kek: Kek,
    keys: DashMap<(RenditionName, SegmentIndex), (Dek, SegmentIv)>,
    seal_root: OnceCell<RootSecret>,
}

impl Playback {
    /// Run the handshake and sign the session-bound identity.
    pub async fn start(
        service: Arc<KeyService>,
        pool: Arc<DecryptionPool>,
        video_id: VideoId,
        wallet: &Keypair,
        chain: ChainId,
    ) -> Result<Self> {
        let handshake = ClientHandshake::generate();
        let hello = service
            .start_session(&video_id, handshake.public_key())
            .await?;
        let kek = handshake.complete(&hello)?;
        let identity = RequestIdentity::sign(wallet, chain, hello.session_id);
        Ok(Self {
            service,
            pool,
            video_id,
            identity,
            kek,
            keys: DashMap::new(),
            seal_root: OnceCell::new(),
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.identity.session_id
    }

    pub fn identity(&self) -> &RequestIdentity {
        &self.identity
    }

    pub fn video_id(&self) -> &VideoId {
        &self.video_id
    }

    fn open(
        &self,
        rendition: &RenditionName,
        index: SegmentIndex,
        key: &DeliveredKey,
    ) -> Result<Dek> {
        match &key.material {
            KeyMaterial::Wrapped(wrapped) => {
                let aad = wrap_aad(self.session_id(), &self.video_id, rendition, index);
                Ok(self.kek.unwrap_dek(wrapped, &aad)?)
            }
            KeyMaterial::Direct(dek) => Ok(dek.clone()),
        }
    }

    /// Fetch and unwrap one segment key, using the prefetch cache first.
    pub async fn segment_key(
        &self,
        rendition: &RenditionName,
        index: SegmentIndex,
    ) -> Result<(Dek, SegmentIv)> {
        if let Some(cached) = self.keys.get(&(rendition.clone(), index)) {
            return Ok(cached.value().clone());
        }
        let key = self
            .service
            .get_key(
                &self.video_id,
                rendition.as_str(),
                i64::from(index.get()),
                &self.identity,
                DeliveryMode::Wrapped,
            )
            .await?;
        let dek = self.open(rendition, index, &key)?;
        self.keys
            .insert((rendition.clone(), index), (dek.clone(), key.iv));
        Ok((dek, key.iv))
    }

    /// Fetch keys for `count` segments from `start` ahead of playback.
    ///
    /// Returns how many keys were cached. Refused entries are skipped; the
    /// player learns about them when it reaches the segment.
    pub async fn prefetch(
        &self,
        rendition: &RenditionName,
        start: u32,
        count: u32,
    ) -> Result<usize> {
        let request = PrefetchRequest::Range {
            rendition: rendition.to_string(),
            start: i64::from(start),
            count,
        };
        let items = self
            .service
            .prefetch(&self.video_id, request, &self.identity, DeliveryMode::Wrapped)
            .await?;

        let mut cached = 0;
        for item in items {
            let KeyCoordRequest { seg_idx, .. } = item.request;
            let key = match item.result {
                Ok(key) => key,
                Err(e) => {
                    debug!(seg_idx, error = %e, "prefetch entry refused");
                    continue;
                }
            };
            let index = SegmentIndex::new(seg_idx)?;
            let dek = self.open(rendition, index, &key)?;
            self.keys.insert((rendition.clone(), index), (dek, key.iv));
            cached += 1;
        }
        Ok(cached)
    }

    /// Plaintext of one segment on the DEK path.
    ///
    /// The init segment comes back as stored; media segments are keyed,
    /// fetched and decrypted on the pool.
    pub async fn play_segment(
        &self,
        rendition: &RenditionName,
        index: SegmentIndex,
    ) -> Result<Bytes> {
        if index.is_init() {
            return self.fetch_init(Scheme::Dek, rendition).await;
        }
        let (dek, iv) = self.segment_key(rendition, index).await?;
        let payload = self
            .service
            .fetch_segment(&self.video_id, Scheme::Dek, rendition.as_str(), i64::from(index.get()))
            .await?;
        let plaintext = self.pool.decrypt(dek, iv, payload.bytes).await?;
        Ok(Bytes::from(plaintext))
    }

    /// Recover the threshold-sealed root secret as a subscriber.
    pub async fn unlock_sealed(
        &self,
        seal: &SealClient,
        session_key: &SealSessionKey,
    ) -> Result<()> {
        self.seal_root
            .get_or_try_init(|| async {
                let approval = self
                    .service
                    .seal_approval(&self.video_id, &self.identity)
                    .await?;
                let sealed = SealedObject::from_bytes(&approval.sealed_root)?;
                let secret = seal.decrypt(&sealed, session_key, &approval.proof).await?;
                debug!(video_id = %self.video_id, "sealed root secret recovered");
                Ok::<_, ServiceError>(RootSecret::from_slice(&secret)?)
            })
            .await?;
        Ok(())
    }

    /// Plaintext of one segment on the threshold path.
    ///
    /// Requires [`unlock_sealed`](Self::unlock_sealed).
    pub async fn play_sealed_segment(
        &self,
        rendition: &RenditionName,
        index: SegmentIndex,
    ) -> Result<Bytes> {
        if index.is_init() {
            return self.fetch_init(Scheme::Seal, rendition).await;
        }
        let root = self.seal_root.get().ok_or_else(|| {
            ServiceError::InvalidRequest("sealed content has not been unlocked".into())
        })?;
        let payload = self
            .service
            .fetch_segment(&self.video_id, Scheme::Seal, rendition.as_str(), i64::from(index.get()))
            .await?;
        let iv = payload
            .iv
            .ok_or_else(|| ServiceError::Crypto(format!("segment {index} has no IV")))?;
        let dek = derive_segment_dek(root, &self.video_id, rendition, index)?;
        let plaintext = self.pool.decrypt(dek, iv, payload.bytes).await?;
        Ok(Bytes::from(plaintext))
    }

    async fn fetch_init(&self, scheme: Scheme, rendition: &RenditionName) -> Result<Bytes> {
        let payload = self
            .service
            .fetch_segment(&self.video_id, scheme, rendition.as_str(), -1)
            .await?;
        Ok(payload.bytes)
    }

    /// End the session. Cached keys go with it.
    pub fn close(self) -> bool {
        self.service.end_session(self.session_id())
    }
}

//! The access gate.
//!
//! Every key release passes through [`AccessGate::authorize_segment`], which
//! runs three checks in a fixed order:
//!
//! 1. the requester's signature over the session-bound message,
//! 2. a payment or subscription record for `(video, address, chain)`,
//! 3. membership of the segment index in the record's paid set.
//!
//! Authentication runs first so a failed signature reveals nothing about
//! payment state. The two denials are logged with distinct reasons but may
//! be presented identically to clients.

use std::collections::BTreeSet;

use tracing::info;

use segvault_core::{SegmentIndex, VideoId};
use segvault_store::AccessRecord;

use crate::error::{AccessError, Denial, Result};
use crate::identity::{Ed25519Verifier, SignatureVerifier, VerifiedIdentity, WalletIdentity};
use crate::ledger::PaymentLedger;

/// Result of a payment-status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentStatus {
    pub has_paid: bool,
    pub paid_segments: Option<BTreeSet<u32>>,
}

/// A granted segment request.
#[derive(Debug, Clone)]
pub struct Grant {
    pub identity: VerifiedIdentity,
    pub record: AccessRecord,
}

pub struct AccessGate<L, V = Ed25519Verifier> {
    ledger: L,
    verifier: V,
}

impl<L: PaymentLedger> AccessGate<L, Ed25519Verifier> {
    pub fn new(ledger: L) -> Self {
        Self {
            ledger,
            verifier: Ed25519Verifier,
        }
    }
}

impl<L: PaymentLedger, V: SignatureVerifier> AccessGate<L, V> {
    pub fn with_verifier(ledger: L, verifier: V) -> Self {
        Self { ledger, verifier }
    }

    /// Step 1: verify the identity against the expected message.
    pub fn authenticate(
        &self,
        identity: &WalletIdentity,
        expected_message: &[u8],
    ) -> Result<VerifiedIdentity> {
        self.verifier
            .verify(identity, expected_message)
            .map_err(|failure| {
                info!(reason = %failure, "authentication failed");
                AccessError::Unauthenticated(failure)
            })?;
        Ok(VerifiedIdentity::new(
            identity.address.clone(),
            identity.chain.clone(),
        ))
    }

    /// Step 2: find the record for a verified identity.
    pub async fn lookup(
        &self,
        video_id: &VideoId,
        identity: &VerifiedIdentity,
    ) -> Result<Option<AccessRecord>> {
        self.ledger
            .lookup(video_id, identity.address(), identity.chain())
            .await
    }

    /// Run all three checks for one segment.
    pub async fn authorize_segment(
        &self,
        video_id: &VideoId,
        index: SegmentIndex,
        identity: &WalletIdentity,
        expected_message: &[u8],
    ) -> Result<Grant> {
        let verified = self.authenticate(identity, expected_message)?;
        let record = self.require_record(video_id, &verified).await?;
        check_segment(&record, video_id, &verified, index)?;
        Ok(Grant {
            identity: verified,
            record,
        })
    }

    /// Steps 1 and 2 only; the caller checks each segment with [`check_segment`].
    pub async fn authorize_video(
        &self,
        video_id: &VideoId,
        identity: &WalletIdentity,
        expected_message: &[u8],
    ) -> Result<Grant> {
        let verified = self.authenticate(identity, expected_message)?;
        let record = self.require_record(video_id, &verified).await?;
        Ok(Grant {
            identity: verified,
            record,
        })
    }

    /// Answer whether an identity has paid, without denying.
    pub async fn payment_status(
        &self,
        video_id: &VideoId,
        identity: &WalletIdentity,
        expected_message: &[u8],
    ) -> Result<PaymentStatus> {
        let verified = self.authenticate(identity, expected_message)?;
        let record = self.lookup(video_id, &verified).await?;
        Ok(match record {
            Some(record) => PaymentStatus {
                has_paid: true,
                paid_segments: Some(record.paid_segments),
            },
            None => PaymentStatus {
                has_paid: false,
                paid_segments: None,
            },
        })
    }

    async fn require_record(
        &self,
        video_id: &VideoId,
        verified: &VerifiedIdentity,
    ) -> Result<AccessRecord> {
        match self.lookup(video_id, verified).await? {
            Some(record) => Ok(record),
            None => {
                info!(
                    video_id = %video_id,
                    payer = %verified.address(),
                    chain = %verified.chain(),
                    reason = "no payment record",
                    "access denied"
                );
                Err(AccessError::Denied(Denial::PaymentRequired))
            }
        }
    }
}

/// Step 3: the segment must be in the paid set. Init segments are never gated.
pub fn check_segment(
    record: &AccessRecord,
    video_id: &VideoId,
    verified: &VerifiedIdentity,
    index: SegmentIndex,
) -> Result<()> {
    let Some(media) = index.media_index() else {
        return Ok(());
    };
    if record.covers(media) {
        return Ok(());
    }
    info!(
        video_id = %video_id,
        payer = %verified.address(),
        seg_idx = media,
        reason = "segment not covered by payment",
        "access denied"
    );
    Err(AccessError::Denied(Denial::SegmentNotCovered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use segvault_core::{ChainId, Keypair, SessionId, WalletAddress};
    use segvault_store::{AccessKind, MemoryStore, Store};

    use crate::error::AuthFailure;
    use crate::identity::auth_message;
    use crate::ledger::StoreLedger;

    struct Fixture {
        gate: AccessGate<StoreLedger<MemoryStore>>,
        store: Arc<MemoryStore>,
        keypair: Keypair,
        chain: ChainId,
        session: SessionId,
        video: VideoId,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            Self {
                gate: AccessGate::new(StoreLedger::new(store.clone())),
                store,
                keypair: Keypair::generate(),
                chain: ChainId::new("sui:testnet").unwrap(),
                session: SessionId::generate(),
                video: VideoId::new("v1").unwrap(),
            }
        }

        async fn pay(&self, segments: &[u32]) {
            self.store
                .upsert_access_record(&AccessRecord {
                    video_id: self.video.clone(),
                    payer: self.keypair.address(),
                    chain: self.chain.clone(),
                    kind: AccessKind::Payment,
                    paid_segments: segments.iter().copied().collect(),
                    created_at: 0,
                })
                .await
                .unwrap();
        }

        fn identity(&self) -> WalletIdentity {
            WalletIdentity::sign(&self.keypair, self.chain.clone(), &self.session)
        }

        fn expected(&self) -> Vec<u8> {
            auth_message(&self.session, &self.keypair.address(), &self.chain).into_bytes()
        }
    }

    #[tokio::test]
    async fn test_paid_segment_allowed_unpaid_denied() {
        let f = Fixture::new();
        f.pay(&[0, 1, 2]).await;

        let grant = f
            .gate
            .authorize_segment(&f.video, SegmentIndex::media(2), &f.identity(), &f.expected())
            .await
            .unwrap();
        assert_eq!(grant.identity.address(), &f.keypair.address());

        let err = f
            .gate
            .authorize_segment(&f.video, SegmentIndex::media(3), &f.identity(), &f.expected())
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Denied(Denial::SegmentNotCovered)));
    }

    #[tokio::test]
    async fn test_no_record_is_payment_required() {
        let f = Fixture::new();
        let err = f
            .gate
            .authorize_segment(&f.video, SegmentIndex::media(0), &f.identity(), &f.expected())
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Denied(Denial::PaymentRequired)));
    }

    #[tokio::test]
    async fn test_record_on_other_chain_does_not_count() {
        let f = Fixture::new();
        f.pay(&[0]).await;
        let mainnet = ChainId::new("sui:mainnet").unwrap();
        let identity = WalletIdentity::sign(&f.keypair, mainnet, &f.session);
        let expected = auth_message(&f.session, &identity.address, &identity.chain).into_bytes();

        let err = f
            .gate
            .authorize_segment(&f.video, SegmentIndex::media(0), &identity, &expected)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Denied(Denial::PaymentRequired)));
    }

    struct CountingLedger(AtomicUsize);

    #[async_trait]
    impl PaymentLedger for CountingLedger {
        async fn lookup(
            &self,
            _: &VideoId,
            _: &WalletAddress,
            _: &ChainId,
        ) -> Result<Option<AccessRecord>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_authentication_precedes_ledger() {
        let f = Fixture::new();
        let gate = AccessGate::new(CountingLedger(AtomicUsize::new(0)));
        let mut identity = f.identity();
        identity.signature = None;

        let err = gate
            .authorize_segment(&f.video, SegmentIndex::media(0), &identity, &f.expected())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::Unauthenticated(AuthFailure::MissingSignature)
        ));
        assert_eq!(gate.ledger.0.load(Ordering::SeqCst), 0);

        let status = gate.payment_status(&f.video, &identity, &f.expected()).await;
        assert!(status.is_err());
        assert_eq!(gate.ledger.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_payment_status() {
        let f = Fixture::new();
        let status = f
            .gate
            .payment_status(&f.video, &f.identity(), &f.expected())
            .await
            .unwrap();
        assert!(!status.has_paid);
        assert!(status.paid_segments.is_none());

        f.pay(&[4, 5]).await;
        let status = f
            .gate
            .payment_status(&f.video, &f.identity(), &f.expected())
            .await
            .unwrap();
        assert!(status.has_paid);
        assert_eq!(status.paid_segments, Some([4, 5].into_iter().collect()));
    }

    #[tokio::test]
    async fn test_init_segment_not_gated_by_paid_set() {
        let f = Fixture::new();
        f.pay(&[7]).await;
        let grant = f
            .gate
            .authorize_video(&f.video, &f.identity(), &f.expected())
            .await
            .unwrap();
        assert!(
            check_segment(&grant.record, &f.video, &grant.identity, SegmentIndex::INIT).is_ok()
        );
        assert!(
            check_segment(&grant.record, &f.video, &grant.identity, SegmentIndex::media(0)).is_err()
        );
    }
}

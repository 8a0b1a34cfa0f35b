//! Key servers.
//!
//! A key server releases its share of a content key only after checking the
//! caller's session certificate and dry-running the approval proof against
//! current policy state.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use segvault_core::{now_millis, ObjectId, X25519PublicKey, X25519Secret};

use crate::encrypt::{EncryptedShare, KeyServerId, KeyServerInfo, ReencryptedShare};
use crate::error::{Result, SealError};
use crate::policy::{ApprovalProof, PolicyOracle, APPROVE_FUNCTION};
use crate::session_key::SessionCertificate;

/// A request for one server's share of a sealed object.
#[derive(Debug, Clone)]
pub struct ShareRequest {
    pub package_id: ObjectId,
    pub identity: Vec<u8>,
    pub share: EncryptedShare,
    pub certificate: SessionCertificate,
    pub proof: ApprovalProof,
}

/// A threshold key server.
#[async_trait]
pub trait KeyServer: Send + Sync {
    fn id(&self) -> &KeyServerId;

    /// Approve the request and return the share re-encrypted to the session key.
    async fn fetch_share(&self, request: &ShareRequest) -> Result<ReencryptedShare>;
}

/// An in-process key server backed by a [`PolicyOracle`].
pub struct LocalKeyServer<O: PolicyOracle> {
    id: KeyServerId,
    secret: X25519Secret,
    oracle: Arc<O>,
    clock: fn() -> i64,
}

impl<O: PolicyOracle> LocalKeyServer<O> {
    pub fn new(id: KeyServerId, secret: X25519Secret, oracle: Arc<O>) -> Self {
        Self {
            id,
            secret,
            oracle,
            clock: now_millis,
        }
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn public_key(&self) -> X25519PublicKey {
        self.secret.public_key()
    }

    /// What publishers need to seal to this server.
    pub fn info(&self) -> KeyServerInfo {
        KeyServerInfo {
            id: self.id.clone(),
            public_key: self.public_key(),
        }
    }

    fn check_proof(&self, request: &ShareRequest) -> Result<()> {
        let proof = &request.proof;
        if proof.function != APPROVE_FUNCTION {
            return Err(SealError::PolicyDenied(format!(
                "unexpected entry function {}",
                proof.function
            )));
        }
        if proof.package_id != request.package_id {
            return Err(SealError::PolicyDenied("proof targets another package".into()));
        }
        if proof.identity != request.identity {
            return Err(SealError::PolicyDenied("proof targets another identity".into()));
        }
        if proof.subscriber != request.certificate.address() {
            return Err(SealError::PolicyDenied(
                "proof subscriber differs from session key owner".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl<O: PolicyOracle + 'static> KeyServer for LocalKeyServer<O> {
    fn id(&self) -> &KeyServerId {
        &self.id
    }

    async fn fetch_share(&self, request: &ShareRequest) -> Result<ReencryptedShare> {
        if request.share.server_id != self.id {
            return Err(SealError::UnknownServer(request.share.server_id.to_string()));
        }
        let now = (self.clock)();
        request.certificate.verify(&request.package_id, now)?;
        self.check_proof(request)?;

        let subscribed = self
            .oracle
            .is_subscribed(
                &request.proof.policy_object,
                &request.identity,
                &request.proof.subscriber,
                now,
            )
            .await?;
        if !subscribed {
            info!(
                server = %self.id,
                subscriber = %request.proof.subscriber,
                "share refused: no active subscription"
            );
            return Err(SealError::PolicyDenied("no active subscription".into()));
        }

        let share = request
            .share
            .decrypt(&self.secret, &request.package_id, &request.identity)?;
        ReencryptedShare::seal(
            self.id.clone(),
            &share,
            &request.certificate.ephemeral,
            &request.package_id,
            &request.identity,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encrypt::SealedObject;
    use crate::policy::MemoryPolicyOracle;
    use crate::session_key::SealSessionKey;
    use segvault_core::{Keypair, ObjectRef};

    fn policy_ref() -> ObjectRef {
        ObjectRef {
            object_id: ObjectId::from_bytes([5; 32]),
            version: 1,
            digest: [1; 32],
        }
    }

    struct Fixture {
        server: LocalKeyServer<MemoryPolicyOracle>,
        oracle: Arc<MemoryPolicyOracle>,
        sealed: SealedObject,
        wallet: Keypair,
    }

    fn fixture() -> Fixture {
        let oracle = Arc::new(MemoryPolicyOracle::new());
        oracle.publish(policy_ref(), b"channel".to_vec());
        let server = LocalKeyServer::new(
            KeyServerId::new("ks-0"),
            X25519Secret::generate(),
            oracle.clone(),
        );
        let sealed = SealedObject::seal(
            b"secret",
            ObjectId::from_bytes([1; 32]),
            b"channel".to_vec(),
            &[server.info()],
            1,
        )
        .unwrap();
        Fixture {
            server,
            oracle,
            sealed,
            wallet: Keypair::from_seed(&[3; 32]),
        }
    }

    fn request(f: &Fixture, key: &SealSessionKey) -> ShareRequest {
        ShareRequest {
            package_id: f.sealed.package_id,
            identity: f.sealed.identity.clone(),
            share: f.sealed.shares[0].clone(),
            certificate: key.certificate().clone(),
            proof: ApprovalProof {
                package_id: f.sealed.package_id,
                function: APPROVE_FUNCTION.into(),
                identity: f.sealed.identity.clone(),
                policy_object: policy_ref(),
                subscriber: f.wallet.address(),
            },
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_share() {
        let f = fixture();
        f.oracle
            .subscribe(&policy_ref().object_id, f.wallet.address(), i64::MAX);
        let key = SealSessionKey::create(&f.wallet, f.sealed.package_id, 60_000, now_millis())
            .unwrap();

        let re = f.server.fetch_share(&request(&f, &key)).await.unwrap();
        let share = re
            .open(key.ephemeral(), &f.sealed.package_id, &f.sealed.identity)
            .unwrap();
        let content_key = f.sealed.combine(&[share]).unwrap();
        assert_eq!(f.sealed.open(&content_key).unwrap(), b"secret");
    }

    #[tokio::test]
    async fn test_non_subscriber_denied() {
        let f = fixture();
        let key = SealSessionKey::create(&f.wallet, f.sealed.package_id, 60_000, now_millis())
            .unwrap();
        let err = f.server.fetch_share(&request(&f, &key)).await.unwrap_err();
        assert!(matches!(err, SealError::PolicyDenied(_)));
    }

    #[tokio::test]
    async fn test_proof_for_other_wallet_denied() {
        let f = fixture();
        let other = Keypair::from_seed(&[4; 32]);
        f.oracle.subscribe(&policy_ref().object_id, other.address(), i64::MAX);
        let key = SealSessionKey::create(&f.wallet, f.sealed.package_id, 60_000, now_millis())
            .unwrap();

        let mut req = request(&f, &key);
        req.proof.subscriber = other.address();
        assert!(matches!(
            f.server.fetch_share(&req).await,
            Err(SealError::PolicyDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_session_key_rejected() {
        let f = fixture();
        let key = SealSessionKey::create(&f.wallet, f.sealed.package_id, 10, 0).unwrap();
        assert!(matches!(
            f.server.fetch_share(&request(&f, &key)).await,
            Err(SealError::SessionKeyExpired)
        ));
    }

    #[tokio::test]
    async fn test_stale_policy_version_rejected() {
        let f = fixture();
        f.oracle
            .subscribe(&policy_ref().object_id, f.wallet.address(), i64::MAX);
        f.oracle.publish(
            ObjectRef {
                version: 2,
                digest: [2; 32],
                ..policy_ref()
            },
            b"channel".to_vec(),
        );
        let key = SealSessionKey::create(&f.wallet, f.sealed.package_id, 60_000, now_millis())
            .unwrap();
        assert!(matches!(
            f.server.fetch_share(&request(&f, &key)).await,
            Err(SealError::StaleObjectRef(_))
        ));
    }

    #[tokio::test]
    async fn test_foreign_policy_object_denied() {
        let f = fixture();
        let foreign = ObjectRef {
            object_id: ObjectId::from_bytes([6; 32]),
            version: 1,
            digest: [7; 32],
        };
        f.oracle.publish(foreign, b"other-channel".to_vec());
        f.oracle.subscribe(&foreign.object_id, f.wallet.address(), i64::MAX);
        let key = SealSessionKey::create(&f.wallet, f.sealed.package_id, 60_000, now_millis())
            .unwrap();

        let mut req = request(&f, &key);
        req.proof.policy_object = foreign;
        assert!(matches!(
            f.server.fetch_share(&req).await,
            Err(SealError::PolicyDenied(_))
        ));
    }
}

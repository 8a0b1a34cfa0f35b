//! Subscription policy: approval proofs and the on-chain oracle seam.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use segvault_core::{ChannelId, ObjectId, ObjectRef, WalletAddress};
use segvault_store::CreatorConfig;

use crate::error::{Result, SealError};

/// Entry function the key servers dry-run.
pub const APPROVE_FUNCTION: &str = "seal_approve";

/// Threshold-encryption identity for a creator channel's content.
pub fn channel_identity(channel_id: &ChannelId) -> Vec<u8> {
    let mut id = b"segvault/channel/".to_vec();
    id.extend_from_slice(channel_id.as_str().as_bytes());
    id
}

/// An unsigned approval transaction.
///
/// Key servers evaluate it against chain state; it is never submitted.
/// The policy object is fully qualified so servers need no version lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalProof {
    pub package_id: ObjectId,
    pub function: String,
    pub identity: Vec<u8>,
    pub policy_object: ObjectRef,
    pub subscriber: WalletAddress,
}

impl ApprovalProof {
    /// Build the proof for a subscriber of a creator channel.
    pub fn for_channel(config: &CreatorConfig, subscriber: WalletAddress) -> Self {
        Self {
            package_id: config.package_id,
            function: APPROVE_FUNCTION.to_string(),
            identity: channel_identity(&config.channel_id),
            policy_object: config.policy_object,
            subscriber,
        }
    }

    /// Serialized transaction bytes, as handed to a wallet or key server.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| SealError::Encoding(e.to_string()))?;
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| SealError::Encoding(e.to_string()))
    }
}

/// Read access to on-chain subscription policy objects.
#[async_trait]
pub trait PolicyOracle: Send + Sync {
    /// Whether `policy` (at exactly its referenced version) governs content
    /// sealed under `identity` and attests `subscriber`.
    ///
    /// A policy object that governs another identity is `PolicyDenied`.
    async fn is_subscribed(
        &self,
        policy: &ObjectRef,
        identity: &[u8],
        subscriber: &WalletAddress,
        now: i64,
    ) -> Result<bool>;
}

/// In-memory oracle for tests and local deployments.
#[derive(Default)]
pub struct MemoryPolicyOracle {
    objects: RwLock<HashMap<ObjectId, PolicyObject>>,
}

struct PolicyObject {
    current: ObjectRef,
    /// Threshold identity this object gates.
    identity: Vec<u8>,
    /// Subscriber -> subscription expiry (Unix ms).
    subscribers: HashMap<WalletAddress, i64>,
}

impl MemoryPolicyOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a policy object gating `identity`, or bump its version.
    ///
    /// The gated identity is fixed by the first publication.
    pub fn publish(&self, current: ObjectRef, identity: Vec<u8>) {
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        objects
            .entry(current.object_id)
            .and_modify(|o| o.current = current)
            .or_insert_with(|| PolicyObject {
                current,
                identity,
                subscribers: HashMap::new(),
            });
    }

    /// Record a subscription until `expires_at`.
    pub fn subscribe(&self, object_id: &ObjectId, subscriber: WalletAddress, expires_at: i64) {
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(object) = objects.get_mut(object_id) {
            object.subscribers.insert(subscriber, expires_at);
        }
    }
}

#[async_trait]
impl PolicyOracle for MemoryPolicyOracle {
    async fn is_subscribed(
        &self,
        policy: &ObjectRef,
        identity: &[u8],
        subscriber: &WalletAddress,
        now: i64,
    ) -> Result<bool> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        let object = objects.get(&policy.object_id).ok_or_else(|| {
            SealError::PolicyDenied(format!("unknown object {}", policy.object_id))
        })?;
        if object.identity != identity {
            return Err(SealError::PolicyDenied(format!(
                "object {} does not govern this content",
                policy.object_id
            )));
        }

        if object.current.version != policy.version || object.current.digest != policy.digest {
            return Err(SealError::StaleObjectRef(format!(
                "{} at version {}, current {}",
                policy.object_id, policy.version, object.current.version
            )));
        }
        Ok(object
            .subscribers
            .get(subscriber)
            .is_some_and(|&expires_at| now < expires_at))
    }
}

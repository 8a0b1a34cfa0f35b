//! # Segvault Seal
//!
//! Threshold encryption for subscription content. A video's root secret is
//! sealed so that any `t` of `n` key servers can release it, and each server
//! releases its share only to a subscriber whose wallet-certified session
//! key and approval proof check out against current policy state.
//!
//! ## Flow
//!
//! 1. The publisher calls [`SealedObject::seal`] with the creator channel's
//!    identity and the configured [`KeyServerInfo`] list.
//! 2. The viewer creates a [`SealSessionKey`] (one wallet signature) and an
//!    [`ApprovalProof`] for the channel's policy object.
//! 3. [`SealClient`] asks the servers in parallel and recombines the first
//!    `t` shares.

pub mod client;
pub mod encrypt;
pub mod error;
pub mod policy;
pub mod server;
pub mod session_key;
pub mod shamir;

pub use client::{SealClient, SealConfig};
pub use encrypt::{EncryptedShare, KeyServerId, KeyServerInfo, ReencryptedShare, SealedObject};
pub use error::{Result, SealError};
pub use policy::{channel_identity, ApprovalProof, MemoryPolicyOracle, PolicyOracle};
pub use server::{KeyServer, LocalKeyServer, ShareRequest};
pub use session_key::{
    certificate_message, SealSessionKey, SessionCertificate, DEFAULT_SESSION_KEY_TTL_MS,
};
pub use shamir::Share;

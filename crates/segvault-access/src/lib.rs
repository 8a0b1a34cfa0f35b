//! # Segvault Access
//!
//! The access gate: wallet-signature authentication followed by a payment
//! or subscription ledger lookup and a per-segment coverage check.
//!
//! ## Key Types
//!
//! - [`WalletIdentity`] - claimed identity from request metadata
//! - [`SignatureVerifier`] - signature check seam ([`Ed25519Verifier`])
//! - [`PaymentLedger`] - ledger seam ([`StoreLedger`])
//! - [`AccessGate`] - the ordered decision procedure

pub mod error;
pub mod gate;
pub mod identity;
pub mod ledger;

pub use error::{AccessError, AuthFailure, Denial, Result};
pub use gate::{check_segment, AccessGate, Grant, PaymentStatus};
pub use identity::{
    auth_message, Ed25519Verifier, SignatureVerifier, VerifiedIdentity, WalletIdentity,
};
pub use ledger::{PaymentLedger, StoreLedger};

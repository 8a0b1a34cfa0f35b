//! Error taxonomy for the key delivery service.
//!
//! Every lower-layer error folds into one of a few client-facing classes.
//! The player needs to tell "pay to continue" from "temporarily unavailable"
//! from "broken content", so each class carries its status code, its
//! retryability and the action it asks of the user.

use thiserror::Error;

use segvault_access::{AccessError, AuthFailure, Denial};
use segvault_core::CoreError;
use segvault_seal::SealError;
use segvault_session::SessionError;
use segvault_store::StoreError;

/// What the user can do about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    /// Sign in again or renegotiate the session.
    Reauthenticate,
    PayToContinue,
    RetryLater,
    /// Nothing; the content is damaged.
    BrokenContent,
    /// The request itself is malformed.
    FixRequest,
}

/// Errors that can occur during service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Bad or missing signature. Never says anything about payment state.
    #[error("authentication failed: {0}")]
    Authentication(AuthFailure),

    /// Valid identity, but no payment or the segment is not covered.
    #[error("not authorized: {0}")]
    Authorization(Denial),

    #[error("not found: {0}")]
    NotFound(String),

    /// Unknown or expired playback session, or an expired seal session key.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// Envelope, ciphertext or tag failure. A data-integrity incident.
    #[error("crypto failure: {0}")]
    Crypto(String),

    /// Threshold key servers unreachable after retries.
    #[error("threshold key service unavailable: {0}")]
    ThresholdService(String),

    /// Capacity or KMS outage.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Authentication(_)
            | ServiceError::Authorization(_)
            | ServiceError::SessionExpired(_) => 401,
            ServiceError::NotFound(_) => 404,
            ServiceError::InvalidRequest(_) => 400,
            ServiceError::ThresholdService(_) | ServiceError::Unavailable(_) => 503,
            ServiceError::Crypto(_) | ServiceError::Storage(_) => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::ThresholdService(_) | ServiceError::Unavailable(_)
        )
    }

    pub fn user_action(&self) -> UserAction {
        match self {
            ServiceError::Authentication(_) | ServiceError::SessionExpired(_) => {
                UserAction::Reauthenticate
            }
            ServiceError::Authorization(_) => UserAction::PayToContinue,
            ServiceError::ThresholdService(_)
            | ServiceError::Unavailable(_)
            | ServiceError::Storage(_) => UserAction::RetryLater,
            ServiceError::Crypto(_) => UserAction::BrokenContent,
            ServiceError::NotFound(_) | ServiceError::InvalidRequest(_) => UserAction::FixRequest,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Authentication(_) => "unauthenticated",
            ServiceError::Authorization(Denial::PaymentRequired) => "payment_required",
            ServiceError::Authorization(Denial::SegmentNotCovered) => "segment_not_covered",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::SessionExpired(_) => "session_expired",
            ServiceError::Crypto(_) => "broken_content",
            ServiceError::ThresholdService(_) => "threshold_unavailable",
            ServiceError::Unavailable(_) => "unavailable",
            ServiceError::InvalidRequest(_) => "invalid_request",
            ServiceError::Storage(_) => "internal",
        }
    }

    /// Message safe to show a client.
    ///
    /// Internal detail (auth failure reason, crypto and storage errors) is
    /// kept out; it is only logged.
    pub fn client_message(&self) -> String {
        match self {
            ServiceError::Authentication(_) => "authentication required".into(),
            ServiceError::Authorization(denial) => denial.to_string(),
            ServiceError::NotFound(what) => format!("not found: {what}"),
            ServiceError::SessionExpired(_) => "session expired, renegotiate".into(),
            ServiceError::Crypto(_) => "content unavailable".into(),
            ServiceError::ThresholdService(_) | ServiceError::Unavailable(_) => {
                "temporarily unavailable".into()
            }
            ServiceError::InvalidRequest(reason) => reason.clone(),
            ServiceError::Storage(_) => "internal error".into(),
        }
    }
}

impl From<AccessError> for ServiceError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::Unauthenticated(failure) => ServiceError::Authentication(failure),
            AccessError::Denied(denial) => ServiceError::Authorization(denial),
            AccessError::Ledger(msg) => ServiceError::Storage(msg),
        }
    }
}

impl From<SessionError> for ServiceError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(_) | SessionError::Expired(_) => {
                ServiceError::SessionExpired(e.to_string())
            }
            SessionError::VideoMismatch(_) => ServiceError::InvalidRequest(e.to_string()),
            SessionError::CapacityExceeded(_) => ServiceError::Unavailable(e.to_string()),
            SessionError::Core(core) => core.into(),
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidIdentifier(_)
            | CoreError::InvalidSegmentIndex(_)
            | CoreError::InitSegmentHasNoKey
            | CoreError::InvalidPublicKey => ServiceError::InvalidRequest(e.to_string()),
            CoreError::Kms(_) => ServiceError::Unavailable(e.to_string()),
            _ => ServiceError::Crypto(e.to_string()),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        ServiceError::Storage(e.to_string())
    }
}

impl From<SealError> for ServiceError {
    fn from(e: SealError) -> Self {
        match e {
            SealError::PolicyDenied(_) | SealError::StaleObjectRef(_) => {
                ServiceError::Authorization(Denial::PaymentRequired)
            }
            SealError::SessionKeyExpired => ServiceError::SessionExpired(e.to_string()),
            SealError::InvalidSessionKey(_) | SealError::InvalidThreshold { .. } => {
                ServiceError::InvalidRequest(e.to_string())
            }
            SealError::Crypto(core) => core.into(),
            _ if e.is_retryable() => ServiceError::ThresholdService(e.to_string()),
            _ => ServiceError::Crypto(e.to_string()),
        }
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use segvault_core::SessionId;

    #[test]
    fn test_taxonomy_status_codes() {
        let cases: Vec<(ServiceError, u16, UserAction)> = vec![
            (
                ServiceError::Authentication(AuthFailure::BadSignature),
                401,
                UserAction::Reauthenticate,
            ),
            (
                ServiceError::Authorization(Denial::SegmentNotCovered),
                401,
                UserAction::PayToContinue,
            ),
            (ServiceError::NotFound("x".into()), 404, UserAction::FixRequest),
            (
                ServiceError::SessionExpired("s".into()),
                401,
                UserAction::Reauthenticate,
            ),
            (ServiceError::Crypto("tag".into()), 500, UserAction::BrokenContent),
            (
                ServiceError::ThresholdService("down".into()),
                503,
                UserAction::RetryLater,
            ),
            (ServiceError::InvalidRequest("bad".into()), 400, UserAction::FixRequest),
        ];
        for (err, status, action) in cases {
            assert_eq!(err.status_code(), status, "{err}");
            assert_eq!(err.user_action(), action, "{err}");
        }
    }

    #[test]
    fn test_authentication_message_is_generic() {
        let err = ServiceError::Authentication(AuthFailure::AddressMismatch);
        assert_eq!(err.client_message(), "authentication required");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_conversions() {
        let err: ServiceError = SessionError::Expired(SessionId::from_bytes([0; 16])).into();
        assert!(matches!(err, ServiceError::SessionExpired(_)));

        let err: ServiceError = CoreError::EnvelopeCorrupt("x".into()).into();
        assert!(matches!(err, ServiceError::Crypto(_)));

        let err: ServiceError = SealError::Timeout.into();
        assert!(matches!(err, ServiceError::ThresholdService(_)));
        assert!(err.is_retryable());

        let err: ServiceError = SealError::PolicyDenied("no".into()).into();
        assert_eq!(err.user_action(), UserAction::PayToContinue);
    }
}

//! HTTP front end for the segvault key service.
//!
//! Routes map one-to-one onto [`segvault::KeyService`] operations. The
//! requester identity travels in `x-wallet-*` headers next to the
//! `x-session-id` of the playback session it is bound to.

pub mod app;
pub mod config;
pub mod identity;
pub mod response;
pub mod routes;

pub use app::{build_service, init_logging, spawn_session_sweeper};
pub use config::ServerConfig;
pub use identity::{identity_from_headers, identity_headers, Identity};
pub use response::{ApiError, ApiResult, ErrorBody};
pub use routes::{router, AppState, SEGMENT_IV_HEADER};

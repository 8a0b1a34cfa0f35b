//! Service configuration.

use serde::{Deserialize, Serialize};

use segvault_session::SessionConfig;

/// Caps on batch key requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchLimits {
    /// Maximum items in a generic batch.
    pub max_batch: usize,
    /// Maximum items in a prefetch request.
    pub max_prefetch: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_batch: 100,
            max_prefetch: 20,
        }
    }
}

/// Configuration for the key service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub session: SessionConfig,
    pub batch: BatchLimits,
    /// Wall-clock budget for one batch; items not reached in time fail individually.
    pub batch_deadline_ms: u64,
    /// Serve unwrapped DEKs when explicitly requested. Deprecated.
    pub allow_direct_keys: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            batch: BatchLimits::default(),
            batch_deadline_ms: 5_000,
            allow_direct_keys: true,
        }
    }
}

/// Client-side decryption pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of worker threads. Zero decrypts inline.
    pub workers: usize,
    /// Pending jobs per worker before dispatch moves on.
    pub queue_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 16,
        }
    }
}

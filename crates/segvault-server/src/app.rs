//! Wiring: storage, master key, service, logging and background sweeps.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, EnvFilter};

use segvault::core::{LocalMasterKey, MasterKeyProvider};
use segvault::store::{BlobStore, FsBlobStore, MemoryBlobStore, SqliteStore, Store};
use segvault::KeyService;

use crate::config::ServerConfig;

/// Initialise tracing with the configured level and format.
///
/// `RUST_LOG` overrides the level when set.
pub fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

async fn open_store(config: &ServerConfig) -> Result<Arc<dyn Store>> {
    let store = match &config.storage.database {
        Some(path) => SqliteStore::open(path)
            .with_context(|| format!("cannot open database {}", path.display()))?,
        None => {
            warn!("no database configured, catalog is in memory");
            SqliteStore::open_memory()?
        }
    };
    Ok(Arc::new(store))
}

async fn open_blobs(config: &ServerConfig) -> Result<Arc<dyn BlobStore>> {
    Ok(match &config.storage.blob_dir {
        Some(dir) => Arc::new(
            FsBlobStore::open(dir)
                .await
                .with_context(|| format!("cannot open blob dir {}", dir.display()))?,
        ),
        None => Arc::new(MemoryBlobStore::new()),
    })
}

fn master_key(config: &ServerConfig) -> Result<Arc<dyn MasterKeyProvider>> {
    let kms = &config.kms;
    Ok(match kms.master_key()? {
        Some(hex) => Arc::new(
            LocalMasterKey::from_hex(kms.key_id.clone(), &hex).context("invalid master key")?,
        ),
        None => {
            warn!(
                key_id = %kms.key_id,
                "no master key configured, generated an ephemeral one; \
                 stored envelopes will not survive a restart"
            );
            Arc::new(LocalMasterKey::generate(kms.key_id.clone()))
        }
    })
}

/// Build the key service from configuration.
pub async fn build_service(config: &ServerConfig) -> Result<KeyService> {
    let store = open_store(config).await?;
    let blobs = open_blobs(config).await?;
    let kms = master_key(config)?;
    Ok(KeyService::new(store, blobs, kms, config.service.clone()))
}

/// Periodically drop expired sessions.
pub fn spawn_session_sweeper(service: Arc<KeyService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let evicted = service.evict_expired();
            if evicted > 0 {
                debug!(evicted, "expired sessions swept");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_config_builds_in_memory_service() {
        let service = build_service(&ServerConfig::default()).await.unwrap();
        assert!(service.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_file_backed_storage() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.storage.database = Some(dir.path().join("catalog.db"));
        config.storage.blob_dir = Some(dir.path().join("blobs"));
        config.kms.master_key_hex = Some("11".repeat(32));

        build_service(&config).await.unwrap();
        assert!(dir.path().join("blobs").is_dir());
    }

    #[tokio::test]
    async fn test_bad_master_key_is_rejected() {
        let mut config = ServerConfig::default();
        config.kms.master_key_hex = Some("abcd".into());
        assert!(build_service(&config).await.is_err());
    }
}

//! In-process session store.
//!
//! Holds each session's server ephemeral secret, keyed by session id. The
//! store is injected into the service rather than being a global, and is
//! never persisted: a restart discards every session.
//!
//! Expiry is checked on every lookup. An expired entry is removed on the
//! spot, even though its secret would still be usable.

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use segvault_core::{Kek, SessionId, VideoId, X25519PublicKey, X25519Secret};

use crate::error::{Result, SessionError};
use crate::exchange::{derive_session_kek, ServerHello, SessionNonce};

/// Session lifetime policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Absolute lifetime from creation.
    pub ttl_ms: i64,
    /// Maximum gap between requests.
    pub idle_timeout_ms: i64,
    /// Upper bound on live sessions.
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 60 * 60 * 1000,
            idle_timeout_ms: 10 * 60 * 1000,
            max_sessions: 100_000,
        }
    }
}

/// One live playback session.
pub struct PlaybackSession {
    pub id: SessionId,
    pub video_id: VideoId,
    pub client_public: X25519PublicKey,
    pub server_public: X25519PublicKey,
    pub nonce: SessionNonce,
    pub created_at: i64,
    pub expires_at: i64,
    last_activity: AtomicI64,
    idle_timeout_ms: i64,
    server_secret: X25519Secret,
    handles: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl PlaybackSession {
    pub fn last_activity(&self) -> i64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at || now - self.last_activity() >= self.idle_timeout_ms
    }

    /// Recompute the session KEK from the server secret.
    pub fn kek(&self) -> Result<Kek> {
        let shared = self.server_secret.diffie_hellman(&self.client_public)?;
        derive_session_kek(
            &shared,
            &self.nonce,
            &self.id,
            &self.client_public,
            &self.server_public,
        )
    }

    /// Reject use of this session for another video.
    pub fn ensure_video(&self, video_id: &VideoId) -> Result<()> {
        if &self.video_id != video_id {
            return Err(SessionError::VideoMismatch(self.id));
        }
        Ok(())
    }

    /// Get a per-session cached handle, building it on first use.
    ///
    /// Handles (threshold clients, RPC clients) live exactly as long as the
    /// session and are dropped with it.
    pub fn handle_or_init<T, F>(&self, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let entry = self
            .handles
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(init()) as Arc<dyn Any + Send + Sync>)
            .value()
            .clone();
        match entry.downcast::<T>() {
            Ok(handle) => handle,
            // Keys are TypeIds, so a stored value always has type T.
            Err(_) => unreachable!("session handle stored under foreign TypeId"),
        }
    }

    fn hello(&self) -> ServerHello {
        ServerHello {
            session_id: self.id,
            server_public: self.server_public,
            nonce: self.nonce,
            expires_at: self.expires_at,
        }
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("id", &self.id)
            .field("video_id", &self.video_id)
            .field("expires_at", &self.expires_at)
            .field("last_activity", &self.last_activity())
            .finish_non_exhaustive()
    }
}

/// Concurrent map from session id to live session.
///
/// Sharded, so requests for different sessions never contend on one lock.
pub struct SessionStore {
    config: SessionConfig,
    sessions: DashMap<SessionId, Arc<PlaybackSession>>,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Server half of the exchange: mint an ephemeral key and nonce.
    pub fn create(
        &self,
        video_id: VideoId,
        client_public: X25519PublicKey,
        now: i64,
    ) -> Result<ServerHello> {
        if self.sessions.len() >= self.config.max_sessions {
            self.evict_expired(now);
            if self.sessions.len() >= self.config.max_sessions {
                return Err(SessionError::CapacityExceeded(self.config.max_sessions));
            }
        }

        let server_secret = X25519Secret::generate();
        let session = Arc::new(PlaybackSession {
            id: SessionId::generate(),
            video_id,
            client_public,
            server_public: server_secret.public_key(),
            nonce: SessionNonce::generate(),
            created_at: now,
            expires_at: now.saturating_add(self.config.ttl_ms),
            last_activity: AtomicI64::new(now),
            idle_timeout_ms: self.config.idle_timeout_ms,
            server_secret,
            handles: DashMap::new(),
        });
        // Reject low-order client keys before the session is visible.
        session.kek()?;

        let hello = session.hello();
        debug!(session_id = %session.id, video_id = %session.video_id, "session created");
        self.sessions.insert(session.id, session);
        Ok(hello)
    }

    /// Look up a live session, rejecting and evicting it if expired.
    pub fn get_active(&self, id: &SessionId, now: i64) -> Result<Arc<PlaybackSession>> {
        let session = self
            .sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(SessionError::NotFound(*id))?;

        if session.is_expired(now) {
            self.sessions.remove(id);
            debug!(session_id = %id, "session expired on access");
            return Err(SessionError::Expired(*id));
        }
        Ok(session)
    }

    /// Look up a live session and record activity.
    pub fn touch(&self, id: &SessionId, now: i64) -> Result<Arc<PlaybackSession>> {
        let session = self.get_active(id, now)?;
        session.last_activity.fetch_max(now, Ordering::Relaxed);
        Ok(session)
    }

    /// Discard a session explicitly. Returns whether it existed.
    pub fn remove(&self, id: &SessionId) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn evict_expired(&self, now: i64) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(now));
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            debug!(evicted, "expired sessions evicted");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ClientHandshake;

    fn video() -> VideoId {
        VideoId::new("v1").unwrap()
    }

    fn short_config() -> SessionConfig {
        SessionConfig {
            ttl_ms: 1_000,
            idle_timeout_ms: 500,
            max_sessions: 4,
        }
    }

    #[test]
    fn test_client_and_server_agree_on_kek() {
        let store = SessionStore::default();
        let client = ClientHandshake::generate();

        let hello = store.create(video(), client.public_key(), 0).unwrap();
        let client_kek = client.complete(&hello).unwrap();
        let server_kek = store.get_active(&hello.session_id, 1).unwrap().kek().unwrap();

        assert_eq!(client_kek.as_bytes(), server_kek.as_bytes());
    }

    #[test]
    fn test_expired_session_rejected_and_evicted() {
        let store = SessionStore::new(short_config());
        let client = ClientHandshake::generate();
        let hello = store.create(video(), client.public_key(), 0).unwrap();

        store.touch(&hello.session_id, 400).unwrap();
        store.touch(&hello.session_id, 800).unwrap();

        let err = store.get_active(&hello.session_id, 1_000).unwrap_err();
        assert!(matches!(err, SessionError::Expired(_)));

        // Evicted on access: a second lookup no longer finds it.
        let err = store.get_active(&hello.session_id, 1_000).unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[test]
    fn test_idle_timeout() {
        let store = SessionStore::new(short_config());
        let hello = store
            .create(video(), ClientHandshake::generate().public_key(), 0)
            .unwrap();
        assert!(matches!(
            store.get_active(&hello.session_id, 600),
            Err(SessionError::Expired(_))
        ));
    }

    #[test]
    fn test_fresh_session_has_fresh_kek_for_same_client_key() {
        let store = SessionStore::new(short_config());
        let client = ClientHandshake::generate();

        let first = store.create(video(), client.public_key(), 0).unwrap();
        let k1 = client.complete(&first).unwrap();
        assert_eq!(store.evict_expired(5_000), 1);

        let second = store.create(video(), client.public_key(), 5_000).unwrap();
        let k2 = client.complete(&second).unwrap();

        assert_ne!(first.session_id, second.session_id);
        assert_ne!(k1.as_bytes(), k2.as_bytes());
        assert!(store.get_active(&first.session_id, 5_001).is_err());
    }

    #[test]
    fn test_capacity_reclaims_expired_first() {
        let store = SessionStore::new(short_config());
        for _ in 0..4 {
            store
                .create(video(), ClientHandshake::generate().public_key(), 0)
                .unwrap();
        }
        assert!(matches!(
            store.create(video(), ClientHandshake::generate().public_key(), 10),
            Err(SessionError::CapacityExceeded(4))
        ));

        store
            .create(video(), ClientHandshake::generate().public_key(), 2_000)
            .unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_video_binding() {
        let store = SessionStore::default();
        let hello = store
            .create(video(), ClientHandshake::generate().public_key(), 0)
            .unwrap();
        let session = store.get_active(&hello.session_id, 1).unwrap();
        assert!(session.ensure_video(&video()).is_ok());
        assert!(session.ensure_video(&VideoId::new("v2").unwrap()).is_err());
    }

    #[test]
    fn test_handle_built_once_per_session() {
        use std::sync::atomic::AtomicUsize;

        let store = SessionStore::default();
        let hello = store
            .create(video(), ClientHandshake::generate().public_key(), 0)
            .unwrap();
        let session = store.get_active(&hello.session_id, 1).unwrap();

        let builds = AtomicUsize::new(0);
        let a: Arc<String> = session.handle_or_init(|| {
            builds.fetch_add(1, Ordering::SeqCst);
            "client".to_string()
        });
        let b: Arc<String> = session.handle_or_init(|| {
            builds.fetch_add(1, Ordering::SeqCst);
            "other".to_string()
        });
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_sessions_do_not_interfere() {
        let store = Arc::new(SessionStore::default());
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let store = store.clone();
                scope.spawn(move || {
                    for _ in 0..50 {
                        let client = ClientHandshake::generate();
                        let hello = store.create(video(), client.public_key(), 0).unwrap();
                        let server = store.touch(&hello.session_id, 1).unwrap().kek().unwrap();
                        assert_eq!(client.complete(&hello).unwrap().as_bytes(), server.as_bytes());
                        assert!(store.remove(&hello.session_id));
                    }
                });
            }
        });
        assert!(store.is_empty());
    }
}

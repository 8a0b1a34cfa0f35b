//! Parallel segment decryption.
//!
//! A fixed set of worker threads pulls jobs from bounded per-worker queues,
//! so AES-GCM work never runs on the async runtime. Dispatch is
//! round-robin; a full or closed queue moves the job to the next worker,
//! and when every queue refuses it the caller decrypts inline. Playback
//! never stalls on a saturated pool.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use segvault_core::{Dek, SegmentIv};

use crate::config::PipelineConfig;
use crate::error::{Result, ServiceError};

type Reply = (u64, Result<Vec<u8>>);

struct Job {
    id: u64,
    dek: Dek,
    iv: SegmentIv,
    ciphertext: Bytes,
    reply: oneshot::Sender<Reply>,
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    completed: AtomicU64,
    inline: AtomicU64,
    lost_replies: AtomicU64,
}

/// Snapshot of pool activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Jobs accepted by a worker queue.
    pub dispatched: u64,
    /// Jobs a worker finished.
    pub completed: u64,
    /// Jobs decrypted on the calling task.
    pub inline: u64,
    /// Dispatched jobs whose reply never arrived.
    pub lost_replies: u64,
}

/// Worker pool for segment decryption.
pub struct DecryptionPool {
    queues: Vec<mpsc::Sender<Job>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next_worker: AtomicUsize,
    next_id: AtomicU64,
    counters: Arc<Counters>,
}

impl DecryptionPool {
    /// Spawn `config.workers` threads. Zero workers decrypts everything inline.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let counters = Arc::new(Counters::default());
        let depth = config.queue_depth.max(1);
        let mut queues = Vec::with_capacity(config.workers);
        let mut workers = Vec::with_capacity(config.workers);

        for index in 0..config.workers {
            let (tx, rx) = mpsc::channel(depth);
            let counters = counters.clone();
            let handle = thread::Builder::new()
                .name(format!("segvault-decrypt-{index}"))
                .spawn(move || run_worker(index, rx, counters))
                .map_err(|e| ServiceError::Unavailable(format!("spawn decrypt worker: {e}")))?;
            queues.push(tx);
            workers.push(handle);
        }
        debug!(workers = config.workers, queue_depth = depth, "decryption pool started");

        Ok(Self {
            queues,
            workers: Mutex::new(workers),
            next_worker: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
            counters,
        })
    }

    pub fn workers(&self) -> usize {
        self.queues.len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            inline: self.counters.inline.load(Ordering::Relaxed),
            lost_replies: self.counters.lost_replies.load(Ordering::Relaxed),
        }
    }

    /// Decrypt one segment.
    ///
    /// Tag failures surface as [`ServiceError::Crypto`] whichever path ran.
    ///
    /// `ciphertext` is only read, never consumed or mutated. Workers and the
    /// inline fallback share the same [`Bytes`] allocation, so a caller that
    /// keeps a clone can retry with identical input after a failure.
    pub async fn decrypt(&self, dek: Dek, iv: SegmentIv, ciphertext: Bytes) -> Result<Vec<u8>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let n = self.queues.len();
        if n == 0 {
            return self.decrypt_inline(&dek, &iv, &ciphertext);
        }

        let (reply, receiver) = oneshot::channel();
        let mut job = Job {
            id,
            dek: dek.clone(),
            iv,
            ciphertext: ciphertext.clone(),
            reply,
        };
        let start = self.next_worker.fetch_add(1, Ordering::Relaxed);
        for attempt in 0..n {
            match self.queues[(start + attempt) % n].try_send(job) {
                Ok(()) => {
                    self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                    return self.await_reply(id, receiver, &dek, &iv, &ciphertext).await;
                }
                Err(TrySendError::Full(back)) | Err(TrySendError::Closed(back)) => job = back,
            }
        }

        debug!(job = id, "all decrypt queues busy, decrypting inline");
        self.decrypt_inline(&job.dek, &job.iv, &job.ciphertext)
    }

    async fn await_reply(
        &self,
        id: u64,
        receiver: oneshot::Receiver<Reply>,
        dek: &Dek,
        iv: &SegmentIv,
        ciphertext: &Bytes,
    ) -> Result<Vec<u8>> {
        match receiver.await {
            Ok((reply_id, result)) if reply_id == id => result,
            Ok((reply_id, _)) => {
                warn!(job = id, reply = reply_id, "mismatched decrypt reply, decrypting inline");
                self.counters.lost_replies.fetch_add(1, Ordering::Relaxed);
                self.decrypt_inline(dek, iv, ciphertext)
            }
            Err(_) => {
                warn!(job = id, "decrypt worker dropped job, decrypting inline");
                self.counters.lost_replies.fetch_add(1, Ordering::Relaxed);
                self.decrypt_inline(dek, iv, ciphertext)
            }
        }
    }

    fn decrypt_inline(&self, dek: &Dek, iv: &SegmentIv, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.counters.inline.fetch_add(1, Ordering::Relaxed);
        Ok(dek.decrypt_segment(ciphertext, iv)?)
    }

    /// Close the queues and wait for workers to drain them.
    pub fn shutdown(mut self) {
        self.queues.clear();
        let handles = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            if handle.join().is_err() {
                warn!("decrypt worker panicked");
            }
        }
        debug!("decryption pool stopped");
    }
}

fn run_worker(index: usize, mut jobs: mpsc::Receiver<Job>, counters: Arc<Counters>) {
    while let Some(job) = jobs.blocking_recv() {
        let result = job
            .dek
            .decrypt_segment(&job.ciphertext, &job.iv)
            .map_err(ServiceError::from);
        counters.completed.fetch_add(1, Ordering::Relaxed);
        // The caller may have gone away; nothing to do then.
        let _ = job.reply.send((job.id, result));
    }
    debug!(worker = index, "decrypt worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encrypt(plaintext: &[u8]) -> (Dek, SegmentIv, Bytes) {
        let dek = Dek::generate();
        let iv = SegmentIv::generate();
        let ciphertext = dek.encrypt_segment(plaintext, &iv).unwrap();
        (dek, iv, Bytes::from(ciphertext))
    }

    #[tokio::test]
    async fn test_pool_decrypts() {
        let pool = DecryptionPool::new(&PipelineConfig::default()).unwrap();
        let (dek, iv, ct) = encrypt(b"segment payload");
        assert_eq!(pool.decrypt(dek, iv, ct).await.unwrap(), b"segment payload");
        let stats = pool.stats();
        assert_eq!(stats.dispatched + stats.inline, 1);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_zero_workers_is_inline() {
        let pool = DecryptionPool::new(&PipelineConfig {
            workers: 0,
            queue_depth: 4,
        })
        .unwrap();
        let (dek, iv, ct) = encrypt(b"inline");
        assert_eq!(pool.decrypt(dek, iv, ct).await.unwrap(), b"inline");
        assert_eq!(pool.stats().inline, 1);
        assert_eq!(pool.stats().dispatched, 0);
    }

    #[tokio::test]
    async fn test_tag_failure_is_crypto_error() {
        let pool = DecryptionPool::new(&PipelineConfig::default()).unwrap();
        let (dek, iv, ct) = encrypt(b"payload");
        let mut tampered = ct.to_vec();
        tampered[0] ^= 0x01;
        let result = pool.decrypt(dek, iv, Bytes::from(tampered)).await;
        assert!(matches!(result, Err(ServiceError::Crypto(_))));
    }

    #[tokio::test]
    async fn test_failed_decrypt_leaves_input_reusable() {
        let pool = DecryptionPool::new(&PipelineConfig::default()).unwrap();
        let (dek, iv, ct) = encrypt(b"retry me");
        let snapshot = ct.to_vec();

        let wrong = pool.decrypt(Dek::generate(), iv, ct.clone()).await;
        assert!(matches!(wrong, Err(ServiceError::Crypto(_))));
        assert_eq!(ct.as_ref(), snapshot.as_slice());

        assert_eq!(pool.decrypt(dek, iv, ct).await.unwrap(), b"retry me");
        pool.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_saturated_pool_still_completes_every_job() {
        let pool = Arc::new(
            DecryptionPool::new(&PipelineConfig {
                workers: 2,
                queue_depth: 1,
            })
            .unwrap(),
        );

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..64u32 {
            let pool = pool.clone();
            tasks.spawn(async move {
                let plaintext = i.to_be_bytes().repeat(1024);
                let (dek, iv, ct) = encrypt(&plaintext);
                let out = pool.decrypt(dek, iv, ct).await.unwrap();
                assert_eq!(out, plaintext);
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.lost_replies, 0);
        assert_eq!(stats.dispatched + stats.inline, 64);
    }
}

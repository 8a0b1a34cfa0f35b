//! Payment and subscription ledger lookups.

use std::sync::Arc;

use async_trait::async_trait;

use segvault_core::{ChainId, VideoId, WalletAddress};
use segvault_store::{AccessRecord, Store};

use crate::error::Result;

/// Read-only view of settled payments and subscriptions.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    async fn lookup(
        &self,
        video_id: &VideoId,
        payer: &WalletAddress,
        chain: &ChainId,
    ) -> Result<Option<AccessRecord>>;
}

/// A ledger backed by the access records in a [`Store`].
pub struct StoreLedger<S: Store + ?Sized> {
    store: Arc<S>,
}

impl<S: Store + ?Sized> StoreLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: Store + ?Sized> Clone for StoreLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

#[async_trait]
impl<S: Store + ?Sized> PaymentLedger for StoreLedger<S> {
    async fn lookup(
        &self,
        video_id: &VideoId,
        payer: &WalletAddress,
        chain: &ChainId,
    ) -> Result<Option<AccessRecord>> {
        Ok(self.store.get_access_record(video_id, payer, chain).await?)
    }
}

//! Test utilities and mock implementations.
//!
//! This module provides in-memory implementations of the remote store so the
//! reconciliation layer can be exercised without a backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use complaint_sync_client::{
    Aggregate, BulkFetch, ClientError, ComplaintId, ComplaintRecord, ComplaintStatus,
    RemoteStore, Result as ClientResult,
};
use tokio::sync::{Notify, RwLock};

/// Mock remote store that serves complaints from memory.
#[derive(Default)]
pub struct MockRemoteStore {
    complaints: RwLock<Vec<ComplaintRecord>>,
    aggregate: RwLock<Option<Aggregate>>,
    fail_fetch: RwLock<bool>,
    fail_update: RwLock<bool>,
    /// When set, bulk fetches wait for a permit before answering.
    fetch_gate: RwLock<Option<Arc<Notify>>>,
    /// When set, status updates wait for a permit before answering.
    update_gate: RwLock<Option<Arc<Notify>>>,
    fetch_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl MockRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_complaints(&self, records: Vec<ComplaintRecord>) {
        *self.complaints.write().await = records;
    }

    /// Pair every bulk fetch with this aggregate.
    pub async fn set_aggregate(&self, aggregate: Option<Aggregate>) {
        *self.aggregate.write().await = aggregate;
    }

    pub async fn set_fail_fetch(&self, fail: bool) {
        *self.fail_fetch.write().await = fail;
    }

    pub async fn set_fail_update(&self, fail: bool) {
        *self.fail_update.write().await = fail;
    }

    /// Hold bulk fetches until the returned gate is notified.
    pub async fn hold_fetches(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.fetch_gate.write().await = Some(Arc::clone(&gate));
        gate
    }

    /// Hold status updates until the returned gate is notified.
    pub async fn hold_updates(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.update_gate.write().await = Some(Arc::clone(&gate));
        gate
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Yield until at least `count` bulk fetches have started.
    pub async fn wait_for_fetches(&self, count: usize) {
        while self.fetch_count() < count {
            tokio::task::yield_now().await;
        }
    }

    /// Yield until at least `count` status updates have started.
    pub async fn wait_for_updates(&self, count: usize) {
        while self.update_count() < count {
            tokio::task::yield_now().await;
        }
    }

    fn unavailable() -> ClientError {
        ClientError::Status {
            status: 503,
            body: "backend unavailable".to_string(),
        }
    }
}

#[async_trait]
impl RemoteStore for MockRemoteStore {
    async fn fetch_complaints(&self) -> ClientResult<BulkFetch> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.fetch_gate.read().await.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if *self.fail_fetch.read().await {
            return Err(Self::unavailable());
        }
        Ok(BulkFetch {
            records: self.complaints.read().await.clone(),
            aggregate: self.aggregate.read().await.clone(),
        })
    }

    async fn fetch_aggregate(&self) -> ClientResult<Aggregate> {
        if *self.fail_fetch.read().await {
            return Err(Self::unavailable());
        }
        if let Some(aggregate) = self.aggregate.read().await.clone() {
            return Ok(aggregate);
        }
        Ok(Aggregate::from_records(self.complaints.read().await.iter()))
    }

    async fn update_status(
        &self,
        id: &ComplaintId,
        status: ComplaintStatus,
    ) -> ClientResult<ComplaintRecord> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.update_gate.read().await.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if *self.fail_update.read().await {
            return Err(ClientError::Status {
                status: 500,
                body: "status update rejected".to_string(),
            });
        }

        let mut complaints = self.complaints.write().await;
        match complaints.iter_mut().find(|r| &r.id == id) {
            Some(existing) => {
                existing.status = status;
                Ok(existing.clone())
            }
            None => {
                let record = ComplaintRecord::new(id.clone(), status);
                complaints.push(record.clone());
                Ok(record)
            }
        }
    }
}

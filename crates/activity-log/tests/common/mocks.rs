// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Store doubles for exercising failure and batching behaviour

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use activity_log::query::Predicate;
use activity_log::store::FindOptions;
use activity_log::{EventKind, LogRecord, LogStore, MemoryStore, RecordId, StoreError, StoredRecord};
use async_trait::async_trait;

/// Memory store that remembers the size of every bulk write and can be told
/// to reject the next few of them.
#[derive(Debug, Default)]
#[allow(dead_code)]
pub struct RecordingStore {
    inner: MemoryStore,
    batch_sizes: Mutex<Vec<usize>>,
    single_writes: AtomicUsize,
    failing_bulk_writes: AtomicUsize,
}

#[allow(dead_code)]
impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the next `count` bulk writes.
    pub fn fail_next_bulk_writes(&self, count: usize) {
        self.failing_bulk_writes.store(count, Ordering::SeqCst);
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    pub fn single_writes(&self) -> usize {
        self.single_writes.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<StoredRecord> {
        self.inner.snapshot().unwrap()
    }
}

#[async_trait]
impl LogStore for RecordingStore {
    async fn insert_one(&self, record: LogRecord) -> Result<RecordId, StoreError> {
        self.single_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_one(record).await
    }

    async fn insert_many(&self, records: Vec<LogRecord>) -> Result<Vec<RecordId>, StoreError> {
        let failing = self
            .failing_bulk_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Write("injected bulk failure".to_string()));
        }
        self.batch_sizes.lock().unwrap().push(records.len());
        self.inner.insert_many(records).await
    }

    async fn find(
        &self,
        predicate: &Predicate,
        options: FindOptions,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        self.inner.find(predicate, options).await
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64, StoreError> {
        self.inner.count(predicate).await
    }

    async fn get(&self, id: &RecordId) -> Result<Option<StoredRecord>, StoreError> {
        self.inner.get(id).await
    }

    async fn count_by_event(
        &self,
        predicate: &Predicate,
    ) -> Result<HashMap<EventKind, u64>, StoreError> {
        self.inner.count_by_event(predicate).await
    }

    async fn delete_matching(&self, predicate: &Predicate) -> Result<u64, StoreError> {
        self.inner.delete_matching(predicate).await
    }
}

/// Store whose every operation fails as if the database were unreachable.
#[allow(dead_code)]
pub struct UnreachableStore;

#[async_trait]
impl LogStore for UnreachableStore {
    async fn insert_one(&self, _record: LogRecord) -> Result<RecordId, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn insert_many(&self, _records: Vec<LogRecord>) -> Result<Vec<RecordId>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn find(
        &self,
        _predicate: &Predicate,
        _options: FindOptions,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn count(&self, _predicate: &Predicate) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn get(&self, _id: &RecordId) -> Result<Option<StoredRecord>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn count_by_event(
        &self,
        _predicate: &Predicate,
    ) -> Result<HashMap<EventKind, u64>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn delete_matching(&self, _predicate: &Predicate) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

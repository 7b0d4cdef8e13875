// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Durable log store port and an in-process implementation.
//!
//! The pipeline and the repository only talk to [`LogStore`]. A production
//! deployment backs it with an append-only document database holding one
//! document per record and the indexes listed in [`REQUIRED_INDEXES`].
//! [`MemoryStore`] keeps everything in a vector and is what the server binary
//! and the tests use.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::query::Predicate;
use crate::record::{EventKind, LogRecord, RecordId, StoredRecord};

/// Collection the records live in.
pub const COLLECTION_NAME: &str = "user_logs";

/// Sort direction of an index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrder {
    Ascending,
    Descending,
}

/// Index a backing store must maintain for the read queries to stay cheap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub keys: &'static [(&'static str, IndexOrder)],
}

pub const REQUIRED_INDEXES: &[IndexSpec] = &[
    IndexSpec {
        keys: &[("user_id", IndexOrder::Ascending)],
    },
    IndexSpec {
        keys: &[("event", IndexOrder::Ascending)],
    },
    IndexSpec {
        keys: &[("timestamp", IndexOrder::Descending)],
    },
    IndexSpec {
        keys: &[
            ("user_id", IndexOrder::Ascending),
            ("timestamp", IndexOrder::Descending),
        ],
    },
];

/// Window into a sorted result set. Results are always newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FindOptions {
    pub skip: usize,
    /// `None` returns everything after `skip`.
    pub limit: Option<usize>,
}

#[async_trait]
pub trait LogStore: Send + Sync {
    /// Writes one record and returns its identifier.
    async fn insert_one(&self, record: LogRecord) -> Result<RecordId, StoreError>;

    /// Writes every record in one bulk operation.
    async fn insert_many(&self, records: Vec<LogRecord>) -> Result<Vec<RecordId>, StoreError>;

    /// Records matching `predicate`, sorted by timestamp descending.
    async fn find(
        &self,
        predicate: &Predicate,
        options: FindOptions,
    ) -> Result<Vec<StoredRecord>, StoreError>;

    async fn count(&self, predicate: &Predicate) -> Result<u64, StoreError>;

    async fn get(&self, id: &RecordId) -> Result<Option<StoredRecord>, StoreError>;

    /// Occurrences per event kind among records matching `predicate`.
    /// Kinds with no occurrence are absent from the map.
    async fn count_by_event(
        &self,
        predicate: &Predicate,
    ) -> Result<HashMap<EventKind, u64>, StoreError>;

    /// Deletes records matching `predicate` and returns how many were removed.
    async fn delete_matching(&self, predicate: &Predicate) -> Result<u64, StoreError>;

    /// Creates the indexes in [`REQUIRED_INDEXES`] if the backend needs them.
    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// In-process store backed by a vector.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<StoredRecord>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.records.read().map_err(|_| StoreError::Poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Every record in insertion order.
    pub fn snapshot(&self) -> Result<Vec<StoredRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .clone())
    }

    fn store(record: LogRecord) -> StoredRecord {
        StoredRecord::new(RecordId::new(Uuid::new_v4().simple().to_string()), record, Utc::now())
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn insert_one(&self, record: LogRecord) -> Result<RecordId, StoreError> {
        let stored = Self::store(record);
        let id = stored.id.clone();
        self.records
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .push(stored);
        Ok(id)
    }

    async fn insert_many(&self, records: Vec<LogRecord>) -> Result<Vec<RecordId>, StoreError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let stored: Vec<StoredRecord> = records.into_iter().map(Self::store).collect();
        let ids = stored.iter().map(|record| record.id.clone()).collect();
        self.records
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .extend(stored);
        Ok(ids)
    }

    async fn find(
        &self,
        predicate: &Predicate,
        options: FindOptions,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let mut matched: Vec<StoredRecord> = self
            .records
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .iter()
            .filter(|record| predicate.matches(record))
            .cloned()
            .collect();
        // stable sort keeps insertion order among equal timestamps
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let page = matched.into_iter().skip(options.skip);
        Ok(match options.limit {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        })
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.iter().filter(|record| predicate.matches(record)).count() as u64)
    }

    async fn get(&self, id: &RecordId) -> Result<Option<StoredRecord>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.iter().find(|record| &record.id == id).cloned())
    }

    async fn count_by_event(
        &self,
        predicate: &Predicate,
    ) -> Result<HashMap<EventKind, u64>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        let mut histogram = HashMap::new();
        for record in records.iter().filter(|record| predicate.matches(record)) {
            *histogram.entry(record.event).or_insert(0) += 1;
        }
        Ok(histogram)
    }

    async fn delete_matching(&self, predicate: &Predicate) -> Result<u64, StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        let before = records.len();
        records.retain(|record| !predicate.matches(record));
        Ok((before - records.len()) as u64)
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        debug!(
            "ACTIVITY_LOG | Memory store scans {} directly, skipping {} index definitions",
            COLLECTION_NAME,
            REQUIRED_INDEXES.len()
        );
        Ok(())
    }
}

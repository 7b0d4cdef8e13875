// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Read side of the activity log, plus direct writes and retention.
//!
//! Paged reads issue a count and a find with the same predicate. The two are
//! not snapshot-consistent: a record ingested between them can make `total`
//! disagree with the page contents.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::constants::{FALLBACK_WRITE_TIMEOUT, RECENT_ACTIVITY_LIMIT};
use crate::error::QueryError;
use crate::pipeline::flusher::write_one;
use crate::query::{ListResponse, LogFilter, PageRequest, Predicate};
use crate::record::{EventKind, LogRecord, RecordId, StoredRecord};
use crate::store::{FindOptions, LogStore};

#[derive(Clone)]
pub struct ActivityLog {
    store: Arc<dyn LogStore>,
    write_timeout: Duration,
}

impl std::fmt::Debug for ActivityLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLog")
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}

impl ActivityLog {
    #[must_use]
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self {
            store,
            write_timeout: FALLBACK_WRITE_TIMEOUT,
        }
    }

    /// Writes one record synchronously, bypassing the ingestion queue.
    pub async fn create(&self, record: LogRecord) -> Result<RecordId, QueryError> {
        let record = record.stamped(Utc::now());
        write_one(self.store.as_ref(), record, self.write_timeout)
            .await
            .map_err(QueryError::store("create log"))
    }

    /// `Ok(None)` when no record has this id.
    pub async fn get_by_id(&self, id: &RecordId) -> Result<Option<StoredRecord>, QueryError> {
        self.store
            .get(id)
            .await
            .map_err(QueryError::store("get log"))
    }

    /// One page of the records matching `filter`, newest first.
    pub async fn list(
        &self,
        filter: &LogFilter,
        page: PageRequest,
    ) -> Result<ListResponse, QueryError> {
        self.paged(&Predicate::from_filter(filter), page).await
    }

    /// Like [`list`](Self::list), additionally requiring `term` to appear in the
    /// event kind, action or error text. Matching ignores case.
    pub async fn search(
        &self,
        term: &str,
        filter: &LogFilter,
        page: PageRequest,
    ) -> Result<ListResponse, QueryError> {
        let predicate = Predicate::from_filter(filter).and_search(term);
        self.paged(&predicate, page).await
    }

    pub async fn list_by_actor(
        &self,
        actor: Uuid,
        page: PageRequest,
    ) -> Result<ListResponse, QueryError> {
        self.paged(&Predicate::all().and_actor(actor), page).await
    }

    pub async fn list_by_event(
        &self,
        kind: EventKind,
        page: PageRequest,
    ) -> Result<ListResponse, QueryError> {
        self.paged(&Predicate::all().and_event(kind), page).await
    }

    pub async fn count(&self, filter: &LogFilter) -> Result<u64, QueryError> {
        self.store
            .count(&Predicate::from_filter(filter))
            .await
            .map_err(QueryError::store("count logs"))
    }

    /// The actor's most recent records within the trailing `days`, newest first, at most 50.
    pub async fn recent_activity(
        &self,
        actor: Uuid,
        days: u32,
    ) -> Result<Vec<StoredRecord>, QueryError> {
        let predicate = Predicate::all()
            .and_actor(actor)
            .and_since(days_ago(Utc::now(), days));
        self.store
            .find(
                &predicate,
                FindOptions {
                    skip: 0,
                    limit: Some(RECENT_ACTIVITY_LIMIT),
                },
            )
            .await
            .map_err(QueryError::store("get user activity"))
    }

    /// Occurrences per event kind over the trailing `days`, optionally for one actor.
    ///
    /// Kinds that did not occur are absent from the map.
    pub async fn event_stats(
        &self,
        actor: Option<Uuid>,
        days: u32,
    ) -> Result<HashMap<EventKind, u64>, QueryError> {
        let mut predicate = Predicate::all().and_since(days_ago(Utc::now(), days));
        if let Some(actor) = actor {
            predicate = predicate.and_actor(actor);
        }
        let mut stats = self
            .store
            .count_by_event(&predicate)
            .await
            .map_err(QueryError::store("aggregate event stats"))?;
        stats.retain(|_, count| *count > 0);
        Ok(stats)
    }

    /// Deletes every record older than `days` and returns how many went.
    pub async fn delete_older_than(&self, days: u32) -> Result<u64, QueryError> {
        let cutoff = days_ago(Utc::now(), days);
        let deleted = self
            .store
            .delete_matching(&Predicate::all().and_before(cutoff))
            .await
            .map_err(QueryError::store("delete old logs"))?;
        debug!("ACTIVITY_LOG | Deleted {deleted} records older than {cutoff}");
        Ok(deleted)
    }

    async fn paged(
        &self,
        predicate: &Predicate,
        page: PageRequest,
    ) -> Result<ListResponse, QueryError> {
        let total = self
            .store
            .count(predicate)
            .await
            .map_err(QueryError::store("count logs"))?;
        let records = self
            .store
            .find(
                predicate,
                FindOptions {
                    skip: page.offset(),
                    limit: Some(page.limit()),
                },
            )
            .await
            .map_err(QueryError::store("find logs"))?;
        Ok(ListResponse::new(records, total, page))
    }
}

/// Start of a trailing window of `days`, clamped to the earliest representable instant.
fn days_ago(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    chrono::Duration::try_days(i64::from(days))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Filter, search, and pagination building blocks for reading the log store.
//!
//! A [`LogFilter`] is turned into a [`Predicate`]: a conjunction of
//! [`Clause`]s, one per supplied field. Absent fields add no clause. The
//! search variant appends a single [`Clause::AnyContains`] that matches when
//! the term appears (case-insensitively) in the event kind, the action, or the
//! error text.
//!
//! Stores either evaluate a predicate directly with [`Predicate::matches`] or
//! translate its [`clauses`](Predicate::clauses) into their own query language.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_LOOKBACK_DAYS, MAX_PAGE_SIZE};
use crate::record::{EventKind, StoredRecord};

/// Caller-supplied constraints. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub actor_id: Option<Uuid>,
    pub event: Option<EventKind>,
    /// Case-insensitive substring of `data.action`.
    pub action: Option<String>,
    /// Case-insensitive substring of the client address.
    pub client_address: Option<String>,
    /// Inclusive lower bound on the event timestamp.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the event timestamp.
    pub end: Option<DateTime<Utc>>,
}

/// One condition of a [`Predicate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    Actor(Uuid),
    Event(EventKind),
    /// Lowercased needle matched against the lowercased action.
    ActionContains(String),
    /// Lowercased needle matched against the lowercased client address.
    AddressContains(String),
    TimeRange {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
    /// Strictly earlier than the cutoff.
    Before(DateTime<Utc>),
    /// Lowercased needle matched against event kind, action, or error text.
    AnyContains(String),
}

impl Clause {
    fn matches(&self, record: &StoredRecord) -> bool {
        match self {
            Clause::Actor(actor) => record.user_id == Some(*actor),
            Clause::Event(kind) => record.event == *kind,
            Clause::ActionContains(needle) => contains_ci(&record.data.action, needle),
            Clause::AddressContains(needle) => record
                .ip_address
                .as_deref()
                .is_some_and(|address| contains_ci(address, needle)),
            Clause::TimeRange { start, end } => {
                start.map_or(true, |start| record.timestamp >= start)
                    && end.map_or(true, |end| record.timestamp <= end)
            }
            Clause::Before(cutoff) => record.timestamp < *cutoff,
            Clause::AnyContains(needle) => {
                contains_ci(record.event.as_str(), needle)
                    || contains_ci(&record.data.action, needle)
                    || record
                        .data
                        .error
                        .as_deref()
                        .is_some_and(|error| contains_ci(error, needle))
            }
        }
    }
}

/// `needle` must already be lowercase.
fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Conjunction of clauses. An empty predicate matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    /// Predicate matching every record.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// ANDs every field present in `filter`.
    #[must_use]
    pub fn from_filter(filter: &LogFilter) -> Self {
        let mut predicate = Predicate::all();
        if let Some(actor) = filter.actor_id {
            predicate.clauses.push(Clause::Actor(actor));
        }
        if let Some(kind) = filter.event {
            predicate.clauses.push(Clause::Event(kind));
        }
        if let Some(action) = non_empty(filter.action.as_deref()) {
            predicate.clauses.push(Clause::ActionContains(action));
        }
        if let Some(address) = non_empty(filter.client_address.as_deref()) {
            predicate.clauses.push(Clause::AddressContains(address));
        }
        if filter.start.is_some() || filter.end.is_some() {
            predicate.clauses.push(Clause::TimeRange {
                start: filter.start,
                end: filter.end,
            });
        }
        predicate
    }

    /// Adds the free-text search clause. A blank term adds nothing.
    #[must_use]
    pub fn and_search(mut self, term: &str) -> Self {
        if let Some(term) = non_empty(Some(term)) {
            self.clauses.push(Clause::AnyContains(term));
        }
        self
    }

    #[must_use]
    pub fn and_actor(mut self, actor: Uuid) -> Self {
        self.clauses.push(Clause::Actor(actor));
        self
    }

    #[must_use]
    pub fn and_event(mut self, kind: EventKind) -> Self {
        self.clauses.push(Clause::Event(kind));
        self
    }

    /// Records at or after `since`.
    #[must_use]
    pub fn and_since(mut self, since: DateTime<Utc>) -> Self {
        self.clauses.push(Clause::TimeRange {
            start: Some(since),
            end: None,
        });
        self
    }

    /// Records strictly before `cutoff`.
    #[must_use]
    pub fn and_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.clauses.push(Clause::Before(cutoff));
        self
    }

    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    #[must_use]
    pub fn matches(&self, record: &StoredRecord) -> bool {
        self.clauses.iter().all(|clause| clause.matches(record))
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_lowercase)
}

/// Normalised page coordinates. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Page 0 becomes 1; a page size outside `1..=100` becomes the default of 10.
    #[must_use]
    pub fn new(page: u32, page_size: u32) -> Self {
        let page = page.max(1);
        let page_size = if (1..=MAX_PAGE_SIZE).contains(&page_size) {
            page_size
        } else {
            DEFAULT_PAGE_SIZE
        };
        Self { page, page_size }
    }

    #[must_use]
    pub fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of records to skip.
    #[must_use]
    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.page_size as usize
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.page_size as usize
    }
}

#[must_use]
pub fn total_pages(total: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    u32::try_from(total.div_ceil(u64::from(page_size))).unwrap_or(u32::MAX)
}

/// One page of records plus the count of everything matching.
///
/// `total` comes from a separate count query and may disagree with the page
/// contents if records were ingested between the two queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListResponse {
    pub records: Vec<StoredRecord>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl ListResponse {
    #[must_use]
    pub fn new(records: Vec<StoredRecord>, total: u64, page: PageRequest) -> Self {
        Self {
            records,
            total,
            page: page.page(),
            page_size: page.page_size(),
            total_pages: total_pages(total, page.page_size()),
        }
    }
}

/// Query-string parameters after lenient parsing.
///
/// Parameters that fail to parse are dropped (logged at debug) and impose no
/// constraint; unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterParams {
    pub filter: LogFilter,
    pub page: PageRequest,
    pub search: Option<String>,
    /// Trailing window in `1..=365` days; anything else is dropped.
    pub days: Option<u32>,
}

impl FilterParams {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = FilterParams::default();
        let mut page = 1;
        let mut page_size = DEFAULT_PAGE_SIZE;

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            if value.is_empty() {
                continue;
            }
            match key {
                "user_id" => params.filter.actor_id = parse_or_ignore(key, value),
                "event" => params.filter.event = parse_or_ignore(key, value),
                "action" => params.filter.action = Some(value.to_string()),
                "ip_address" => params.filter.client_address = Some(value.to_string()),
                "start_date" => params.filter.start = parse_timestamp(key, value),
                "end_date" => params.filter.end = parse_timestamp(key, value),
                "page" => page = parse_or_ignore(key, value).unwrap_or(page),
                "page_size" => page_size = parse_or_ignore(key, value).unwrap_or(page_size),
                "q" | "search" => params.search = Some(value.to_string()),
                "days" => params.days = parse_days(key, value),
                _ => {}
            }
        }

        params.page = PageRequest::new(page, page_size);
        params
    }
}

fn parse_or_ignore<T: FromStr>(key: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            debug!("ACTIVITY_LOG | Ignoring malformed filter parameter {key}={value}");
            None
        }
    }
}

fn parse_days(key: &str, value: &str) -> Option<u32> {
    let days = parse_or_ignore::<u32>(key, value)?;
    if (1..=MAX_LOOKBACK_DAYS).contains(&days) {
        Some(days)
    } else {
        debug!("ACTIVITY_LOG | Ignoring out of range filter parameter {key}={value}");
        None
    }
}

fn parse_timestamp(key: &str, value: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(_) => {
            debug!("ACTIVITY_LOG | Ignoring malformed filter parameter {key}={value}");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::{LogRecord, RecordId};
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn stored(event: EventKind, action: &str, ts: DateTime<Utc>) -> StoredRecord {
        StoredRecord::new(
            RecordId::new("id"),
            LogRecord::builder(event, action).timestamp(ts).build(),
            ts,
        )
    }

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let predicate = Predicate::from_filter(&LogFilter::default());
        assert!(predicate.clauses().is_empty());
        assert!(predicate.matches(&stored(EventKind::UserLogin, "login", ts(1))));
    }

    #[test]
    fn test_filter_ands_all_supplied_fields() {
        let actor = Uuid::new_v4();
        let filter = LogFilter {
            actor_id: Some(actor),
            event: Some(EventKind::UserUpdated),
            action: Some("Profile".to_string()),
            ..Default::default()
        };
        let predicate = Predicate::from_filter(&filter);
        assert_eq!(predicate.clauses().len(), 3);

        let mut record = stored(EventKind::UserUpdated, "update_profile", ts(1));
        assert!(!predicate.matches(&record), "actor missing");

        record.user_id = Some(actor);
        assert!(predicate.matches(&record));

        record.event = EventKind::UserDeleted;
        assert!(!predicate.matches(&record), "event differs");
    }

    #[test]
    fn test_time_range_is_inclusive() {
        let filter = LogFilter {
            start: Some(ts(2)),
            end: Some(ts(4)),
            ..Default::default()
        };
        let predicate = Predicate::from_filter(&filter);

        assert!(!predicate.matches(&stored(EventKind::UserLogin, "a", ts(1))));
        assert!(predicate.matches(&stored(EventKind::UserLogin, "a", ts(2))));
        assert!(predicate.matches(&stored(EventKind::UserLogin, "a", ts(3))));
        assert!(predicate.matches(&stored(EventKind::UserLogin, "a", ts(4))));
        assert!(!predicate.matches(&stored(EventKind::UserLogin, "a", ts(5))));
    }

    #[test]
    fn test_and_before_is_strict() {
        let predicate = Predicate::all().and_before(ts(3));
        assert!(predicate.matches(&stored(EventKind::UserLogin, "a", ts(2))));
        assert!(!predicate.matches(&stored(EventKind::UserLogin, "a", ts(3))));

        let nothing_older = Predicate::all().and_before(DateTime::<Utc>::MIN_UTC);
        assert!(!nothing_older.matches(&stored(EventKind::UserLogin, "a", ts(1))));
    }

    #[test]
    fn test_search_matches_event_action_or_error() {
        let predicate = Predicate::all().and_search("FAIL");

        assert!(predicate.matches(&stored(EventKind::LoginFailed, "login", ts(1))));
        assert!(predicate.matches(&stored(EventKind::UserLogin, "failover", ts(1))));

        let mut with_error = stored(EventKind::SystemError, "db", ts(1));
        with_error.data.error = Some("connection failed".to_string());
        assert!(predicate.matches(&with_error));

        assert!(!predicate.matches(&stored(EventKind::UserLogin, "login", ts(1))));
    }

    #[test]
    fn test_blank_strings_impose_no_constraint() {
        let filter = LogFilter {
            action: Some("   ".to_string()),
            client_address: Some(String::new()),
            ..Default::default()
        };
        let predicate = Predicate::from_filter(&filter).and_search(" ");
        assert!(predicate.clauses().is_empty());
    }

    #[test]
    fn test_address_clause_requires_address() {
        let predicate = Predicate::from_filter(&LogFilter {
            client_address: Some("10.0".to_string()),
            ..Default::default()
        });
        let mut record = stored(EventKind::UserLogin, "login", ts(1));
        assert!(!predicate.matches(&record));
        record.ip_address = Some("10.0.0.7".to_string());
        assert!(predicate.matches(&record));
    }

    #[test]
    fn test_page_request_normalisation() {
        assert_eq!(PageRequest::new(0, 0), PageRequest::new(1, 10));
        assert_eq!(PageRequest::new(3, 101).page_size(), 10);
        assert_eq!(PageRequest::new(3, 100).page_size(), 100);
        assert_eq!(PageRequest::new(3, 20).offset(), 40);
    }

    #[test]
    fn test_filter_params_ignore_malformed_values() {
        let params = FilterParams::from_pairs([
            ("user_id", "not-a-uuid"),
            ("event", "NOT_AN_EVENT"),
            ("start_date", "yesterday"),
            ("page", "abc"),
            ("page_size", "-4"),
            ("action", "login"),
        ]);

        assert_eq!(params.filter.actor_id, None);
        assert_eq!(params.filter.event, None);
        assert_eq!(params.filter.start, None);
        assert_eq!(params.filter.action.as_deref(), Some("login"));
        assert_eq!(params.page, PageRequest::default());
    }

    #[test]
    fn test_filter_params_parse_valid_values() {
        let actor = Uuid::new_v4();
        let actor_string = actor.to_string();
        let params = FilterParams::from_pairs([
            ("user_id", actor_string.as_str()),
            ("event", "LOGIN_FAILED"),
            ("start_date", "2024-05-01T00:00:00Z"),
            ("end_date", "2024-05-02T00:00:00+02:00"),
            ("page", "2"),
            ("page_size", "25"),
            ("q", "timeout"),
            ("days", "7"),
        ]);

        assert_eq!(params.filter.actor_id, Some(actor));
        assert_eq!(params.filter.event, Some(EventKind::LoginFailed));
        assert_eq!(
            params.filter.start,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            params.filter.end,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 22, 0, 0).unwrap())
        );
        assert_eq!(params.page, PageRequest::new(2, 25));
        assert_eq!(params.search.as_deref(), Some("timeout"));
        assert_eq!(params.days, Some(7));
    }

    #[test]
    fn test_filter_params_drop_days_outside_lookback_window() {
        for value in ["0", "366", "100000000", "4294967295", "-1"] {
            let params = FilterParams::from_pairs([("days", value)]);
            assert_eq!(params.days, None, "days={value}");
        }
        assert_eq!(FilterParams::from_pairs([("days", "1")]).days, Some(1));
        assert_eq!(FilterParams::from_pairs([("days", "365")]).days, Some(365));
    }

    #[test]
    fn test_list_response_total_pages() {
        let response = ListResponse::new(Vec::new(), 21, PageRequest::new(1, 10));
        assert_eq!(response.total_pages, 3);
        let empty = ListResponse::new(Vec::new(), 0, PageRequest::default());
        assert_eq!(empty.total_pages, 0);
    }

    proptest! {
        #[test]
        fn prop_total_pages_covers_total(total in 0u64..1_000_000, page_size in 1u32..=100) {
            let pages = u64::from(total_pages(total, page_size));
            prop_assert!(pages * u64::from(page_size) >= total);
            if total > 0 {
                prop_assert!((pages - 1) * u64::from(page_size) < total);
            } else {
                prop_assert_eq!(pages, 0);
            }
        }
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Activity records and their stored document shape.
//!
//! A [`LogRecord`] is what a producer builds and hands to
//! [`IngestHandle::submit`](crate::pipeline::IngestHandle::submit). It is
//! immutable once built; the only thing the pipeline adds is a timestamp when
//! the producer left it unset. The store turns it into a [`StoredRecord`] by
//! assigning a [`RecordId`].
//!
//! # Document shape
//!
//! ```text
//! {
//!   "id": "...",
//!   "user_id": "uuid",            (absent for system events)
//!   "event": "USER_CREATED",
//!   "data": {
//!     "action": "...",            (required)
//!     "details": { ... },
//!     "old_values": { ... },      (optional)
//!     "new_values": { ... },      (optional)
//!     "error": "...",             (optional)
//!     "duration": 12,             (optional, milliseconds)
//!     "status_code": 200          (optional)
//!   },
//!   "timestamp": "2024-01-01T00:00:00Z",
//!   "ip_address": "...",          (optional)
//!   "user_agent": "..."           (optional)
//! }
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Free-form JSON object used for details and before/after snapshots.
pub type Fields = Map<String, Value>;

/// Kind of business event a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    UserCreated,
    UserUpdated,
    UserDeleted,
    UserLogin,
    AdminLogin,
    AdminLogout,
    LoginSuccess,
    LoginFailed,
    TokenRefresh,
    SystemError,
    ValidationError,
}

impl EventKind {
    /// Every event kind, in declaration order.
    #[must_use]
    pub const fn all() -> [EventKind; 11] {
        [
            EventKind::UserCreated,
            EventKind::UserUpdated,
            EventKind::UserDeleted,
            EventKind::UserLogin,
            EventKind::AdminLogin,
            EventKind::AdminLogout,
            EventKind::LoginSuccess,
            EventKind::LoginFailed,
            EventKind::TokenRefresh,
            EventKind::SystemError,
            EventKind::ValidationError,
        ]
    }

    /// Wire name, e.g. `USER_CREATED`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::UserCreated => "USER_CREATED",
            EventKind::UserUpdated => "USER_UPDATED",
            EventKind::UserDeleted => "USER_DELETED",
            EventKind::UserLogin => "USER_LOGIN",
            EventKind::AdminLogin => "ADMIN_LOGIN",
            EventKind::AdminLogout => "ADMIN_LOGOUT",
            EventKind::LoginSuccess => "LOGIN_SUCCESS",
            EventKind::LoginFailed => "LOGIN_FAILED",
            EventKind::TokenRefresh => "TOKEN_REFRESH",
            EventKind::SystemError => "SYSTEM_ERROR",
            EventKind::ValidationError => "VALIDATION_ERROR",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::all()
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

/// Structured payload of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogData {
    pub action: String,
    #[serde(default)]
    pub details: Fields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_values: Option<Fields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_values: Option<Fields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl LogData {
    #[must_use]
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            details: Fields::new(),
            old_values: None,
            new_values: None,
            error: None,
            duration: None,
            status_code: None,
        }
    }
}

/// Where the event came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    pub client_address: Option<String>,
    pub user_agent: Option<String>,
}

/// An activity record built by a producer.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    actor_id: Option<Uuid>,
    event: EventKind,
    data: LogData,
    timestamp: Option<DateTime<Utc>>,
    origin: Origin,
}

impl LogRecord {
    /// Starts a record for `event` with the given action string.
    #[must_use]
    pub fn builder(event: EventKind, action: impl Into<String>) -> LogRecordBuilder {
        LogRecordBuilder {
            record: LogRecord {
                actor_id: None,
                event,
                data: LogData::new(action),
                timestamp: None,
                origin: Origin::default(),
            },
        }
    }

    /// Record emitted by the request-logging middleware for every served request.
    #[must_use]
    pub fn http_request(
        method: &str,
        path: &str,
        status_code: u16,
        elapsed: Duration,
        origin: Origin,
    ) -> LogRecord {
        let duration_ms = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);
        let mut builder = LogRecord::builder(EventKind::SystemError, "HTTP_REQUEST")
            .detail("method", method)
            .detail("path", path)
            .detail("status_code", status_code)
            .detail("duration_ms", duration_ms)
            .status_code(status_code)
            .duration_ms(duration_ms);
        if let Some(agent) = &origin.user_agent {
            builder = builder.detail("user_agent", agent.as_str());
        }
        if let Some(address) = &origin.client_address {
            builder = builder.detail("ip_address", address.as_str());
        }
        builder.origin(origin).build()
    }

    #[must_use]
    pub fn actor_id(&self) -> Option<Uuid> {
        self.actor_id
    }

    #[must_use]
    pub fn event(&self) -> EventKind {
        self.event
    }

    #[must_use]
    pub fn data(&self) -> &LogData {
        &self.data
    }

    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    #[must_use]
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Returns the record with `now` as its timestamp if it had none.
    #[must_use]
    pub(crate) fn stamped(mut self, now: DateTime<Utc>) -> LogRecord {
        self.timestamp.get_or_insert(now);
        self
    }
}

#[derive(Debug, Clone)]
pub struct LogRecordBuilder {
    record: LogRecord,
}

impl LogRecordBuilder {
    #[must_use]
    pub fn actor(mut self, actor_id: Uuid) -> Self {
        self.record.actor_id = Some(actor_id);
        self
    }

    #[must_use]
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.record.timestamp = Some(timestamp);
        self
    }

    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.record.data.details.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn details(mut self, details: Fields) -> Self {
        self.record.data.details = details;
        self
    }

    #[must_use]
    pub fn old_values(mut self, values: Fields) -> Self {
        self.record.data.old_values = Some(values);
        self
    }

    #[must_use]
    pub fn new_values(mut self, values: Fields) -> Self {
        self.record.data.new_values = Some(values);
        self
    }

    #[must_use]
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.record.data.error = Some(error.into());
        self
    }

    #[must_use]
    pub fn duration_ms(mut self, duration: i64) -> Self {
        self.record.data.duration = Some(duration);
        self
    }

    #[must_use]
    pub fn status_code(mut self, status_code: u16) -> Self {
        self.record.data.status_code = Some(status_code);
        self
    }

    #[must_use]
    pub fn client_address(mut self, address: impl Into<String>) -> Self {
        self.record.origin.client_address = Some(address.into());
        self
    }

    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.record.origin.user_agent = Some(agent.into());
        self
    }

    #[must_use]
    pub fn origin(mut self, origin: Origin) -> Self {
        self.record.origin = origin;
        self
    }

    #[must_use]
    pub fn build(self) -> LogRecord {
        self.record
    }
}

/// Identifier assigned by the store when a record is written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record as held by the store and returned to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    pub event: EventKind,
    pub data: LogData,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl StoredRecord {
    /// Builds the stored form of `record`, using `now` if it carries no timestamp.
    #[must_use]
    pub fn new(id: RecordId, record: LogRecord, now: DateTime<Utc>) -> Self {
        let LogRecord {
            actor_id,
            event,
            data,
            timestamp,
            origin,
        } = record;
        Self {
            id,
            user_id: actor_id,
            event,
            data,
            timestamp: timestamp.unwrap_or(now),
            ip_address: origin.client_address,
            user_agent: origin.user_agent,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_event_kind_wire_names_round_trip() {
        for kind in EventKind::all() {
            let wire = serde_json::to_value(kind).unwrap();
            assert_eq!(wire, json!(kind.as_str()));
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_event_kind_rejects_unknown_and_lowercase() {
        assert!("NOT_AN_EVENT".parse::<EventKind>().is_err());
        assert!("user_created".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_stamped_keeps_existing_timestamp() {
        let original = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let record = LogRecord::builder(EventKind::UserLogin, "login")
            .timestamp(original)
            .build()
            .stamped(later);
        assert_eq!(record.timestamp(), Some(original));
    }

    #[test]
    fn test_stamped_fills_missing_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let record = LogRecord::builder(EventKind::UserLogin, "login")
            .build()
            .stamped(now);
        assert_eq!(record.timestamp(), Some(now));
    }

    #[test]
    fn test_stored_record_document_shape() {
        let actor = Uuid::new_v4();
        let ts = Utc.with_ymd_and_hms(2024, 3, 4, 5, 6, 7).unwrap();
        let record = LogRecord::builder(EventKind::UserUpdated, "update_profile")
            .actor(actor)
            .timestamp(ts)
            .detail("field", "email")
            .client_address("10.0.0.1")
            .build();

        let stored = StoredRecord::new(RecordId::new("abc"), record, Utc::now());
        let doc = serde_json::to_value(&stored).unwrap();

        assert_eq!(doc["id"], json!("abc"));
        assert_eq!(doc["user_id"], json!(actor.to_string()));
        assert_eq!(doc["event"], json!("USER_UPDATED"));
        assert_eq!(doc["data"]["action"], json!("update_profile"));
        assert_eq!(doc["data"]["details"]["field"], json!("email"));
        assert_eq!(doc["ip_address"], json!("10.0.0.1"));
        // optional fields are omitted, not null
        assert!(doc.get("user_agent").is_none());
        assert!(doc["data"].get("error").is_none());
        assert!(doc["data"].get("old_values").is_none());
    }

    #[test]
    fn test_system_event_has_no_actor() {
        let stored = StoredRecord::new(
            RecordId::new("1"),
            LogRecord::builder(EventKind::SystemError, "PANIC_RECOVERY")
                .error("boom")
                .build(),
            Utc::now(),
        );
        assert!(stored.user_id.is_none());
        assert_eq!(stored.data.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_http_request_record() {
        let origin = Origin {
            client_address: Some("192.168.1.7".to_string()),
            user_agent: Some("curl/8.0".to_string()),
        };
        let record = LogRecord::http_request(
            "GET",
            "/logs",
            200,
            Duration::from_millis(42),
            origin.clone(),
        );

        assert_eq!(record.event(), EventKind::SystemError);
        assert_eq!(record.data().action, "HTTP_REQUEST");
        assert_eq!(record.data().status_code, Some(200));
        assert_eq!(record.data().duration, Some(42));
        assert_eq!(record.data().details["path"], json!("/logs"));
        assert_eq!(record.data().details["ip_address"], json!("192.168.1.7"));
        assert_eq!(record.origin(), &origin);
    }
}

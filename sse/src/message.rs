use crate::connection::{Connection, ConnectionId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// One server-originated event, ephemeral - encoded and written, never stored.
#[derive(Debug, Clone, Default)]
pub struct Event {
    /// Logical event name; `None` falls back to the unnamed message type.
    pub event: Option<String>,
    /// Arbitrary payload. `Value::String` goes over the wire verbatim,
    /// anything else is serialized as compact JSON.
    pub data: Value,
    /// Optional delivery identifier.
    pub id: Option<String>,
    /// Optional client reconnect-delay hint in milliseconds.
    pub retry: Option<u64>,
}

impl Event {
    /// A named event with a payload.
    pub fn named(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: Some(event.into()),
            data,
            id: None,
            retry: None,
        }
    }

    /// An unnamed (default message type) event.
    pub fn message(data: Value) -> Self {
        Self {
            event: None,
            data,
            id: None,
            retry: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_retry(mut self, retry_ms: u64) -> Self {
        self.retry = Some(retry_ms);
        self
    }
}

/// Conjunction predicate over connection attributes. Every populated field
/// must match for a connection to be selected; the default (empty) filter
/// matches everything, which is what broadcast uses.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub client_ids: Option<HashSet<ConnectionId>>,
    pub metadata: HashMap<String, Value>,
}

impl Filter {
    /// Filter selecting every connection owned by `user_id`.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, conn: &Connection) -> bool {
        if let Some(user_id) = &self.user_id {
            if conn.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        if let Some(session_id) = &self.session_id {
            if conn.session_id.as_deref() != Some(session_id.as_str()) {
                return false;
            }
        }
        if let Some(client_ids) = &self.client_ids {
            if !client_ids.contains(&conn.id) {
                return false;
            }
        }
        // Extra metadata keys on the connection are fine; every key listed
        // on the filter must match exactly.
        for (key, expected) in &self.metadata {
            if conn.metadata.get(key) != Some(expected) {
                return false;
            }
        }
        true
    }
}

/// Registry statistics, computed from a live snapshot on every call.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total_clients: usize,
    pub clients_by_user: HashMap<String, usize>,
    pub average_connection_age_secs: f64,
    pub total_events_sent: u64,
    pub last_event_time: Option<DateTime<Utc>>,
}

/// Read-only projection of one live connection. Never exposes the sink.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub id: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub age_secs: i64,
    pub last_ping: DateTime<Utc>,
    pub secs_since_ping: i64,
    pub metadata: HashMap<String, Value>,
}

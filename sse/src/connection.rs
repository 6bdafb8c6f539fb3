use crate::message::ConnectionSummary;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;

// Type alias for the logical owner of a connection
pub type UserId = String;

/// Unique identifier for a connection (server-generated, never reused).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Millisecond timestamp prefix plus a random suffix. Uniqueness only
    /// needs to hold for the registry's lifetime.
    pub(crate) fn generate() -> Self {
        Self(format!(
            "{:x}-{}",
            Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConnectionId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned by a sink write. Always treated as "the remote end is
/// gone": the owning connection is torn down, the write is never retried.
#[derive(Debug)]
pub struct SinkError {
    pub detail: String,
}

impl SinkError {
    pub fn closed() -> Self {
        Self {
            detail: "sink closed".to_string(),
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Sink Error: {}", self.detail)
    }
}

impl StdError for SinkError {}

/// Transport seam: a byte-oriented handle capable of accepting writes and
/// being closed. The web layer backs this with an unbounded channel feeding
/// the streaming HTTP body; tests back it with in-memory doubles. Writes
/// are non-blocking - a failure means the remote end disconnected.
pub trait EventSink: Send + Sync {
    fn send(&self, payload: &[u8]) -> Result<(), SinkError>;
    fn close(&self);
}

/// Per-connection lifecycle. `Connecting` only lasts through the
/// synchronous setup inside `Manager::create_connection`; `Closed` is
/// terminal and entered exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

const STATE_CONNECTING: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// One live streaming session. Owned by the registry as `Arc<Connection>`;
/// the sink is exclusively owned here and never exposed.
pub struct Connection {
    pub id: ConnectionId,
    pub user_id: Option<UserId>,
    pub session_id: Option<String>,
    /// Immutable after creation; used only for filtering.
    pub metadata: HashMap<String, Value>,
    pub connected_at: DateTime<Utc>,
    last_ping_millis: AtomicI64,
    state: AtomicU8,
    sink: Box<dyn EventSink>,
}

impl Connection {
    pub(crate) fn new(
        user_id: Option<UserId>,
        session_id: Option<String>,
        metadata: HashMap<String, Value>,
        sink: Box<dyn EventSink>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ConnectionId::generate(),
            user_id,
            session_id,
            metadata,
            connected_at: now,
            last_ping_millis: AtomicI64::new(now.timestamp_millis()),
            state: AtomicU8::new(STATE_CONNECTING),
            sink,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::SeqCst) {
            STATE_CONNECTING => ConnectionState::Connecting,
            STATE_OPEN => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }

    pub(crate) fn mark_open(&self) {
        let _ = self.state.compare_exchange(
            STATE_CONNECTING,
            STATE_OPEN,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub fn last_ping(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_ping_millis.load(Ordering::Relaxed))
            .unwrap_or(self.connected_at)
    }

    pub(crate) fn last_ping_millis(&self) -> i64 {
        self.last_ping_millis.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn set_last_ping_millis(&self, millis: i64) {
        self.last_ping_millis.store(millis, Ordering::Relaxed);
    }

    /// Refreshed by the heartbeat routine on successful delivery.
    pub(crate) fn touch_ping(&self) {
        self.last_ping_millis
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Writes a pre-encoded frame. Never called under a registry lock.
    pub(crate) fn write(&self, payload: &[u8]) -> Result<(), SinkError> {
        if self.state.load(Ordering::SeqCst) == STATE_CLOSED {
            return Err(SinkError::closed());
        }
        self.sink.send(payload)
    }

    /// Idempotent: the underlying sink is closed on the first call only,
    /// so an abort signal and an explicit disconnect racing each other
    /// produce a single observable close.
    pub(crate) fn close(&self) {
        if self.state.swap(STATE_CLOSED, Ordering::SeqCst) != STATE_CLOSED {
            self.sink.close();
        }
    }

    pub fn summary(&self) -> ConnectionSummary {
        let now = Utc::now();
        let last_ping = self.last_ping();
        ConnectionSummary {
            id: self.id.as_str().to_string(),
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            connected_at: self.connected_at,
            age_secs: (now - self.connected_at).num_seconds(),
            last_ping,
            secs_since_ping: (now - last_ping).num_seconds(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Connection registry with dual indices for O(1) lookups. Registry
/// operations are atomic with respect to each other but never perform sink
/// I/O - a slow or dead client cannot stall unrelated registry calls.
pub struct ClientRegistry {
    /// Primary storage: lookup by connection id for registration/cleanup - O(1)
    connections: DashMap<ConnectionId, Arc<Connection>>,

    /// Secondary index: fast lookup by user id for message routing - O(1)
    user_index: DashMap<UserId, HashSet<ConnectionId>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            user_index: DashMap::new(),
        }
    }

    /// Register a connection - O(1). Ids are generated server-side, so no
    /// two entries with the same id are ever visible at once.
    pub fn add(&self, conn: Arc<Connection>) {
        if let Some(user_id) = &conn.user_id {
            self.user_index
                .entry(user_id.clone())
                .or_default()
                .insert(conn.id.clone());
        }
        self.connections.insert(conn.id.clone(), conn);
    }

    /// Remove a connection - O(1). Returns the removed record so the caller
    /// can close its sink outside the registry lock.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let (_, conn) = self.connections.remove(id)?;

        if let Some(user_id) = &conn.user_id {
            if let Some(mut entry) = self.user_index.get_mut(user_id) {
                entry.remove(id);

                // Clean up empty user entries. A concurrent add for the same
                // user can repopulate the set between the guard drop and the
                // removal, so emptiness is re-checked under the shard lock.
                if entry.is_empty() {
                    drop(entry); // Release lock before removal
                    self.user_index.remove_if(user_id, |_, ids| ids.is_empty());
                }
            }
        }
        Some(conn)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    /// Snapshot of every live connection, safe to iterate while mutations
    /// happen concurrently.
    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Snapshot of one user's connections - O(1) index lookup + O(k) clone.
    pub fn for_user(&self, user_id: &str) -> Vec<Arc<Connection>> {
        match self.user_index.get(user_id) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.get(id))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSink;

    impl EventSink for NullSink {
        fn send(&self, _payload: &[u8]) -> Result<(), SinkError> {
            Ok(())
        }

        fn close(&self) {}
    }

    fn conn_for(user_id: Option<&str>) -> Arc<Connection> {
        Arc::new(Connection::new(
            user_id.map(str::to_string),
            None,
            HashMap::new(),
            Box::new(NullSink),
        ))
    }

    #[test]
    fn add_and_remove_maintain_both_indices() {
        let registry = ClientRegistry::new();
        let conn = conn_for(Some("alice"));
        let id = conn.id.clone();

        registry.add(conn);
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.for_user("alice").len(), 1);

        let removed = registry.remove(&id);
        assert!(removed.is_some());
        assert_eq!(registry.count(), 0);
        assert!(registry.for_user("alice").is_empty());

        // Second removal finds nothing
        assert!(registry.remove(&id).is_none());
    }

    #[test]
    fn user_index_tracks_multiple_connections_per_user() {
        let registry = ClientRegistry::new();
        let first = conn_for(Some("alice"));
        let second = conn_for(Some("alice"));
        let anonymous = conn_for(None);
        registry.add(first.clone());
        registry.add(second);
        registry.add(anonymous);

        assert_eq!(registry.count(), 3);
        assert_eq!(registry.for_user("alice").len(), 2);

        registry.remove(&first.id);
        assert_eq!(registry.for_user("alice").len(), 1);
    }

    #[test]
    fn emptying_remove_does_not_wipe_a_concurrent_add_from_the_index() {
        let registry = ClientRegistry::new();

        std::thread::scope(|scope| {
            // Churns the user's index entry through empty repeatedly
            let churn = scope.spawn(|| {
                for _ in 0..500 {
                    let conn = conn_for(Some("alice"));
                    let id = conn.id.clone();
                    registry.add(conn);
                    registry.remove(&id);
                }
            });
            // Every live connection must stay visible through the index
            let checker = scope.spawn(|| {
                for _ in 0..500 {
                    let keeper = conn_for(Some("alice"));
                    let id = keeper.id.clone();
                    registry.add(keeper);
                    assert!(
                        registry.for_user("alice").iter().any(|c| c.id == id),
                        "live connection missing from the user index"
                    );
                    registry.remove(&id);
                }
            });
            churn.join().unwrap();
            checker.join().unwrap();
        });

        assert!(registry.for_user("alice").is_empty());
    }

    #[test]
    fn snapshot_is_detached_from_later_mutations() {
        let registry = ClientRegistry::new();
        let conn = conn_for(None);
        registry.add(conn.clone());

        let snapshot = registry.all();
        registry.remove(&conn.id);

        // The snapshot still holds the record; the registry does not.
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn close_is_terminal_and_write_fails_afterwards() {
        let conn = conn_for(None);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        conn.mark_open();
        assert_eq!(conn.state(), ConnectionState::Open);

        conn.close();
        conn.close(); // tolerated
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.write(b"data: x\n\n").is_err());
    }
}

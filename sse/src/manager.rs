use crate::connection::{ClientRegistry, Connection, ConnectionId, EventSink, UserId};
use crate::encoder;
use crate::error::Error;
use crate::message::{ConnectionSummary, Event, Filter, Stats};
use chrono::{DateTime, Utc};
use log::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Dispatcher tuning knobs.
///
/// `client_timeout` must exceed `ping_interval` for the heartbeat to have a
/// chance to refresh a connection before eviction. The default 2:1 ratio is
/// a policy choice, not a load-bearing constant: a single missed delivery
/// leaves only one more tick before eviction, so deployments that see
/// transient delivery hiccups should widen the ratio to cut false-positive
/// evictions.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Heartbeat/sweep cadence.
    pub ping_interval: Duration,
    /// Staleness threshold for the sweep.
    pub client_timeout: Duration,
    /// Hard cap on live connections, enforced at connect time only.
    pub max_clients: usize,
    /// Toggles diagnostic emission; no behavioral effect.
    pub enable_logging: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_millis(30_000),
            client_timeout: Duration::from_millis(60_000),
            max_clients: 1000,
            enable_logging: false,
        }
    }
}

/// Identity and filter attributes attached to a new connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub user_id: Option<UserId>,
    pub session_id: Option<String>,
    pub metadata: HashMap<String, Value>,
}

/// Outcome of one delivery attempt against one connection. Batch operations
/// aggregate these into a success count; a failing sink can never abort the
/// rest of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    UnknownClient,
    SinkClosed,
}

/// Orchestrates connection creation, targeted/broadcast send, heartbeat,
/// stale-connection eviction, and statistics. Owns the registry and a
/// background timer task; every public operation is safe to call from
/// concurrent request-handling contexts.
pub struct Manager {
    registry: Arc<ClientRegistry>,
    config: ManagerConfig,
    total_events_sent: AtomicU64,
    /// Millis of the last successful send; 0 means never.
    last_event_millis: AtomicI64,
    timer: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl Manager {
    /// Builds the dispatcher and starts its heartbeat/sweep timer. Requires
    /// a running tokio runtime.
    pub fn new(config: ManagerConfig) -> Arc<Self> {
        let manager = Arc::new(Self {
            registry: Arc::new(ClientRegistry::new()),
            config,
            total_events_sent: AtomicU64::new(0),
            last_event_millis: AtomicI64::new(0),
            timer: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        });

        let handle = tokio::spawn(Self::run_timer(
            Arc::downgrade(&manager),
            manager.config.ping_interval,
        ));
        if let Ok(mut guard) = manager.timer.lock() {
            *guard = Some(handle);
        }

        manager
    }

    /// Timer task: holds only a weak reference so dropping the last owning
    /// handle also stops the loop.
    async fn run_timer(manager: Weak<Manager>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; skip it so the initial
        // heartbeat happens one full period after startup.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(manager) = manager.upgrade() else {
                break;
            };
            manager.heartbeat_and_sweep();
        }
    }

    /// Registers a new connection and synchronously delivers its `connected`
    /// event. Fails with a capacity error at or above `max_clients` or once
    /// the dispatcher has been destroyed; that is a hard limit the caller
    /// must not retry against automatically.
    pub fn create_connection(
        &self,
        opts: ConnectOptions,
        sink: Box<dyn EventSink>,
    ) -> Result<Arc<Connection>, Error> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::capacity(self.config.max_clients));
        }
        if self.registry.count() >= self.config.max_clients {
            if self.config.enable_logging {
                warn!(
                    "Refusing connection: registry at capacity ({})",
                    self.config.max_clients
                );
            }
            return Err(Error::capacity(self.config.max_clients));
        }

        let conn = Arc::new(Connection::new(
            opts.user_id,
            opts.session_id,
            opts.metadata,
            sink,
        ));
        self.registry.add(conn.clone());

        // Admission is check-then-insert: concurrent connects can pass the
        // gate together, and destroy's disconnect loop can run between the
        // flag check and the insert. Re-check after inserting and roll the
        // loser back out.
        if self.destroyed.load(Ordering::SeqCst)
            || self.registry.count() > self.config.max_clients
        {
            if let Some(conn) = self.registry.remove(&conn.id) {
                conn.close();
            }
            return Err(Error::capacity(self.config.max_clients));
        }

        let hello = Event::named(
            "connected",
            json!({
                "id": conn.id.as_str(),
                "connected_at": conn.connected_at.to_rfc3339(),
            }),
        );
        let frame = encoder::encode(&hello)?;
        if self.deliver(&conn, &frame) == DeliveryOutcome::Delivered {
            conn.mark_open();
            if self.config.enable_logging {
                debug!(
                    "Registered connection {} (user: {:?})",
                    conn.id, conn.user_id
                );
            }
        }

        Ok(conn)
    }

    /// Sends one event to one connection. An unknown id is a no-op reported
    /// as `false`, commonly because the client already disconnected. A
    /// failed write tears the connection down and also reports `false` -
    /// there is no partial-failure or retry state for a single connection.
    pub fn send_to_client(&self, id: &ConnectionId, event: &Event) -> Result<bool, Error> {
        let Some(conn) = self.registry.get(id) else {
            return Ok(false);
        };
        let frame = encoder::encode(event)?;
        Ok(self.deliver(&conn, &frame) == DeliveryOutcome::Delivered)
    }

    /// Sends one event to every connection matching `filter`, returning the
    /// number of successful deliveries. The payload is encoded once up
    /// front, so a serialization failure affects no connection; delivery
    /// order across matched connections is unspecified.
    pub fn send_to_clients(&self, filter: &Filter, event: &Event) -> Result<usize, Error> {
        let frame = encoder::encode(event)?;
        let mut delivered = 0;
        for conn in self.registry.all() {
            if filter.matches(&conn) && self.deliver(&conn, &frame) == DeliveryOutcome::Delivered {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    pub fn broadcast(&self, event: &Event) -> Result<usize, Error> {
        self.send_to_clients(&Filter::default(), event)
    }

    pub fn send_to_user(&self, user_id: &str, event: &Event) -> Result<usize, Error> {
        self.send_to_clients(&Filter::user(user_id), event)
    }

    /// Idempotent teardown: closes the sink (tolerating "already closed"),
    /// removes the registry entry, and reports whether a connection was
    /// actually found and removed.
    pub fn disconnect_client(&self, id: &ConnectionId) -> bool {
        match self.registry.remove(id) {
            Some(conn) => {
                conn.close();
                if self.config.enable_logging {
                    debug!("Disconnected connection {}", id);
                }
                true
            }
            None => false,
        }
    }

    /// Disconnects every connection owned by `user_id`, returning the count.
    pub fn disconnect_user(&self, user_id: &str) -> usize {
        self.registry
            .for_user(user_id)
            .iter()
            .filter(|conn| self.disconnect_client(&conn.id))
            .count()
    }

    /// Live statistics over the current registry snapshot; never cached.
    pub fn stats(&self) -> Stats {
        let snapshot = self.registry.all();
        let now = Utc::now();

        let mut clients_by_user: HashMap<String, usize> = HashMap::new();
        let mut age_sum_secs = 0f64;
        for conn in &snapshot {
            if let Some(user_id) = &conn.user_id {
                *clients_by_user.entry(user_id.clone()).or_insert(0) += 1;
            }
            age_sum_secs += (now - conn.connected_at).num_milliseconds() as f64 / 1000.0;
        }

        let total_clients = snapshot.len();
        Stats {
            total_clients,
            clients_by_user,
            average_connection_age_secs: if total_clients == 0 {
                0.0
            } else {
                age_sum_secs / total_clients as f64
            },
            total_events_sent: self.total_events_sent.load(Ordering::Relaxed),
            last_event_time: self.last_event_time(),
        }
    }

    /// Read-only projections of every live connection, newest first.
    pub fn active_connections(&self) -> Vec<ConnectionSummary> {
        let mut summaries: Vec<ConnectionSummary> = self
            .registry
            .all()
            .iter()
            .map(|conn| conn.summary())
            .collect();
        summaries.sort_by(|a, b| b.connected_at.cmp(&a.connected_at));
        summaries
    }

    /// Stops the timer and disconnects everything. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut guard) = self.timer.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
        for conn in self.registry.all() {
            self.disconnect_client(&conn.id);
        }
        if self.config.enable_logging {
            info!("Dispatcher destroyed; all connections closed");
        }
    }

    /// One timer tick: heartbeat first, then the stale sweep. A connection
    /// that fails its heartbeat send is torn down by the failed-send path,
    /// so the sweep will simply not find it.
    fn heartbeat_and_sweep(&self) {
        let ping = Event::named("ping", json!({ "time": Utc::now().to_rfc3339() }));
        let frame = match encoder::encode(&ping) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode heartbeat event: {e}");
                return;
            }
        };

        for conn in self.registry.all() {
            if self.deliver(&conn, &frame) == DeliveryOutcome::Delivered {
                conn.touch_ping();
            }
        }

        let cutoff = Utc::now().timestamp_millis() - self.config.client_timeout.as_millis() as i64;
        for conn in self.registry.all() {
            if conn.last_ping_millis() < cutoff {
                if self.config.enable_logging {
                    info!(
                        "Evicting stale connection {} (last ping {})",
                        conn.id,
                        conn.last_ping()
                    );
                }
                self.disconnect_client(&conn.id);
            }
        }
    }

    /// Writes a pre-encoded frame to one connection, outside any registry
    /// lock. A failed write always implies disconnection.
    fn deliver(&self, conn: &Arc<Connection>, frame: &[u8]) -> DeliveryOutcome {
        match conn.write(frame) {
            Ok(()) => {
                self.total_events_sent.fetch_add(1, Ordering::Relaxed);
                self.last_event_millis
                    .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
                DeliveryOutcome::Delivered
            }
            Err(e) => {
                if self.config.enable_logging {
                    warn!(
                        "Failed to send event to connection {}: {}. Connection will be torn down.",
                        conn.id, e
                    );
                }
                self.disconnect_client(&conn.id);
                DeliveryOutcome::SinkClosed
            }
        }
    }

    fn last_event_time(&self) -> Option<DateTime<Utc>> {
        match self.last_event_millis.load(Ordering::Relaxed) {
            0 => None,
            millis => DateTime::from_timestamp_millis(millis),
        }
    }

    #[cfg(test)]
    fn rewind_ping(conn: &Connection, by: Duration) {
        conn.set_last_ping_millis(conn.last_ping_millis() - by.as_millis() as i64);
    }
}

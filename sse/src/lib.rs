//! Server-Sent Events (SSE) dispatch core for real-time updates.
//!
//! This crate owns the server side of the event stream: it accepts
//! long-lived one-way connections, keeps a registry of who is connected,
//! and pushes server-originated events to one, many, or all connections
//! under selectable filters.
//!
//! # Architecture
//!
//! - **Dual-index registry**: O(1) lookups for both connection management
//!   and user-scoped routing via separate DashMap indices.
//! - **Transport seam**: connections own an [`connection::EventSink`] -
//!   the web layer backs it with the streaming HTTP body, tests with
//!   in-memory doubles. Sink writes never happen under a registry lock.
//! - **Ephemeral events**: nothing is stored or replayed; a disconnected
//!   client simply misses events until it reconnects.
//! - **Liveness**: a background timer heartbeats every connection each
//!   `ping_interval` and evicts anything silent past `client_timeout`.
//!   A failed write always tears its connection down - one dead client
//!   can never abort a broadcast or stall the registry.
//!
//! # Message Flow
//!
//! 1. The web layer establishes a connection via the `/events` endpoint
//!    and hands the manager a sink wired to the response body.
//! 2. A producer (webhook handler, job processor, admin surface) calls
//!    `send_to_user`/`broadcast`/`send_to_clients` with an [`message::Event`].
//! 3. The manager resolves targets against a registry snapshot, encodes
//!    the event once, and writes the frame to each matching sink.
//!
//! # Modules
//!
//! - `connection`: `Connection`, `ClientRegistry`, and the `EventSink` seam
//! - `encoder`: pure `text/event-stream` wire encoding
//! - `manager`: the dispatcher - connect, send, heartbeat, eviction, stats
//! - `message`: event, filter, and statistics types
//! - `error`: the crate's error taxonomy

pub mod connection;
pub mod encoder;
pub mod error;
pub mod manager;
pub mod message;

pub use manager::Manager;

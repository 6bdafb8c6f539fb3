//! Reconnecting SSE subscriber for the relay platform.
//!
//! The receiving half of the event stream: opens one long-lived connection
//! with query-encoded identity, parses named events, and re-dispatches them
//! to local listeners. Transport drops trigger exponential back-off
//! reconnection; the attempt counter and observable state live in an
//! explicit [`reconnect::ConnectionState`] machine.

pub mod listeners;
pub mod reconnect;
pub mod subscriber;

pub use listeners::{ListenerId, Listeners};
pub use reconnect::{ConnectionState, ReconnectPolicy};
pub use subscriber::{Subscriber, SubscriberConfig};

//! Notification facade over the SSE dispatcher.
//!
//! Gives callers (webhook handlers, job processors, admin surfaces) a
//! vocabulary of named intents instead of raw events and filters. Every
//! helper stamps the payload with an ISO-8601 timestamp and a fixed event
//! name, then bottoms out in `send_to_user`/`broadcast` on the dispatcher.
//!
//! The dispatcher is passed in explicitly rather than held as process-wide
//! state: the binary constructs one `Manager`, carries it in `AppState`,
//! and owns its lifecycle. That keeps callers decoupled from each other
//! and lets tests run any number of isolated dispatchers side by side.
//! This layer adds no invariants of its own.

use chrono::Utc;
use log::*;
use serde_json::{json, Value};
use sse::error::Error;
use sse::message::Event;
use sse::Manager;

/// Severity attached to a system notification payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// Sends a `notification` event to one user, or broadcasts it when no user
/// is given. Returns the number of connections reached.
pub fn system_notification(
    manager: &Manager,
    user_id: Option<&str>,
    message: &str,
    severity: Severity,
) -> Result<usize, Error> {
    let event = Event::named(
        "notification",
        json!({
            "message": message,
            "level": severity.as_str(),
            "timestamp": Utc::now().to_rfc3339(),
        }),
    );
    match user_id {
        Some(user_id) => manager.send_to_user(user_id, &event),
        None => manager.broadcast(&event),
    }
}

/// Sends a `progress` event for one long-running operation to one user.
/// Progress is clamped to the 0..=100 range.
pub fn progress_update(
    manager: &Manager,
    user_id: &str,
    operation_id: &str,
    progress: i64,
    message: Option<&str>,
) -> Result<usize, Error> {
    let event = Event::named(
        "progress",
        json!({
            "operation_id": operation_id,
            "progress": progress.clamp(0, 100),
            "message": message,
            "timestamp": Utc::now().to_rfc3339(),
        }),
    );
    manager.send_to_user(user_id, &event)
}

/// Sends a `success` event to one user.
pub fn success_notification(
    manager: &Manager,
    user_id: &str,
    message: &str,
    data: Option<Value>,
) -> Result<usize, Error> {
    let event = Event::named(
        "success",
        json!({
            "message": message,
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
        }),
    );
    manager.send_to_user(user_id, &event)
}

/// Sends an `error` event to one user.
pub fn error_notification(
    manager: &Manager,
    user_id: &str,
    message: &str,
    data: Option<Value>,
) -> Result<usize, Error> {
    let event = Event::named(
        "error",
        json!({
            "message": message,
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
        }),
    );
    manager.send_to_user(user_id, &event)
}

/// Sends an `update` event carrying a domain payload. Targets the given
/// user list when present, otherwise broadcasts.
pub fn realtime_update(
    manager: &Manager,
    kind: &str,
    data: Value,
    user_ids: Option<&[String]>,
) -> Result<usize, Error> {
    let event = Event::named(
        "update",
        json!({
            "kind": kind,
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
        }),
    );
    let reached = match user_ids {
        Some(user_ids) => {
            let mut reached = 0;
            for user_id in user_ids {
                reached += manager.send_to_user(user_id, &event)?;
            }
            reached
        }
        None => manager.broadcast(&event)?,
    };
    debug!("Sent '{kind}' update to {reached} connection(s)");
    Ok(reached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sse::connection::{EventSink, SinkError};
    use sse::manager::{ConnectOptions, ManagerConfig};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct RecordingSink(Arc<Mutex<Vec<String>>>);

    impl EventSink for RecordingSink {
        fn send(&self, payload: &[u8]) -> Result<(), SinkError> {
            self.0
                .lock()
                .unwrap()
                .push(String::from_utf8(payload.to_vec()).unwrap());
            Ok(())
        }

        fn close(&self) {}
    }

    fn connect(manager: &Manager, user_id: &str) -> Arc<Mutex<Vec<String>>> {
        let frames = Arc::new(Mutex::new(Vec::new()));
        manager
            .create_connection(
                ConnectOptions {
                    user_id: Some(user_id.to_string()),
                    ..ConnectOptions::default()
                },
                Box::new(RecordingSink(frames.clone())),
            )
            .unwrap();
        frames
    }

    fn manager() -> Arc<Manager> {
        Manager::new(ManagerConfig {
            ping_interval: Duration::from_secs(3600),
            client_timeout: Duration::from_secs(7200),
            ..ManagerConfig::default()
        })
    }

    #[tokio::test]
    async fn system_notification_broadcasts_without_a_user() {
        let manager = manager();
        let alice = connect(&manager, "alice");
        let bob = connect(&manager, "bob");

        let reached =
            system_notification(&manager, None, "maintenance at noon", Severity::Warning)
                .unwrap();

        assert_eq!(reached, 2);
        let last = alice.lock().unwrap().last().unwrap().clone();
        assert!(last.starts_with("event: notification\n"));
        assert!(last.contains("\"level\":\"warning\""));
        assert!(last.contains("\"timestamp\""));
        assert_eq!(bob.lock().unwrap().len(), 2); // connected + notification
    }

    #[tokio::test]
    async fn progress_update_clamps_out_of_range_values() {
        let manager = manager();
        let alice = connect(&manager, "alice");

        progress_update(&manager, "alice", "op-1", 250, Some("almost")).unwrap();
        progress_update(&manager, "alice", "op-1", -5, None).unwrap();

        let frames = alice.lock().unwrap();
        assert!(frames[1].contains("\"progress\":100"));
        assert!(frames[2].contains("\"progress\":0"));
    }

    #[tokio::test]
    async fn realtime_update_targets_the_user_list_when_given() {
        let manager = manager();
        let alice = connect(&manager, "alice");
        let bob = connect(&manager, "bob");
        let _carol = connect(&manager, "carol");

        let reached = realtime_update(
            &manager,
            "deploy_finished",
            json!({"sha": "abc123"}),
            Some(&["alice".to_string(), "bob".to_string()]),
        )
        .unwrap();

        assert_eq!(reached, 2);
        assert_eq!(alice.lock().unwrap().len(), 2);
        assert_eq!(bob.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn success_and_error_events_carry_fixed_names() {
        let manager = manager();
        let alice = connect(&manager, "alice");

        success_notification(&manager, "alice", "done", Some(json!({"id": 1}))).unwrap();
        error_notification(&manager, "alice", "boom", None).unwrap();

        let frames = alice.lock().unwrap();
        assert!(frames[1].starts_with("event: success\n"));
        assert!(frames[2].starts_with("event: error\n"));
    }
}

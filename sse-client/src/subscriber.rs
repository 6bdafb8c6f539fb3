use crate::listeners::{ListenerId, Listeners};
use crate::reconnect::{ConnectionState, ReconnectPolicy};
use anyhow::Result;
use eventsource_client::{self as es, Client};
use futures_util::stream::StreamExt;
use log::*;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use url::Url;

/// Identity and behavior of one subscriber.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Base URL of the backend (e.g., http://localhost:4000)
    pub base_url: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// Extra query keys; the server folds these into connection metadata.
    pub metadata: HashMap<String, String>,
    /// `None` disables reconnection entirely.
    pub reconnect: Option<ReconnectPolicy>,
}

impl SubscriberConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_id: None,
            session_id: None,
            metadata: HashMap::new(),
            reconnect: Some(ReconnectPolicy::default()),
        }
    }

    /// Connect endpoint with identity and metadata query-encoded.
    pub fn endpoint(&self) -> Result<String> {
        let mut pairs: Vec<(&str, &str)> = Vec::new();
        if let Some(user_id) = &self.user_id {
            pairs.push(("user_id", user_id));
        }
        if let Some(session_id) = &self.session_id {
            pairs.push(("session_id", session_id));
        }
        for (key, value) in &self.metadata {
            pairs.push((key, value));
        }
        let raw = format!("{}/events", self.base_url);
        let url = if pairs.is_empty() {
            Url::parse(&raw)?
        } else {
            Url::parse_with_params(&raw, pairs)?
        };
        Ok(url.to_string())
    }
}

/// The receiving half of the platform: opens the stream, parses named
/// events, re-dispatches them to local listeners, and reconnects with
/// exponential back-off when the transport drops.
pub struct Subscriber {
    state: Arc<Mutex<ConnectionState>>,
    listeners: Arc<Listeners>,
    handle: tokio::task::JoinHandle<()>,
}

impl Subscriber {
    /// Spawns the transport loop. Requires a running tokio runtime.
    pub fn connect(config: SubscriberConfig) -> Result<Self> {
        let url = config.endpoint()?;
        let state = Arc::new(Mutex::new(ConnectionState::Connecting));
        let listeners = Arc::new(Listeners::new());

        let handle = tokio::spawn(run_transport(
            url,
            config.reconnect,
            state.clone(),
            listeners.clone(),
        ));

        Ok(Self {
            state,
            listeners,
            handle,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Registers a listener for one event name. Multiple listeners may
    /// watch the same name independently.
    pub fn on(&self, event: &str, callback: impl Fn(&Value) + Send + Sync + 'static) -> ListenerId {
        self.listeners.on(event, callback)
    }

    /// Unsubscribes one listener; others for the same event are unaffected.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.listeners.off(event, id)
    }

    /// Stops the transport loop and marks the subscriber disconnected.
    pub fn close(self) {
        self.handle.abort();
        set_state(&self.state, ConnectionState::Disconnected);
    }
}

fn set_state(state: &Mutex<ConnectionState>, next: ConnectionState) {
    if let Ok(mut guard) = state.lock() {
        *guard = next;
    }
}

async fn run_transport(
    url: String,
    policy: Option<ReconnectPolicy>,
    state: Arc<Mutex<ConnectionState>>,
    listeners: Arc<Listeners>,
) {
    let mut attempt: u32 = 0;

    loop {
        // The transport library's own retry stays off; back-off is ours.
        let client = match es::ClientBuilder::for_url(&url) {
            Ok(builder) => builder
                .reconnect(es::ReconnectOptions::reconnect(false).build())
                .build(),
            Err(e) => {
                error!("Invalid SSE endpoint {url}: {e}");
                set_state(&state, ConnectionState::Disconnected);
                return;
            }
        };

        let mut stream = client.stream();
        loop {
            match stream.next().await {
                Some(Ok(es::SSE::Event(event))) => {
                    // Any delivered event proves the new connection is live
                    if attempt != 0 || !matches!(lock_state(&state), ConnectionState::Connected) {
                        attempt = 0;
                        set_state(&state, ConnectionState::Connected);
                    }
                    let data = serde_json::from_str::<Value>(&event.data)
                        .unwrap_or(Value::String(event.data.clone()));
                    listeners.dispatch(&event.event_type, &data);
                }
                Some(Ok(es::SSE::Comment(_))) => {
                    // Keep-alive; nothing to dispatch
                }
                Some(Err(e)) => {
                    warn!("SSE transport error: {e}");
                    break;
                }
                None => {
                    debug!("SSE stream ended");
                    break;
                }
            }
        }

        let Some(policy) = policy.as_ref() else {
            set_state(&state, ConnectionState::Disconnected);
            return;
        };
        if !policy.allows(attempt) {
            warn!("Giving up after {attempt} reconnect attempts");
            set_state(&state, ConnectionState::Disconnected);
            return;
        }

        let delay = policy.delay_for(attempt);
        attempt += 1;
        set_state(&state, ConnectionState::Reconnecting { attempt });
        debug!("Reconnecting in {delay:?} (attempt {attempt})");
        tokio::time::sleep(delay).await;
        set_state(&state, ConnectionState::Connecting);
    }
}

fn lock_state(state: &Mutex<ConnectionState>) -> ConnectionState {
    state
        .lock()
        .map(|state| *state)
        .unwrap_or(ConnectionState::Disconnected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_query_encodes_identity_and_metadata() {
        let mut config = SubscriberConfig::new("http://localhost:4000");
        config.user_id = Some("alice".to_string());
        config.session_id = Some("s 1".to_string());
        config.metadata.insert("role".to_string(), "admin".to_string());

        let endpoint = config.endpoint().unwrap();
        assert!(endpoint.starts_with("http://localhost:4000/events?"));
        assert!(endpoint.contains("user_id=alice"));
        // Query pairs are form-encoded, so the space becomes a plus
        assert!(endpoint.contains("session_id=s+1"));
        assert!(endpoint.contains("role=admin"));
    }

    #[test]
    fn endpoint_without_identity_has_no_query_noise() {
        let config = SubscriberConfig::new("http://localhost:4000");
        assert_eq!(
            config.endpoint().unwrap(),
            "http://localhost:4000/events"
        );
    }
}

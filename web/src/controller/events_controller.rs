//! SSE connect endpoint: the long-lived streaming half of the platform.
//!
//! The dispatcher core (`Manager`, `ClientRegistry`, encoding) lives in the
//! `sse` crate; this controller only adapts it to the HTTP transport by
//! wiring a channel-backed sink into the streaming response body.

use crate::error::Error;
use async_stream::stream;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use bytes::Bytes;
use log::*;
use serde_json::Value;
use service::AppState;
use sse::connection::{ConnectionId, EventSink, SinkError};
use sse::manager::ConnectOptions;
use sse::Manager;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;

/// Sink backed by the unbounded channel feeding the response body.
/// Closing drops the sender so the streaming body terminates promptly.
struct ChannelSink {
    tx: Mutex<Option<UnboundedSender<Vec<u8>>>>,
}

impl ChannelSink {
    fn new(tx: UnboundedSender<Vec<u8>>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }
}

impl EventSink for ChannelSink {
    fn send(&self, payload: &[u8]) -> Result<(), SinkError> {
        let guard = self.tx.lock().map_err(|_| SinkError::closed())?;
        match guard.as_ref() {
            Some(tx) => tx.send(payload.to_vec()).map_err(|_| SinkError::closed()),
            None => Err(SinkError::closed()),
        }
    }

    fn close(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
    }
}

/// Funnels a transport abort into the same teardown path as an explicit
/// disconnect. `disconnect_client` is idempotent, so the two racing is safe.
struct DisconnectGuard {
    manager: Arc<Manager>,
    id: ConnectionId,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.manager.disconnect_client(&self.id);
    }
}

/// Establishes a long-lived SSE connection. `user_id` and `session_id` are
/// recognized query keys; any extra keys are folded into the connection's
/// metadata for filtering. Responds 503 when the dispatcher is at capacity.
pub(crate) async fn stream_events(
    Query(params): Query<HashMap<String, String>>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, Error> {
    let mut params = params;
    let user_id = params.remove("user_id");
    let session_id = params.remove("session_id");
    let metadata: HashMap<String, Value> = params
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();

    debug!("Establishing SSE connection (user: {user_id:?})");

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let conn = app_state.sse_manager.create_connection(
        ConnectOptions {
            user_id,
            session_id,
            metadata,
        },
        Box::new(ChannelSink::new(tx)),
    )?;

    let guard = DisconnectGuard {
        manager: app_state.sse_manager.clone(),
        id: conn.id.clone(),
    };
    // Drop our handle so the registry holds the only strong reference and
    // teardown releases the sink.
    drop(conn);

    let body = Body::from_stream(stream! {
        let _guard = guard;
        while let Some(frame) = rx.recv().await {
            yield Ok::<_, Infallible>(Bytes::from(frame));
        }
    });

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    ))
}

//! HTTP surface for the relay platform.
//!
//! Every handler here is a thin caller: it either opens a streaming
//! connection (`/events`) or asks the dispatcher/facade to publish an
//! event. The real state machine lives in the `sse` crate.

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method};
use axum::Router;
use log::*;
use service::AppState;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub(crate) mod controller;
pub mod error;
pub mod router;

pub use error::Error;

pub fn init_router(app_state: AppState) -> Router {
    let allowed_origins: Vec<HeaderValue> = app_state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring unparseable CORS origin: {origin}");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    router::define_routes(app_state).layer(cors)
}

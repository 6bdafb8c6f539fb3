//! Error types for the `sse` layer.
use std::error::Error as StdError;
use std::fmt;

/// Top-level SSE error type.
/// Errors carry a `kind` used by the `web` layer to pick an HTTP status,
/// plus an optional `source` holding the original error. Delivery problems
/// against a single connection (a dead sink, an unknown id) are deliberately
/// NOT represented here - they degrade to boolean/count results so batched
/// sends stay total.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// A connect attempt was refused because the registry already holds
    /// `max` live connections. Hard limit, never queued.
    CapacityExceeded { max: usize },
    /// An event payload could not be serialized to wire text.
    Serialization,
}

impl Error {
    pub fn capacity(max: usize) -> Self {
        Self {
            source: None,
            kind: ErrorKind::CapacityExceeded { max },
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SSE Error: {self:?}")
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|src| src.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self {
            source: Some(Box::new(err)),
            kind: ErrorKind::Serialization,
        }
    }
}

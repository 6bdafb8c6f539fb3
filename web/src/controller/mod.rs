pub(crate) mod admin_controller;
pub(crate) mod events_controller;
pub(crate) mod health_check_controller;
pub(crate) mod publish_controller;
pub(crate) mod webhook_controller;

use crate::error::Error;

/// Rejects missing-but-required payload fields with a 422 instead of a
/// serde-level deserialization failure, so "which field" stays visible.
pub(crate) fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, Error> {
    value.ok_or_else(|| Error::UnprocessableEntity(format!("missing required field: {field}")))
}

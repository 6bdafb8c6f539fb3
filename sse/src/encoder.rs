//! Wire encoding for the `text/event-stream` format.

use crate::error::Error;
use crate::message::Event;
use serde_json::Value;

/// Encodes one event into its wire representation:
///
/// ```text
/// id: <opaque-id>            (optional)
/// event: <name>              (optional)
/// retry: <milliseconds>      (optional)
/// data: <line 1>
/// data: <line 2>
///                            (blank line terminates the event)
/// ```
///
/// Multi-line payloads are split into one `data:` line per fragment so they
/// survive the line-oriented format; the client reassembles them with `\n`.
/// Pure function; the only failure mode is JSON serialization of `data`,
/// which is surfaced to the caller instead of corrupting the stream.
pub fn encode(event: &Event) -> Result<Vec<u8>, Error> {
    let mut frame = String::new();

    if let Some(id) = &event.id {
        frame.push_str("id: ");
        frame.push_str(id);
        frame.push('\n');
    }
    if let Some(name) = &event.event {
        frame.push_str("event: ");
        frame.push_str(name);
        frame.push('\n');
    }
    if let Some(retry_ms) = event.retry {
        frame.push_str("retry: ");
        frame.push_str(&retry_ms.to_string());
        frame.push('\n');
    }

    let text = match &event.data {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other)?,
    };
    for line in text.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }

    frame.push('\n');
    Ok(frame.into_bytes())
}

/// A bare comment frame (`:\n\n`), acceptable as a heartbeat payload for
/// clients that do not want a named `ping` event.
pub fn encode_comment() -> Vec<u8> {
    b":\n\n".to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_full_header_set_in_order() {
        let event = Event::named("notification", json!({"message": "hi"}))
            .with_id("evt-7")
            .with_retry(5000);
        let frame = String::from_utf8(encode(&event).unwrap()).unwrap();
        assert_eq!(
            frame,
            "id: evt-7\nevent: notification\nretry: 5000\ndata: {\"message\":\"hi\"}\n\n"
        );
    }

    #[test]
    fn unnamed_event_omits_optional_headers() {
        let event = Event::message(json!(42));
        let frame = String::from_utf8(encode(&event).unwrap()).unwrap();
        assert_eq!(frame, "data: 42\n\n");
    }

    #[test]
    fn string_data_is_used_verbatim() {
        let event = Event::message(Value::String("plain text".into()));
        let frame = String::from_utf8(encode(&event).unwrap()).unwrap();
        // No JSON quoting around the payload
        assert_eq!(frame, "data: plain text\n\n");
    }

    #[test]
    fn multiline_data_round_trips() {
        let event = Event::message(Value::String("line1\nline2".into()));
        let frame = String::from_utf8(encode(&event).unwrap()).unwrap();
        assert_eq!(frame, "data: line1\ndata: line2\n\n");

        // Reassembling the data lines with \n reconstructs the original
        let reassembled: Vec<&str> = frame
            .lines()
            .filter_map(|l| l.strip_prefix("data: "))
            .collect();
        assert_eq!(reassembled.join("\n"), "line1\nline2");
    }

    #[test]
    fn comment_frame_is_a_blank_heartbeat() {
        assert_eq!(encode_comment(), b":\n\n");
    }
}

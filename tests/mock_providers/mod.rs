//! Mock speech service for integration tests
//!
//! Simulates the Azure speech WebSocket endpoint:
//! - Records every handshake (URI and headers) and every text frame received
//! - Answers each `ssml` request with a scripted sequence of replies
//!
//! Replies can simulate latency, connection drops, malformed frames and
//! frames addressed to other sessions.

// Allow dead code in test infrastructure - not every test binary uses every helper
#![allow(dead_code)]

pub mod websocket_mock;

pub use websocket_mock::{MockAzureServer, MockAzureState, RecordedHandshake, Reply};

/// Build a binary audio frame the way the service does:
/// `[u16 BE header len][header][payload]`.
pub fn audio_frame(request_id: Option<&str>, payload: &[u8]) -> Vec<u8> {
    let header = match request_id {
        Some(id) => format!("X-RequestId:{id}\r\nContent-Type:audio/mpeg\r\nPath:audio\r\n"),
        None => "Content-Type:audio/mpeg\r\nPath:audio\r\n".to_string(),
    };
    let mut frame = Vec::with_capacity(2 + header.len() + payload.len());
    frame.extend_from_slice(&(header.len() as u16).to_be_bytes());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Text frame the service sends when the turn is over.
pub fn turn_end_frame(request_id: &str) -> String {
    format!(
        "X-RequestId:{request_id}\r\nContent-Type:application/json; charset=utf-8\r\nPath:turn.end\r\n\r\n{{}}"
    )
}

/// Text frame the service sends when it starts working on a request.
pub fn turn_start_frame(request_id: &str) -> String {
    format!(
        "X-RequestId:{request_id}\r\nContent-Type:application/json; charset=utf-8\r\nPath:turn.start\r\n\r\n{{\"context\":{{\"serviceTag\":\"mock\"}}}}"
    )
}

/// Value of a `Key: Value` header in a text frame.
pub fn frame_header<'a>(frame: &'a str, name: &str) -> Option<&'a str> {
    let head = frame.split("\r\n\r\n").next().unwrap_or(frame);
    head.split("\r\n").find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
    })
}

/// Body of a text frame (everything after the blank line).
pub fn frame_body(frame: &str) -> &str {
    frame.split_once("\r\n\r\n").map_or("", |(_, body)| body)
}

//! Frame classification for the `Roomchat` wire protocol.
//!
//! Every inbound server frame is a single JSON text frame tagged by a `type`
//! field with four known kinds: `joined`, `history`, `message`, `error`.
//! The classifier is deliberately asymmetric about failure:
//!
//! - text that is not JSON at all is flagged as malformed data;
//! - syntactically valid JSON with an unrecognized `type` is ignored
//!   silently, so future frame kinds never break older clients;
//! - malformed payloads inside a *known* frame kind are recovered locally
//!   (entries dropped from a `history` batch, a bad `message` frame ignored,
//!   a blank `error` reason replaced with a generic one).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::RawHistoryEntry;

/// Fallback reason shown when the server sends a blank `error` frame.
pub const GENERIC_SERVER_ERROR: &str = "Server reported an error.";

/// A validated inbound frame, ready for the session reconciler.
#[derive(Debug, Clone)]
pub enum ServerFrame {
    /// Acknowledges successful room entry. No payload.
    Joined,
    /// Full replacement transcript snapshot. Entries that failed id
    /// validation have already been dropped.
    History(Vec<RawHistoryEntry>),
    /// Single incremental message.
    Message(RawHistoryEntry),
    /// Human-readable server-side rejection reason, never blank.
    Error(String),
}

/// Outcome of classifying one raw text frame.
#[derive(Debug, Clone)]
pub enum Classified {
    /// One of the four known frame kinds.
    Frame(ServerFrame),
    /// Valid JSON the protocol does not recognize, discarded without comment.
    Ignored,
    /// Not JSON at all; the session surfaces this as malformed data.
    Malformed,
}

/// Outbound frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// A chat message for the currently joined room.
    Chat {
        /// Message body, non-blank after trimming.
        text: String,
    },
}

/// Raw wire shape before payload validation. Unknown `type` values fail
/// deserialization here, which [`classify`] maps to [`Classified::Ignored`].
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireFrame {
    Joined,
    History {
        #[serde(default)]
        messages: Vec<Value>,
    },
    Message {
        payload: Option<Value>,
    },
    Error {
        message: Option<String>,
    },
}

/// Classify one raw text frame.
///
/// Non-text transport payloads never reach this function; the transport
/// layer reports those as malformed data before classification.
#[must_use]
pub fn classify(text: &str) -> Classified {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Classified::Malformed;
    };
    let Ok(wire) = serde_json::from_value::<WireFrame>(value) else {
        // Forward compatibility: unrecognized frames are noise, not errors.
        return Classified::Ignored;
    };

    match wire {
        WireFrame::Joined => Classified::Frame(ServerFrame::Joined),
        WireFrame::History { messages } => {
            // Partial acceptance: keep the entries that validate.
            let entries = messages.into_iter().filter_map(parse_entry).collect();
            Classified::Frame(ServerFrame::History(entries))
        }
        WireFrame::Message { payload } => match payload.and_then(parse_entry) {
            // A single incremental message has no partial form.
            Some(entry) => Classified::Frame(ServerFrame::Message(entry)),
            None => Classified::Ignored,
        },
        WireFrame::Error { message } => {
            Classified::Frame(ServerFrame::Error(normalize_error_reason(message)))
        }
    }
}

/// Serialize an outbound [`ClientFrame`] as a JSON text frame.
///
/// # Errors
///
/// Returns a [`serde_json::Error`] if serialization fails.
pub fn encode_client(frame: &ClientFrame) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}

/// Parse and validate one embedded history entry.
///
/// The id is the dedup key: a missing, non-numeric, or non-positive id is a
/// hard validation failure for the entry. Everything else is tolerated and
/// degraded later by the normalizer.
fn parse_entry(value: Value) -> Option<RawHistoryEntry> {
    serde_json::from_value::<RawHistoryEntry>(value)
        .ok()
        .filter(|entry| entry.id > 0)
}

/// Trim a server-sent error reason, substituting [`GENERIC_SERVER_ERROR`]
/// when the result would be blank.
fn normalize_error_reason(message: Option<String>) -> String {
    match message.as_deref().map(str::trim) {
        Some(reason) if !reason.is_empty() => reason.to_string(),
        _ => GENERIC_SERVER_ERROR.to_string(),
    }
}

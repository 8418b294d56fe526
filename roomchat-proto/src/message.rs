//! Canonical message type and the tolerant wire-entry normalizer.
//!
//! History entries arrive from an untrusted server. The policy here is to
//! prefer a degraded-but-displayable message over a dropped one: every field
//! except the id falls back to a default when missing or malformed. The id is
//! the transcript's dedup key and gets no such mercy — entries without a
//! positive integer id are rejected upstream by the frame classifier.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Substitute author name for entries whose `userName` is missing or blank.
pub const UNKNOWN_USER: &str = "Unknown";

/// An untrusted history entry as it appears on the wire.
///
/// Only `id` is structurally required. All other fields accept any JSON
/// value and are degraded to defaults by [`normalize`] rather than failing
/// the whole entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawHistoryEntry {
    /// Server-assigned message id. Valid data never carries zero; the
    /// classifier drops entries where it does.
    pub id: u64,
    /// Room the entry belongs to. Part of the wire shape, unused client-side.
    #[serde(default)]
    pub room_id: Value,
    /// Author name; any JSON value tolerated.
    #[serde(default)]
    pub user_name: Value,
    /// Message body; any JSON value tolerated.
    #[serde(default)]
    pub text: Value,
    /// Millisecond epoch timestamp. Servers have been observed sending this
    /// as a string or omitting it entirely.
    #[serde(default)]
    pub timestamp: Value,
}

/// A normalized chat message, canonical within the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Unique id within the transcript (dedup key).
    pub id: u64,
    /// Author display name, never empty.
    pub user_name: String,
    /// Message body, possibly empty.
    pub text: String,
    /// Milliseconds since the UNIX epoch.
    pub timestamp_ms: u64,
}

/// Convert an untrusted wire entry into a canonical [`ChatMessage`].
///
/// Total over its input: malformed sub-fields degrade to per-field defaults
/// instead of propagating an error. A missing or non-numeric timestamp is
/// replaced with the wall clock at normalization time, so client-attached
/// timestamps approximate arrival time rather than authoritative send time.
#[must_use]
pub fn normalize(entry: &RawHistoryEntry) -> ChatMessage {
    normalize_at(entry, now_ms())
}

/// [`normalize`] with an explicit clock, for deterministic tests.
#[must_use]
pub fn normalize_at(entry: &RawHistoryEntry, now_ms: u64) -> ChatMessage {
    let user_name = match entry.user_name.as_str().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => UNKNOWN_USER.to_string(),
    };
    let text = entry
        .text
        .as_str()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    ChatMessage {
        id: entry.id,
        user_name,
        text,
        timestamp_ms: wire_timestamp(&entry.timestamp).unwrap_or(now_ms),
    }
}

/// Extract a positive integral millisecond timestamp from a wire value.
///
/// Accepts integer-valued floats (`1000.0`) since JSON does not distinguish
/// them from integers. Anything else is `None`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn wire_timestamp(value: &Value) -> Option<u64> {
    let millis = value.as_f64()?;
    if millis.is_finite() && millis > 0.0 && millis.fract() == 0.0 && millis <= u64::MAX as f64 {
        Some(millis as u64)
    } else {
        None
    }
}

/// Current wall clock in milliseconds since the UNIX epoch.
#[must_use]
pub fn now_ms() -> u64 {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}

//! The ordered, deduplicated message list for the current session.

use roomchat_proto::message::ChatMessage;

/// Transcript of the current session.
///
/// Incremental messages keep insertion order; a repeated id replaces the
/// existing entry in place rather than appending a duplicate. A `history`
/// frame replaces the whole transcript. Owned exclusively by the session
/// reconciler; presentation only reads it.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<ChatMessage>,
}

impl Transcript {
    /// Creates an empty transcript.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Returns the messages in display order.
    #[must_use]
    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }

    /// Returns the number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the transcript holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes all messages.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Inserts a message, or replaces the existing entry with the same id
    /// in place (the entry keeps its position).
    pub fn upsert(&mut self, message: ChatMessage) {
        match self.entries.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => self.entries.push(message),
        }
    }

    /// Replaces the whole transcript with a snapshot, preserving snapshot
    /// order and collapsing repeated ids via [`upsert`](Self::upsert).
    pub fn replace_all<I: IntoIterator<Item = ChatMessage>>(&mut self, snapshot: I) {
        self.entries.clear();
        for message in snapshot {
            self.upsert(message);
        }
    }
}

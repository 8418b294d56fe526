//! Session state for the `Roomchat` client.
//!
//! The [`Reconciler`] is a pure, synchronous reducer over [`SessionEvent`]s.
//! It owns the two pieces of derived state the presentation layer reads —
//! the transcript and the connection status — plus the last user-facing
//! error notice. All transport and protocol activity is funneled into it as
//! discrete events by the client actor, which also guarantees that events
//! from a superseded connection never reach it.

pub mod transcript;

use std::fmt;

use roomchat_proto::frame::ServerFrame;
use roomchat_proto::message::{ChatMessage, normalize};

use transcript::Transcript;

/// Notice shown when the transport delivers a structurally non-text payload.
pub const MALFORMED_DATA_NOTICE: &str = "Received malformed data from server.";

/// Notice shown when the server rejects the join with close code 400.
pub const REJECTED_NOTICE: &str = "Connection rejected: verify room ID and username.";

/// Notice shown on a generic transport failure.
pub const CONNECTION_ERROR_NOTICE: &str = "Connection error: check the client log for details.";

/// Notice shown when a join is attempted with a blank room or username.
pub const MISSING_IDENTITY_NOTICE: &str = "Both room ID and username are required.";

/// Notice shown when text is sent without a joined session.
pub const NOT_JOINED_NOTICE: &str = "Join a room before sending messages.";

/// Close code the protocol reserves for "join rejected" (bad room/user).
pub const CLOSE_CODE_REJECTED: u16 = 400;

/// The (room, user) pair that keys a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    room_id: String,
    user_name: String,
}

impl Identity {
    /// Trims both components and returns an identity only when both are
    /// non-empty afterwards. An incomplete pair means no connection exists.
    #[must_use]
    pub fn parse(room_id: &str, user_name: &str) -> Option<Self> {
        let room_id = room_id.trim();
        let user_name = user_name.trim();
        if room_id.is_empty() || user_name.is_empty() {
            return None;
        }
        Some(Self {
            room_id: room_id.to_string(),
            user_name: user_name.to_string(),
        })
    }

    /// The room component.
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// The username component.
    #[must_use]
    pub fn user_name(&self) -> &str {
        &self.user_name
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user_name, self.room_id)
    }
}

/// Derived connection status, set only by the [`Reconciler`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No complete identity; waiting for a join.
    #[default]
    AwaitingInput,
    /// Connection being established, or open but not yet acknowledged.
    Connecting,
    /// The server acknowledged the join.
    Connected,
    /// Explicit teardown in progress.
    Closing,
    /// The connection closed without a protocol rejection.
    Disconnected,
    /// A protocol rejection or transport failure; a new join is required.
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::AwaitingInput => "Enter room info",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Closing => "Closing",
            Self::Disconnected => "Disconnected",
            Self::Error => "Error",
        };
        write!(f, "{label}")
    }
}

/// One discrete input to the reducer.
#[derive(Debug)]
pub enum SessionEvent {
    /// The identity became incomplete. The optional notice replaces the
    /// error text after the reset (e.g. for a blank join attempt).
    IdentityCleared {
        /// Notice to surface after the reset, if any.
        notice: Option<String>,
    },
    /// A new complete identity replaced the previous one.
    IdentityChanged,
    /// An explicit leave/shutdown started tearing the connection down.
    TeardownStarted,
    /// The transport reported its connection open.
    TransportOpened,
    /// A classified protocol frame arrived on the current connection.
    Frame(ServerFrame),
    /// The transport delivered a payload that was not text.
    MalformedData,
    /// The connection closed, with the server's close code when present.
    Closed {
        /// Close code supplied by the server, if any.
        code: Option<u16>,
    },
    /// The transport reported a failure (connect or read error).
    TransportFailed,
    /// A user-facing notice with no status change.
    Notice(String),
}

/// Reducer over [`SessionEvent`]s owning transcript, status, and error text.
#[derive(Debug, Default)]
pub struct Reconciler {
    status: ConnectionStatus,
    transcript: Transcript,
    last_error: Option<String>,
}

impl Reconciler {
    /// Creates a reconciler in the `AwaitingInput` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current connection status.
    #[must_use]
    pub const fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Current transcript in display order.
    #[must_use]
    pub fn transcript(&self) -> &[ChatMessage] {
        self.transcript.entries()
    }

    /// The last user-facing error notice, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Applies one event. Runs to completion; never fails.
    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::IdentityCleared { notice } => {
                self.transcript.clear();
                self.last_error = notice;
                self.status = ConnectionStatus::AwaitingInput;
            }
            SessionEvent::IdentityChanged => {
                // Stale messages from a prior room must never bleed into the
                // new room's view: reset before the new connection's events.
                self.transcript.clear();
                self.last_error = None;
                self.status = ConnectionStatus::Connecting;
            }
            SessionEvent::TeardownStarted => {
                self.status = ConnectionStatus::Closing;
            }
            SessionEvent::TransportOpened => {
                self.last_error = None;
                self.status = ConnectionStatus::Connecting;
            }
            SessionEvent::Frame(frame) => self.apply_frame(frame),
            SessionEvent::MalformedData => {
                // Recovered locally; the connection is otherwise unaffected.
                self.last_error = Some(MALFORMED_DATA_NOTICE.to_string());
            }
            SessionEvent::Closed { code } => {
                if code == Some(CLOSE_CODE_REJECTED) {
                    self.last_error = Some(REJECTED_NOTICE.to_string());
                    self.status = ConnectionStatus::Error;
                } else {
                    self.status = ConnectionStatus::Disconnected;
                }
            }
            SessionEvent::TransportFailed => {
                self.last_error = Some(CONNECTION_ERROR_NOTICE.to_string());
                self.status = ConnectionStatus::Error;
            }
            SessionEvent::Notice(text) => {
                self.last_error = Some(text);
            }
        }
    }

    fn apply_frame(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::Joined => {
                self.last_error = None;
                self.status = ConnectionStatus::Connected;
            }
            ServerFrame::History(entries) => {
                self.transcript
                    .replace_all(entries.iter().map(normalize));
                self.last_error = None;
                self.status = ConnectionStatus::Connected;
            }
            ServerFrame::Message(entry) => {
                self.transcript.upsert(normalize(&entry));
            }
            ServerFrame::Error(reason) => {
                self.last_error = Some(reason);
                self.status = ConnectionStatus::Error;
            }
        }
    }
}

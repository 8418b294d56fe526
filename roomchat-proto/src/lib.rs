//! Wire protocol library for `Roomchat`.
//!
//! The server speaks JSON text frames over a WebSocket. This crate owns the
//! untrusted wire shapes, the frame classifier that turns raw text into one
//! of the four known server frame kinds, and the tolerant normalizer that
//! converts untrusted history entries into canonical [`message::ChatMessage`]
//! values. It has no transport or async dependencies so the client's
//! reconciler can be tested against it directly.

pub mod frame;
pub mod message;

//! `Roomchat` — room-based realtime chat client library.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod session;
pub mod transport;

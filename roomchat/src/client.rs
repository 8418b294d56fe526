//! Client actor wiring the presentation boundary to the transport.
//!
//! A single spawned task owns the connection handle, the generation counter,
//! the current identity, and the [`Reconciler`]. It consumes two channels —
//! presentation [`Command`]s and transport [`ConnEvent`]s — and publishes a
//! [`SessionSnapshot`] through a `watch` channel after every state change.
//!
//! # Architecture
//!
//! ```text
//! presentation  ── Command ──▶  actor task  ◀── ConnEvent ──  reader task
//!               ◀─ watch<SessionSnapshot> ─┘
//! ```
//!
//! Because one task serializes all mutation, the only race to close is the
//! stale-event hazard: a frame from a connection that has just been
//! superseded. Every connection is minted a generation number, teardown
//! bumps the counter before anything else, and events carrying a stale
//! generation are discarded on receipt.

use std::time::Duration;

use futures_util::SinkExt;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use roomchat_proto::frame::{self, Classified, ClientFrame};
use roomchat_proto::message::ChatMessage;

use crate::endpoint;
use crate::session::{
    ConnectionStatus, Identity, MISSING_IDENTITY_NOTICE, NOT_JOINED_NOTICE, Reconciler,
    SessionEvent,
};
use crate::transport::{self, ConnEvent, Generation, WsSink};

/// Default channel capacity for command/event mpsc channels.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for establishing a WebSocket connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime configuration for the client actor.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket base URL the join endpoint is derived from.
    pub base_url: String,
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Capacity of the command and transport event channels.
    pub channel_capacity: usize,
}

impl SessionConfig {
    /// Creates a config with default timeout and channel capacity.
    #[must_use]
    pub const fn new(base_url: String) -> Self {
        Self {
            base_url,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Commands accepted at the presentation boundary.
#[derive(Debug)]
pub enum Command {
    /// Join a room under a username, replacing any current session.
    Join {
        /// Room identifier, trimmed by the actor.
        room_id: String,
        /// Username, trimmed by the actor.
        user_name: String,
    },
    /// Send a chat message to the current room.
    SendText {
        /// Message body, trimmed by the actor; blank text is dropped.
        text: String,
    },
    /// Leave the current room and return to `AwaitingInput`.
    Leave,
    /// Tear everything down and stop the actor.
    Shutdown,
}

/// State exposed to presentation: everything it may read, nothing it may set.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    /// The identity of the current session, if any.
    pub identity: Option<Identity>,
    /// Derived connection status.
    pub status: ConnectionStatus,
    /// Ordered, deduplicated transcript.
    pub transcript: Vec<ChatMessage>,
    /// Last user-facing error notice, if any.
    pub last_error: Option<String>,
}

/// The client actor has stopped and no longer accepts commands.
#[derive(Debug, thiserror::Error)]
#[error("client task is no longer running")]
pub struct ClientClosed;

/// Handle returned by [`spawn_client`].
#[derive(Debug, Clone)]
pub struct ClientHandle {
    cmd_tx: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
}

impl ClientHandle {
    /// Join a room under a username, replacing any current session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientClosed`] if the actor has stopped.
    pub async fn join(
        &self,
        room_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Result<(), ClientClosed> {
        self.send(Command::Join {
            room_id: room_id.into(),
            user_name: user_name.into(),
        })
        .await
    }

    /// Send a chat message to the current room.
    ///
    /// # Errors
    ///
    /// Returns [`ClientClosed`] if the actor has stopped.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ClientClosed> {
        self.send(Command::SendText { text: text.into() }).await
    }

    /// Leave the current room.
    ///
    /// # Errors
    ///
    /// Returns [`ClientClosed`] if the actor has stopped.
    pub async fn leave(&self) -> Result<(), ClientClosed> {
        self.send(Command::Leave).await
    }

    /// Stop the actor, closing any live connection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientClosed`] if the actor has already stopped.
    pub async fn shutdown(&self) -> Result<(), ClientClosed> {
        self.send(Command::Shutdown).await
    }

    /// The current session snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Subscribe to snapshot updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    async fn send(&self, command: Command) -> Result<(), ClientClosed> {
        self.cmd_tx.send(command).await.map_err(|_| ClientClosed)
    }
}

/// Spawn the client actor and return its handle.
#[must_use]
pub fn spawn_client(config: SessionConfig) -> ClientHandle {
    let capacity = config.channel_capacity.max(1);
    let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
    let (conn_tx, conn_rx) = mpsc::channel(capacity);
    let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());

    let actor = Actor {
        config,
        reconciler: Reconciler::new(),
        identity: None,
        generation: 0,
        sink: None,
        reader: None,
        conn_tx,
        snapshot_tx,
    };
    tokio::spawn(actor.run(cmd_rx, conn_rx));

    ClientHandle {
        cmd_tx,
        snapshot_rx,
    }
}

/// The actor task's state. All mutation happens here, one event at a time.
struct Actor {
    config: SessionConfig,
    reconciler: Reconciler,
    identity: Option<Identity>,
    /// Generation of the current connection. Bumped by every teardown, so
    /// events queued by a superseded connection identify themselves as stale.
    generation: Generation,
    /// Write half of the current connection, present once it is open.
    sink: Option<Box<WsSink>>,
    /// Reader task of the current connection.
    reader: Option<tokio::task::JoinHandle<()>>,
    conn_tx: mpsc::Sender<ConnEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl Actor {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut conn_rx: mpsc::Receiver<ConnEvent>,
    ) {
        self.publish();
        loop {
            tokio::select! {
                command = cmd_rx.recv() => match command {
                    Some(Command::Join { room_id, user_name }) => {
                        self.handle_join(&room_id, &user_name).await;
                    }
                    Some(Command::SendText { text }) => self.handle_send(&text).await,
                    Some(Command::Leave) => self.handle_leave().await,
                    Some(Command::Shutdown) | None => {
                        self.close_current().await;
                        tracing::info!("client actor shutting down");
                        return;
                    }
                },
                // The actor holds a conn_tx clone, so this never yields None.
                Some(event) = conn_rx.recv() => self.handle_conn_event(event).await,
            }
        }
    }

    /// Identity transition. Tears down any previous connection before the
    /// new one is created, so no frame from a superseded connection can act
    /// on the new session's state.
    async fn handle_join(&mut self, room_id: &str, user_name: &str) {
        let Some(next) = Identity::parse(room_id, user_name) else {
            self.close_current().await;
            self.identity = None;
            self.apply(SessionEvent::IdentityCleared {
                notice: Some(MISSING_IDENTITY_NOTICE.to_string()),
            });
            return;
        };

        // Re-joining the identity we are already connected to is a no-op.
        if self.identity.as_ref() == Some(&next)
            && self.sink.is_some()
            && self.reconciler.status() == ConnectionStatus::Connected
        {
            tracing::debug!(identity = %next, "already connected, ignoring join");
            return;
        }

        let url = match endpoint::join_url(&self.config.base_url, next.room_id(), next.user_name())
        {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(err = %e, "cannot build join endpoint");
                self.close_current().await;
                self.identity = None;
                self.apply(SessionEvent::IdentityCleared {
                    notice: Some(e.to_string()),
                });
                return;
            }
        };

        self.close_current().await;
        tracing::info!(identity = %next, "joining room");
        self.identity = Some(next);
        self.apply(SessionEvent::IdentityChanged);

        self.reader = Some(tokio::spawn(transport::run_connection(
            url,
            self.generation,
            self.config.connect_timeout,
            self.conn_tx.clone(),
        )));
    }

    async fn handle_send(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if self.identity.is_none() {
            self.apply(SessionEvent::Notice(NOT_JOINED_NOTICE.to_string()));
            return;
        }
        let Some(sink) = self.sink.as_mut() else {
            tracing::debug!("socket not open yet, dropping outbound text");
            return;
        };

        let chat = ClientFrame::Chat {
            text: text.to_string(),
        };
        match frame::encode_client(&chat) {
            Ok(json) => {
                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    tracing::warn!(err = %e, "send failed");
                    self.close_current().await;
                    self.apply(SessionEvent::TransportFailed);
                }
            }
            Err(e) => tracing::error!(err = %e, "failed to encode chat frame"),
        }
    }

    async fn handle_leave(&mut self) {
        if self.identity.is_some() || self.sink.is_some() {
            self.apply(SessionEvent::TeardownStarted);
        }
        self.close_current().await;
        self.identity = None;
        self.apply(SessionEvent::IdentityCleared { notice: None });
    }

    async fn handle_conn_event(&mut self, event: ConnEvent) {
        if event.generation() != self.generation {
            tracing::debug!(
                stale = event.generation(),
                current = self.generation,
                "discarding event from superseded connection"
            );
            // The one action a stale connection still gets: its sink is
            // closed instead of installed.
            if let ConnEvent::Opened { sink, .. } = event {
                tokio::spawn(close_sink(sink));
            }
            return;
        }

        match event {
            ConnEvent::Opened { sink, .. } => {
                self.sink = Some(sink);
                self.apply(SessionEvent::TransportOpened);
            }
            ConnEvent::Text { text, .. } => match frame::classify(&text) {
                Classified::Frame(server_frame) => {
                    self.apply(SessionEvent::Frame(server_frame));
                }
                Classified::Ignored => {
                    tracing::debug!("ignoring unrecognized frame");
                }
                Classified::Malformed => {
                    tracing::warn!("unparseable text frame from server");
                    self.apply(SessionEvent::MalformedData);
                }
            },
            ConnEvent::Malformed { .. } => self.apply(SessionEvent::MalformedData),
            ConnEvent::Closed { code, .. } => {
                self.close_current().await;
                self.apply(SessionEvent::Closed { code });
            }
            ConnEvent::Failed { .. } => {
                self.close_current().await;
                self.apply(SessionEvent::TransportFailed);
            }
        }
    }

    /// The single close path for identity change, leave, remote close, and
    /// shutdown. Bumps the generation first, so events already queued by
    /// this connection are discarded, then closes the socket halves.
    async fn close_current(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.send(Message::Close(None)).await;
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    fn apply(&mut self, event: SessionEvent) {
        self.reconciler.apply(event);
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(SessionSnapshot {
            identity: self.identity.clone(),
            status: self.reconciler.status(),
            transcript: self.reconciler.transcript().to_vec(),
            last_error: self.reconciler.last_error().map(ToString::to_string),
        });
    }
}

/// Close the sink of a connection that was superseded before it opened.
async fn close_sink(mut sink: Box<WsSink>) {
    let _ = sink.send(Message::Close(None)).await;
}

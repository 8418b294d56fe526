//! WebSocket transport for the `Roomchat` client.
//!
//! One connection task per session generation. The task connects, hands the
//! write half back to the client actor through the event channel, and then
//! forwards everything the read half produces as [`ConnEvent`]s. Every event
//! carries the generation it was spawned under; the actor discards events
//! whose generation has been superseded, which is what makes teardown safe
//! against frames still in flight from an old connection.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

/// Monotonic connection generation minted by the client actor.
pub type Generation = u64;

/// Type alias for the write half of a WebSocket connection.
pub type WsSink = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Events delivered from a connection task to the client actor.
#[derive(Debug)]
pub enum ConnEvent {
    /// The transport is open; the write half is handed over.
    Opened {
        /// Generation this connection belongs to.
        generation: Generation,
        /// Write half for outbound frames.
        sink: Box<WsSink>,
    },
    /// A text frame arrived.
    Text {
        /// Generation this connection belongs to.
        generation: Generation,
        /// Raw frame payload, not yet classified.
        text: String,
    },
    /// The server sent a structurally non-text payload.
    Malformed {
        /// Generation this connection belongs to.
        generation: Generation,
    },
    /// The connection closed.
    Closed {
        /// Generation this connection belongs to.
        generation: Generation,
        /// Close code supplied by the server, if any.
        code: Option<u16>,
    },
    /// Connecting failed or the read half errored out.
    Failed {
        /// Generation this connection belongs to.
        generation: Generation,
    },
}

impl ConnEvent {
    /// The generation this event belongs to.
    #[must_use]
    pub const fn generation(&self) -> Generation {
        match self {
            Self::Opened { generation, .. }
            | Self::Text { generation, .. }
            | Self::Malformed { generation }
            | Self::Closed { generation, .. }
            | Self::Failed { generation } => *generation,
        }
    }
}

/// Connect to `url` and drive the read half until the connection ends.
///
/// Spawned by the client actor once per join. Connection failures are
/// reported as [`ConnEvent::Failed`] rather than returned; the actor treats
/// them like any other transport event. There is no reconnect loop here — a
/// new join mints a new generation and a new task.
pub async fn run_connection(
    url: Url,
    generation: Generation,
    connect_timeout: Duration,
    evt_tx: mpsc::Sender<ConnEvent>,
) {
    let connected = tokio::time::timeout(connect_timeout, connect_async(url.as_str())).await;
    let ws_stream = match connected {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            tracing::warn!(url = %url, err = %e, "WebSocket connect failed");
            let _ = evt_tx.send(ConnEvent::Failed { generation }).await;
            return;
        }
        Err(_) => {
            tracing::warn!(url = %url, "WebSocket connect timed out");
            let _ = evt_tx.send(ConnEvent::Failed { generation }).await;
            return;
        }
    };

    let (sink, reader) = ws_stream.split();
    if evt_tx
        .send(ConnEvent::Opened {
            generation,
            sink: Box::new(sink),
        })
        .await
        .is_err()
    {
        // Actor gone; nothing to drive.
        return;
    }

    reader_loop(reader, generation, evt_tx).await;
}

/// Forward frames from the read half until the stream ends.
async fn reader_loop(mut reader: WsReader, generation: Generation, evt_tx: mpsc::Sender<ConnEvent>) {
    while let Some(msg_result) = reader.next().await {
        let event = match msg_result {
            Ok(Message::Text(text)) => ConnEvent::Text {
                generation,
                text: text.as_str().to_owned(),
            },
            Ok(Message::Binary(_)) => {
                // The protocol is text frames only; anything else is
                // structurally invalid data from the server.
                tracing::warn!(generation, "non-text frame from server");
                ConnEvent::Malformed { generation }
            }
            Ok(Message::Close(frame)) => {
                let code = frame.map(|f| u16::from(f.code));
                tracing::info!(generation, ?code, "WebSocket closed by server");
                let _ = evt_tx.send(ConnEvent::Closed { generation, code }).await;
                return;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
            Err(e) => {
                tracing::warn!(generation, err = %e, "WebSocket read error");
                let _ = evt_tx.send(ConnEvent::Failed { generation }).await;
                return;
            }
        };

        if evt_tx.send(event).await.is_err() {
            // Actor dropped the receiver; exit.
            return;
        }
    }

    // Stream ended without a close frame.
    let _ = evt_tx
        .send(ConnEvent::Closed {
            generation,
            code: None,
        })
        .await;
}

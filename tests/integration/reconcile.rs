// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::needless_continue,
    clippy::match_same_arms,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::redundant_pub_crate,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for transcript reconciliation over a live socket.
//!
//! A scripted WebSocket server replays a fixed frame sequence per
//! connection. These tests validate the end-to-end path from wire frames to
//! published snapshots:
//! - a `history` frame replaces the whole transcript
//! - a `message` frame appends, or replaces the entry with the same id
//! - structurally invalid history entries are dropped, the rest kept
//! - an `error` frame surfaces its text and parks the session in `Error`
//! - a binary payload surfaces a notice without disturbing the session
//! - a server-initiated close moves the session to `Disconnected`

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use roomchat::client::{SessionConfig, SessionSnapshot, spawn_client};
use roomchat::session::{ConnectionStatus, MALFORMED_DATA_NOTICE};

// ---------------------------------------------------------------------------
// Scripted server helper
// ---------------------------------------------------------------------------

/// Spawn a WebSocket server that sends `script` to every connection, then
/// keeps reading until the client goes away. Returns the `ws://` base URL
/// and a connection counter.
async fn spawn_server(script: Vec<Message>) -> (String, Arc<Mutex<usize>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("ws://{}", listener.local_addr().unwrap());
    let connections = Arc::new(Mutex::new(0usize));

    let accept_count = Arc::clone(&connections);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let count = Arc::clone(&accept_count);
            let script = script.clone();
            tokio::spawn(async move {
                let Ok(ws) = accept_async(stream).await else {
                    return;
                };
                *count.lock() += 1;
                let (mut sink, mut reader) = ws.split();
                for frame in script {
                    if sink.send(frame).await.is_err() {
                        return;
                    }
                }
                while let Some(Ok(_)) = reader.next().await {}
            });
        }
    });

    (base, connections)
}

fn text(frame: &str) -> Message {
    Message::Text(frame.to_string().into())
}

fn close_normal() -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    }))
}

/// Wait until the snapshot satisfies `pred`, with a timeout.
async fn wait_for(
    rx: &mut watch::Receiver<SessionSnapshot>,
    pred: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if pred(&snapshot) {
                    return snapshot.clone();
                }
            }
            rx.changed().await.expect("client actor stopped");
        }
    })
    .await
    .expect("timed out waiting for snapshot")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_frame_replaces_the_transcript() {
    let (base, _) = spawn_server(vec![
        text(r#"{"type":"joined"}"#),
        text(
            r#"{"type":"history","messages":[
                {"id":1,"roomId":"lobby","userName":"bob","text":"first","timestamp":1000},
                {"id":2,"roomId":"lobby","userName":"eve","text":"second","timestamp":2000}
            ]}"#,
        ),
    ])
    .await;
    let handle = spawn_client(SessionConfig::new(base));
    let mut rx = handle.subscribe();

    handle.join("lobby", "alice").await.unwrap();
    let snapshot = wait_for(&mut rx, |s| s.transcript.len() == 2).await;

    assert_eq!(snapshot.status, ConnectionStatus::Connected);
    let ids: Vec<u64> = snapshot.transcript.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(snapshot.transcript[0].user_name, "bob");
    assert_eq!(snapshot.transcript[1].text, "second");
}

#[tokio::test]
async fn message_frames_upsert_by_id() {
    let (base, _) = spawn_server(vec![
        text(r#"{"type":"joined"}"#),
        text(
            r#"{"type":"history","messages":[
                {"id":1,"userName":"bob","text":"original","timestamp":1000}
            ]}"#,
        ),
        text(r#"{"type":"message","payload":{"id":1,"userName":"bob","text":"edited","timestamp":1000}}"#),
        text(r#"{"type":"message","payload":{"id":2,"userName":"eve","text":"fresh","timestamp":2000}}"#),
    ])
    .await;
    let handle = spawn_client(SessionConfig::new(base));
    let mut rx = handle.subscribe();

    handle.join("lobby", "alice").await.unwrap();
    let snapshot = wait_for(&mut rx, |s| s.transcript.len() == 2).await;

    let ids: Vec<u64> = snapshot.transcript.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(snapshot.transcript[0].text, "edited");
    assert_eq!(snapshot.transcript[1].text, "fresh");
}

#[tokio::test]
async fn invalid_history_entries_are_dropped() {
    let (base, _) = spawn_server(vec![
        text(r#"{"type":"joined"}"#),
        text(
            r#"{"type":"history","messages":[
                {"id":1,"userName":"bob","text":"kept","timestamp":1000},
                {"id":0,"userName":"bob","text":"zero id"},
                "not an object",
                {"userName":"bob","text":"no id"},
                {"id":2,"userName":null,"text":42,"timestamp":"soon"}
            ]}"#,
        ),
    ])
    .await;
    let handle = spawn_client(SessionConfig::new(base));
    let mut rx = handle.subscribe();

    handle.join("lobby", "alice").await.unwrap();
    let snapshot = wait_for(&mut rx, |s| s.transcript.len() == 2).await;

    // Entry 1 survives intact; entry 2 survives with every field degraded
    // to its fallback. Everything else is dropped.
    assert_eq!(snapshot.transcript[0].text, "kept");
    let degraded = &snapshot.transcript[1];
    assert_eq!(degraded.id, 2);
    assert_eq!(degraded.user_name, "Unknown");
    assert_eq!(degraded.text, "");
}

#[tokio::test]
async fn error_frame_surfaces_text_and_parks_in_error() {
    let (base, _) = spawn_server(vec![
        text(r#"{"type":"joined"}"#),
        text(r#"{"type":"error","message":"room is full"}"#),
    ])
    .await;
    let handle = spawn_client(SessionConfig::new(base));
    let mut rx = handle.subscribe();

    handle.join("lobby", "alice").await.unwrap();
    let snapshot = wait_for(&mut rx, |s| s.status == ConnectionStatus::Error).await;
    assert_eq!(snapshot.last_error.as_deref(), Some("room is full"));
}

#[tokio::test]
async fn binary_payload_surfaces_notice_without_status_change() {
    let (base, _) = spawn_server(vec![
        text(r#"{"type":"joined"}"#),
        Message::Binary(vec![0xde, 0xad].into()),
    ])
    .await;
    let handle = spawn_client(SessionConfig::new(base));
    let mut rx = handle.subscribe();

    handle.join("lobby", "alice").await.unwrap();
    let snapshot = wait_for(&mut rx, |s| s.last_error.is_some()).await;
    assert_eq!(snapshot.last_error.as_deref(), Some(MALFORMED_DATA_NOTICE));
    assert_eq!(snapshot.status, ConnectionStatus::Connected);
}

#[tokio::test]
async fn non_json_text_surfaces_notice_without_status_change() {
    let (base, _) = spawn_server(vec![text(r#"{"type":"joined"}"#), text("definitely not json")]).await;
    let handle = spawn_client(SessionConfig::new(base));
    let mut rx = handle.subscribe();

    handle.join("lobby", "alice").await.unwrap();
    let snapshot = wait_for(&mut rx, |s| s.last_error.is_some()).await;
    assert_eq!(snapshot.last_error.as_deref(), Some(MALFORMED_DATA_NOTICE));
    assert_eq!(snapshot.status, ConnectionStatus::Connected);
}

#[tokio::test]
async fn server_close_moves_session_to_disconnected() {
    let (base, _) = spawn_server(vec![text(r#"{"type":"joined"}"#), close_normal()]).await;
    let handle = spawn_client(SessionConfig::new(base));
    let mut rx = handle.subscribe();

    handle.join("lobby", "alice").await.unwrap();
    let snapshot = wait_for(&mut rx, |s| s.status == ConnectionStatus::Disconnected).await;
    assert!(snapshot.last_error.is_none());
}

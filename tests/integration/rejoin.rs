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

//! Integration tests for identity changes, leave, and rejoin.
//!
//! The scripted server here takes one script per connection, each with an
//! optional delay before its frames, which lets a test leave a superseded
//! connection's frames in flight across an identity change:
//! - `leave` tears everything down and returns to `AwaitingInput`
//! - rejoining the identity of a healthy session opens no new connection
//! - frames from a superseded connection never reach the new session
//! - rejoining after an error clears it and connects cleanly

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use roomchat::client::{SessionConfig, SessionSnapshot, spawn_client};
use roomchat::session::ConnectionStatus;

// ---------------------------------------------------------------------------
// Scripted server helper
// ---------------------------------------------------------------------------

/// One server-side script: wait `delay`, then send the frames.
type Script = (Duration, Vec<Message>);

/// Spawn a WebSocket server where connection `n` runs `scripts[n]` (the last
/// script repeats for any further connections). Returns the `ws://` base URL
/// and a connection counter.
async fn spawn_server(scripts: Vec<Script>) -> (String, Arc<Mutex<usize>>) {
    assert!(!scripts.is_empty());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("ws://{}", listener.local_addr().unwrap());
    let connections = Arc::new(Mutex::new(0usize));

    let accept_count = Arc::clone(&connections);
    tokio::spawn(async move {
        let mut accepted = 0usize;
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let (delay, frames) = scripts[accepted.min(scripts.len() - 1)].clone();
            accepted += 1;
            let count = Arc::clone(&accept_count);
            tokio::spawn(async move {
                let Ok(ws) = accept_async(stream).await else {
                    return;
                };
                *count.lock() += 1;
                tokio::time::sleep(delay).await;
                let (mut sink, mut reader) = ws.split();
                for frame in frames {
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

fn immediately() -> Duration {
    Duration::ZERO
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
async fn leave_returns_to_awaiting_input() {
    let (base, _) = spawn_server(vec![(
        immediately(),
        vec![
            text(r#"{"type":"joined"}"#),
            text(r#"{"type":"history","messages":[{"id":1,"userName":"bob","text":"hi"}]}"#),
        ],
    )])
    .await;
    let handle = spawn_client(SessionConfig::new(base));
    let mut rx = handle.subscribe();

    handle.join("lobby", "alice").await.unwrap();
    wait_for(&mut rx, |s| s.transcript.len() == 1).await;

    handle.leave().await.unwrap();
    let snapshot = wait_for(&mut rx, |s| s.status == ConnectionStatus::AwaitingInput).await;
    assert!(snapshot.identity.is_none());
    assert!(snapshot.transcript.is_empty());
    assert!(snapshot.last_error.is_none());
}

#[tokio::test]
async fn rejoining_a_healthy_session_opens_no_new_connection() {
    let (base, connections) =
        spawn_server(vec![(immediately(), vec![text(r#"{"type":"joined"}"#)])]).await;
    let handle = spawn_client(SessionConfig::new(base));
    let mut rx = handle.subscribe();

    handle.join("lobby", "alice").await.unwrap();
    wait_for(&mut rx, |s| s.status == ConnectionStatus::Connected).await;

    handle.join("lobby", "alice").await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(*connections.lock(), 1);
    assert_eq!(handle.snapshot().status, ConnectionStatus::Connected);
}

#[tokio::test]
async fn frames_from_a_superseded_connection_are_suppressed() {
    // Connection 1 (the room being left) holds its frames until well after
    // the identity change; connection 2 answers immediately.
    let (base, _) = spawn_server(vec![
        (
            Duration::from_millis(400),
            vec![
                text(r#"{"type":"joined"}"#),
                text(
                    r#"{"type":"history","messages":[
                        {"id":100,"userName":"bob","text":"old room"},
                        {"id":101,"userName":"bob","text":"old room too"}
                    ]}"#,
                ),
            ],
        ),
        (
            immediately(),
            vec![
                text(r#"{"type":"joined"}"#),
                text(r#"{"type":"history","messages":[{"id":1,"userName":"eve","text":"new room"}]}"#),
            ],
        ),
    ])
    .await;
    let handle = spawn_client(SessionConfig::new(base));
    let mut rx = handle.subscribe();

    handle.join("old-room", "alice").await.unwrap();
    // Let the first connection establish before superseding it.
    tokio::time::sleep(Duration::from_millis(150)).await;
    handle.join("new-room", "alice").await.unwrap();

    wait_for(&mut rx, |s| s.transcript.len() == 1).await;

    // Outlive the first connection's delayed frames, then check nothing
    // from the old room leaked through.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let snapshot = handle.snapshot();
    let ids: Vec<u64> = snapshot.transcript.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1]);
    assert_eq!(snapshot.transcript[0].text, "new room");
}

#[tokio::test]
async fn rejoin_after_error_clears_it_and_connects() {
    // First connection rejects with an error frame; the second accepts.
    let (base, _) = spawn_server(vec![
        (
            immediately(),
            vec![text(r#"{"type":"error","message":"try again"}"#)],
        ),
        (immediately(), vec![text(r#"{"type":"joined"}"#)]),
    ])
    .await;
    let handle = spawn_client(SessionConfig::new(base));
    let mut rx = handle.subscribe();

    handle.join("lobby", "alice").await.unwrap();
    let snapshot = wait_for(&mut rx, |s| s.status == ConnectionStatus::Error).await;
    assert_eq!(snapshot.last_error.as_deref(), Some("try again"));

    handle.join("lobby", "alice").await.unwrap();
    let snapshot = wait_for(&mut rx, |s| s.status == ConnectionStatus::Connected).await;
    assert!(snapshot.last_error.is_none());
}

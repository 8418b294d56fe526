//! `Roomchat` — room-based realtime chat client.
//!
//! Line-oriented client for a room chat server. Configuration via CLI flags,
//! environment variables, or config file (`~/.config/roomchat/config.toml`).
//!
//! ```bash
//! # Join on startup
//! cargo run --bin roomchat -- --ws-port 8787 --room lobby --user alice
//!
//! # Or via environment variables
//! ROOMCHAT_WS_URL=ws://127.0.0.1:8787 cargo run --bin roomchat
//! ```
//!
//! Interactive commands: `/join <room> <user>`, `/leave`, `/quit`; any other
//! line is sent as a chat message.

use std::collections::HashSet;
use std::io;
use std::path::Path;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;

use roomchat::client::{self, ClientHandle, SessionSnapshot};
use roomchat::config::{CliArgs, ClientConfig};
use roomchat::session::{ConnectionStatus, Identity};

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    // Logs go to a file so they don't interleave with the chat output.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("roomchat starting");

    let session_config = match config.to_session_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return Ok(());
        }
    };

    let handle = client::spawn_client(session_config);

    // Auto-join from CLI flags when both are present.
    if let (Some(room), Some(user)) = (cli.room.as_deref(), cli.user.as_deref())
        && handle.join(room, user).await.is_err()
    {
        eprintln!("Error: client stopped before startup join");
        return Ok(());
    }

    run_repl(&handle, &config.timestamp_format).await;

    let _ = handle.shutdown().await;
    tracing::info!("roomchat exiting");
    Ok(())
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("roomchat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Read stdin lines and snapshot updates until `/quit` or EOF.
async fn run_repl(handle: &ClientHandle, timestamp_format: &str) {
    let mut snapshot_rx = handle.subscribe();
    let mut printer = Printer::new(timestamp_format);
    printer.render(&handle.snapshot());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !dispatch_line(handle, &line).await {
                        return;
                    }
                }
                Ok(None) | Err(_) => return,
            },
            changed = snapshot_rx.changed() => {
                if changed.is_err() {
                    // Actor stopped; nothing further to display.
                    return;
                }
                let snapshot = snapshot_rx.borrow_and_update().clone();
                printer.render(&snapshot);
            }
        }
    }
}

/// Dispatch one input line. Returns `false` when the REPL should exit.
async fn dispatch_line(handle: &ClientHandle, line: &str) -> bool {
    let trimmed = line.trim();
    let mut parts = trimmed.split_whitespace();
    let result = if parts.next() == Some("/join") {
        let room = parts.next().unwrap_or("");
        let user = parts.next().unwrap_or("");
        handle.join(room, user).await
    } else if trimmed == "/leave" {
        handle.leave().await
    } else if trimmed == "/quit" {
        return false;
    } else if trimmed.is_empty() {
        return true;
    } else {
        handle.send_text(trimmed).await
    };

    if result.is_err() {
        eprintln!("Error: client stopped");
        return false;
    }
    true
}

/// Incremental console renderer for session snapshots.
///
/// Prints status transitions, new error notices, and messages not yet seen.
/// Message ids reset when the identity changes, so a rejoined room's history
/// prints again in full.
struct Printer {
    timestamp_format: String,
    last_status: Option<ConnectionStatus>,
    last_error: Option<String>,
    identity: Option<Identity>,
    printed_ids: HashSet<u64>,
}

impl Printer {
    fn new(timestamp_format: &str) -> Self {
        Self {
            timestamp_format: timestamp_format.to_string(),
            last_status: None,
            last_error: None,
            identity: None,
            printed_ids: HashSet::new(),
        }
    }

    fn render(&mut self, snapshot: &SessionSnapshot) {
        if snapshot.identity != self.identity {
            self.identity = snapshot.identity.clone();
            self.printed_ids.clear();
        }

        if self.last_status != Some(snapshot.status) {
            self.last_status = Some(snapshot.status);
            match &snapshot.identity {
                Some(identity) => println!("[{}] {identity}", snapshot.status),
                None => println!("[{}]", snapshot.status),
            }
        }

        if snapshot.last_error != self.last_error {
            self.last_error = snapshot.last_error.clone();
            if let Some(error) = &snapshot.last_error {
                println!("! {error}");
            }
        }

        for message in &snapshot.transcript {
            if self.printed_ids.insert(message.id) {
                let ts = format_timestamp_ms(message.timestamp_ms, &self.timestamp_format);
                println!("{ts} <{}> {}", message.user_name, message.text);
            }
        }
    }
}

/// Format an epoch-millisecond timestamp with a chrono format string.
fn format_timestamp_ms(ms: u64, format: &str) -> String {
    use chrono::{Local, TimeZone};
    let secs = (ms / 1000).cast_signed();
    let nsecs = u32::try_from((ms % 1000) * 1_000_000).unwrap_or(0);
    match Local.timestamp_opt(secs, nsecs) {
        chrono::LocalResult::Single(dt) => dt.format(format).to_string(),
        _ => "??:??".to_string(),
    }
}

//! TCP accept loop and per-connection plumbing.
//!
//! Frames are newline-delimited JSON. Each accepted socket gets a fresh
//! `ConnId`, a writer task draining its outbound channel, and a read loop
//! that parses events and hands them to the gateway. Ledger work is
//! synchronous SQLite, so event handling runs on the blocking pool.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crucible_types::ConnId;

use crate::constants::{DEFAULT_BIND_ADDRESS, RECONCILE_INTERVAL};
use crate::gateway::Gateway;
use crate::protocol::{ClientEvent, ErrorCode, ServerMessage};

/// Bind and serve until the process is killed.
pub async fn run(gateway: Arc<Gateway>, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind((DEFAULT_BIND_ADDRESS, port)).await?;
    tracing::info!(port, "listening");

    let sweeper = gateway.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RECONCILE_INTERVAL);
        loop {
            ticker.tick().await;
            sweeper.reconcile();
        }
    });

    loop {
        let (stream, peer) = listener.accept().await?;
        let gateway = gateway.clone();
        tokio::spawn(async move {
            let conn = ConnId::new();
            tracing::info!(conn = %conn.short(), %peer, "connection accepted");
            if let Err(err) = serve_connection(gateway.clone(), conn, stream).await {
                tracing::debug!(conn = %conn.short(), %err, "connection error");
            }
            gateway.disconnect(conn);
        });
    }
}

async fn serve_connection(
    gateway: Arc<Gateway>,
    conn: ConnId,
    stream: TcpStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    gateway.register(conn, tx.clone());

    let writer_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let mut line = match serde_json::to_vec(&msg) {
                Ok(line) => line,
                Err(err) => {
                    tracing::error!(%err, "unserializable server message");
                    continue;
                }
            };
            line.push(b'\n');
            if writer.write_all(&line).await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let event: ClientEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(err) => {
                let _ = tx.send(ServerMessage::Error {
                    code: ErrorCode::Validation,
                    message: format!("unparseable event: {err}"),
                });
                continue;
            }
        };

        // SQLite work must not stall the runtime.
        let handler = gateway.clone();
        let reply =
            tokio::task::spawn_blocking(move || handler.handle_event(conn, event)).await?;
        let _ = tx.send(reply);
    }

    drop(tx);
    let _ = writer_task.await;
    Ok(())
}

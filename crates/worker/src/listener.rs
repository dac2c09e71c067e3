//! TCP control-channel listener.
//!
//! Accepts any number of concurrent connections. Each connection runs in
//! its own task, reads newline-delimited `account:action[:arg]*` lines
//! until the peer closes, and hands every line to the [`Supervisor`].
//! Bad lines are logged and skipped; they never close the connection or
//! affect other clients. Nothing is written back to the peer.

use std::net::SocketAddr;

use osverify_core::protocol::ProtocolError;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::supervisor::{NotificationError, Supervisor};

pub struct NotificationListener {
    listener: TcpListener,
}

impl NotificationListener {
    pub async fn bind(addr: impl ToSocketAddrs) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `cancel` fires, then close every open
    /// connection and return.
    pub async fn run(self, supervisor: Supervisor, cancel: CancellationToken) {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(%addr, "Notification listener started");
        }
        let connections = TaskTracker::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "Client connected");
                        connections.spawn(handle_connection(
                            stream,
                            peer,
                            supervisor.clone(),
                            cancel.child_token(),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        connections.close();
        connections.wait().await;
        tracing::info!("Notification listener stopped");
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    supervisor: Supervisor,
    cancel: CancellationToken,
) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(%peer, "Closing connection on shutdown");
                break;
            }
            read = reader.read_until(b'\n', &mut buf) => match read {
                Ok(0) => {
                    tracing::debug!(%peer, "Client disconnected");
                    break;
                }
                Ok(_) => {
                    match std::str::from_utf8(&buf) {
                        Ok(line) => process_line(&supervisor, peer, line).await,
                        Err(e) => {
                            tracing::warn!(%peer, error = %e, "Ignoring notification that is not valid UTF-8");
                        }
                    }
                    buf.clear();
                }
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "Connection read error");
                    break;
                }
            },
        }
    }
}

async fn process_line(supervisor: &Supervisor, peer: SocketAddr, line: &str) {
    tracing::info!(%peer, line = %line.trim(), "Received notification");

    match supervisor.handle_line(line).await {
        Ok(report) => {
            tracing::info!(
                account = %report.account,
                outcome = ?report.outcome,
                terminated_job = ?report.terminated.as_ref().map(|job| job.id),
                "Notification applied",
            );
        }
        Err(NotificationError::Protocol(ProtocolError::Empty)) => {}
        Err(e @ NotificationError::Protocol(_)) => {
            tracing::warn!(%peer, error = %e, "Ignoring malformed notification");
        }
        Err(e @ NotificationError::Store(_)) => {
            tracing::error!(%peer, error = %e, "Notification rejected by account store");
        }
    }
}

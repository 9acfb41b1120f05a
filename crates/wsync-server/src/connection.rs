//! Connection loop over text-frame channels

use crate::error::ServerError;
use crate::metrics;
use crate::server::WorldServer;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use wsync_envelope::{encode, Envelope};

/// Frames in flight per direction for spawned connections
pub const DEFAULT_FRAME_BUFFER: usize = 64;

/// Client side of a spawned connection
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Frames to the server; dropping it closes the connection
    pub inbound: mpsc::Sender<String>,
    /// Frames from the server; yields `None` once the server side closed
    pub outbound: mpsc::Receiver<String>,
    pub task: JoinHandle<Result<(), ServerError>>,
}

/// Spawn a session for one connection on the current runtime
#[must_use]
pub fn spawn_connection(server: &Arc<WorldServer>, buffer: usize) -> ConnectionHandle {
    let (inbound_tx, inbound_rx) = mpsc::channel(buffer.max(1));
    let (outbound_tx, outbound_rx) = mpsc::channel(buffer.max(1));
    let task = tokio::spawn(run_connection(Arc::clone(server), inbound_rx, outbound_tx));
    ConnectionHandle {
        inbound: inbound_tx,
        outbound: outbound_rx,
        task,
    }
}

/// Serve one connection until either side closes
///
/// Inbound frames are answered in order; events produced by other sessions
/// are pushed whenever the timeline grows.
pub async fn run_connection(
    server: Arc<WorldServer>,
    mut inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<String>,
) -> Result<(), ServerError> {
    let mut session = server.session();
    let mut latest = server.watch_latest();
    metrics::connection_opened();
    tracing::debug!(session_id = %session.session_id(), "connection opened");

    let result = loop {
        tokio::select! {
            frame = inbound.recv() => {
                let Some(text) = frame else { break Ok(()) };
                let replies = session.handle_text(&text).await;
                if let Err(err) = send_all(&outbound, &replies).await {
                    break Err(err);
                }
            }
            changed = latest.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let events = session.poll_events();
                if let Err(err) = send_all(&outbound, &events).await {
                    break Err(err);
                }
            }
        }
    };

    metrics::connection_closed();
    match &result {
        Ok(()) => tracing::debug!(session_id = %session.session_id(), "connection closed"),
        Err(err) => tracing::warn!(
            session_id = %session.session_id(),
            error = %err,
            "connection ended"
        ),
    }
    result
}

async fn send_all(outbound: &mpsc::Sender<String>, envelopes: &[Envelope]) -> Result<(), ServerError> {
    for envelope in envelopes {
        let text = encode(envelope).map_err(|e| ServerError::Encode(e.to_string()))?;
        outbound
            .send(text)
            .await
            .map_err(|_| ServerError::ConnectionClosed)?;
    }
    Ok(())
}

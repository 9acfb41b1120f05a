//! Text-frame transport seam
//!
//! The driver only needs ordered text frames in both directions and a close
//! signal. WebSocket adapters live with the embedder; the channel pair here
//! is enough to run against an in-process server.

use crate::error::ClientError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One open connection
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: String) -> Result<(), ClientError>;

    /// Next inbound frame; `None` once the peer has closed
    async fn recv(&mut self) -> Option<Result<String, ClientError>>;

    async fn close(&mut self);
}

/// Opens transports to a URL
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ClientError>;
}

/// Transport over a pair of frame channels
#[derive(Debug)]
pub struct ChannelTransport {
    outbound: Option<mpsc::Sender<String>>,
    inbound: mpsc::Receiver<String>,
}

impl ChannelTransport {
    /// Transport over an outbound and inbound channel pair
    #[must_use]
    pub fn new(outbound: mpsc::Sender<String>, inbound: mpsc::Receiver<String>) -> Self {
        Self {
            outbound: Some(outbound),
            inbound,
        }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, frame: String) -> Result<(), ClientError> {
        let Some(outbound) = &self.outbound else {
            return Err(ClientError::Transport("transport closed".to_string()));
        };
        outbound
            .send(frame)
            .await
            .map_err(|_| ClientError::Transport("peer closed the connection".to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ClientError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.outbound = None;
        self.inbound.close();
    }
}

type Dial = dyn Fn(&str) -> Result<(mpsc::Sender<String>, mpsc::Receiver<String>), ClientError>
    + Send
    + Sync;

/// Connector backed by a closure that yields a channel pair per dial
#[derive(Clone)]
pub struct ChannelConnector {
    dial: Arc<Dial>,
}

impl ChannelConnector {
    /// Connector that calls `dial` with the server url on every connect
    pub fn new<F>(dial: F) -> Self
    where
        F: Fn(&str) -> Result<(mpsc::Sender<String>, mpsc::Receiver<String>), ClientError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            dial: Arc::new(dial),
        }
    }
}

impl fmt::Debug for ChannelConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConnector").finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ClientError> {
        let (outbound, inbound) = (self.dial)(url)?;
        tracing::debug!(url, "channel transport opened");
        Ok(Box::new(ChannelTransport::new(outbound, inbound)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_flow_until_close() {
        let (to_peer, mut peer_rx) = mpsc::channel(4);
        let (peer_tx, from_peer) = mpsc::channel(4);
        let mut transport = ChannelTransport::new(to_peer, from_peer);

        transport.send("hello".to_string()).await.unwrap();
        assert_eq!(peer_rx.recv().await.as_deref(), Some("hello"));

        peer_tx.send("ack".to_string()).await.unwrap();
        assert_eq!(transport.recv().await, Some(Ok("ack".to_string())));

        drop(peer_tx);
        assert_eq!(transport.recv().await, None);

        transport.close().await;
        assert!(transport.send("late".to_string()).await.is_err());
        assert_eq!(peer_rx.recv().await, None);
    }

    #[tokio::test]
    async fn dial_errors_surface() {
        let connector =
            ChannelConnector::new(|_| Err(ClientError::Transport("refused".to_string())));
        assert!(connector.connect("ws://local").await.is_err());
    }
}

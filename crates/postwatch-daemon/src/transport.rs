//! Firehose transport
//!
//! The session only needs "connect, then pull binary frames until the
//! connection ends". [`FrameTransport`] captures that so the supervisor can
//! run against the real WebSocket relay or a scripted transport in tests.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// Connection-level failures
#[derive(Error, Debug)]
pub enum TransportError {
    /// Could not establish the connection
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// The connection broke mid-stream
    #[error("connection lost: {0}")]
    Read(String),

    /// Nothing arrived for too long; the connection is presumed dead
    #[error("no frames received for {0:?}")]
    Idle(Duration),
}

/// Default interval between WebSocket pings
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(20);

/// Opens connections to a firehose
#[async_trait]
pub trait FrameTransport: Send + Sync {
    /// Connect, optionally resuming after sequence number `cursor`
    async fn connect(&self, cursor: Option<i64>) -> Result<Box<dyn FrameStream>, TransportError>;
}

/// One open firehose connection
#[async_trait]
pub trait FrameStream: Send {
    /// Next binary frame; `None` once the remote side closed cleanly
    async fn next_frame(&mut self) -> Option<Result<Vec<u8>, TransportError>>;

    /// Close the connection
    async fn close(&mut self) {}
}

/// `com.atproto.sync.subscribeRepos` over WebSocket
pub struct WebSocketTransport {
    url: String,
    ping_interval: Duration,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ping_interval: DEFAULT_PING_INTERVAL,
        }
    }

    /// Send a ping this often so a dead peer surfaces as a write error
    pub fn with_ping_interval(mut self, ping_interval: Duration) -> Self {
        self.ping_interval = ping_interval;
        self
    }

    fn url_with_cursor(&self, cursor: Option<i64>) -> String {
        match cursor {
            Some(seq) => {
                let sep = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{}cursor={}", self.url, sep, seq)
            }
            None => self.url.clone(),
        }
    }
}

#[async_trait]
impl FrameTransport for WebSocketTransport {
    async fn connect(&self, cursor: Option<i64>) -> Result<Box<dyn FrameStream>, TransportError> {
        let url = self.url_with_cursor(cursor);
        let (stream, response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        debug!(url = %url, status = %response.status(), "WebSocket handshake complete");

        let mut ping = tokio::time::interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ok(Box::new(WebSocketFrames { stream, ping }))
    }
}

struct WebSocketFrames {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ping: Interval,
}

#[async_trait]
impl FrameStream for WebSocketFrames {
    async fn next_frame(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        loop {
            let next = tokio::select! {
                next = self.stream.next() => next,
                _ = self.ping.tick() => {
                    if let Err(e) = self.stream.send(Message::Ping(Default::default())).await {
                        return Some(Err(TransportError::Read(format!("ping failed: {e}"))));
                    }
                    continue;
                }
            };
            match next {
                Some(Ok(Message::Binary(data))) => return Some(Ok(data.to_vec())),
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "relay sent Close frame");
                    return None;
                }
                Some(Ok(Message::Text(text))) => {
                    warn!(len = text.len(), "ignoring unexpected text message");
                }
                // Ping, Pong, raw frames; tungstenite answers pings itself
                Some(Ok(_)) => {}
                Some(Err(e)) => return Some(Err(TransportError::Read(e.to_string()))),
                None => return None,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "error while closing WebSocket");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_with_cursor() {
        let transport = WebSocketTransport::new("wss://bsky.network/xrpc/com.atproto.sync.subscribeRepos");
        assert_eq!(
            transport.url_with_cursor(None),
            "wss://bsky.network/xrpc/com.atproto.sync.subscribeRepos"
        );
        assert_eq!(
            transport.url_with_cursor(Some(1234)),
            "wss://bsky.network/xrpc/com.atproto.sync.subscribeRepos?cursor=1234"
        );

        let transport = WebSocketTransport::new("ws://localhost:2470/xrpc/x?compress=false");
        assert_eq!(
            transport.url_with_cursor(Some(5)),
            "ws://localhost:2470/xrpc/x?compress=false&cursor=5"
        );
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_error() {
        let transport = WebSocketTransport::new("ws://127.0.0.1:9/xrpc/com.atproto.sync.subscribeRepos");
        match transport.connect(None).await {
            Err(TransportError::Connect { url, .. }) => assert!(url.starts_with("ws://127.0.0.1:9")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("connection should have been refused"),
        }
    }
}

//! Push Channel Client
//!
//! Optional WebSocket on which the tunnel service sends unsolicited
//! `{"type": "traffic" | "status", ...}` JSON frames.

use crate::wire::PushMessage;
use futures_util::StreamExt;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

/// Push channel errors
#[derive(Debug, Error)]
pub enum PushError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Malformed push message: {0}")]
    Decode(String),

    #[error("Push handshake timeout after {0:?}")]
    Timeout(Duration),
}

/// Connects to the push endpoint
#[derive(Debug, Clone)]
pub struct PushClient {
    url: String,
    /// Bound on TCP connect + WebSocket handshake
    timeout: Duration,
}

impl PushClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Open the WebSocket
    pub async fn connect(&self) -> Result<PushStream, PushError> {
        let (ws, _response) = tokio::time::timeout(self.timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| PushError::Timeout(self.timeout))??;
        info!("Push channel connected ({})", self.url);
        Ok(PushStream { ws })
    }
}

/// An open push channel
pub struct PushStream {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl PushStream {
    /// Next decoded message; `None` once the server closes the socket.
    ///
    /// Control frames are skipped. A frame that fails to decode yields
    /// `Some(Err(PushError::Decode))` and the stream stays usable.
    pub async fn next(&mut self) -> Option<Result<PushMessage, PushError>> {
        loop {
            let frame = match self.ws.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(e.into())),
            };

            match frame {
                WsMessage::Text(text) => return Some(decode(text.as_bytes())),
                WsMessage::Binary(data) => return Some(decode(&data)),
                WsMessage::Close(_) => {
                    debug!("Push channel closed by server");
                    return None;
                }
                _ => continue,
            }
        }
    }
}

fn decode(bytes: &[u8]) -> Result<PushMessage, PushError> {
    serde_json::from_slice(bytes).map_err(|e| PushError::Decode(e.to_string()))
}

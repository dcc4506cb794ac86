//! Connection seam of the transport channel.
//!
//! A [`Connector`] opens one [`Link`] per connection attempt. The transport
//! channel owns reconnection and subscription; links only move text frames.

use async_trait::async_trait;
use compact_str::CompactString;
use thiserror::Error;
use url::Url;

/// Errors raised while opening or using a link.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The dispatch server URL or handshake request could not be built.
    #[error("invalid connection request: {0}")]
    InvalidRequest(String),

    /// WebSocket protocol or I/O failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The link was closed while sending.
    #[error("link closed")]
    Closed,
}

/// Who is connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub worker_id: CompactString,
}

impl WorkerIdentity {
    pub fn new(worker_id: impl Into<CompactString>) -> Self {
        Self {
            worker_id: worker_id.into(),
        }
    }
}

/// Auth credential presented on connect. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Everything a connector needs to open a link.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub url: Url,
    pub identity: WorkerIdentity,
    pub credential: Credential,
}

/// Opens links to the dispatch server.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, target: &ConnectTarget) -> Result<Box<dyn Link>, TransportError>;
}

/// One open bidirectional connection.
#[async_trait]
pub trait Link: Send {
    /// Next inbound text frame.
    ///
    /// `None` means the peer closed the link. Must be cancel safe: the
    /// transport polls it inside `select!`.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the link gracefully. Errors are ignored.
    async fn close(&mut self);
}

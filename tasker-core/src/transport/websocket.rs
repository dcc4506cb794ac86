//! WebSocket connector built on `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use super::link::{ConnectTarget, Connector, Link, TransportError};

/// Opens `url?worker_id=<id>` with `Authorization: Bearer <credential>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    fn endpoint(target: &ConnectTarget) -> Url {
        let mut url = target.url.clone();
        url.query_pairs_mut()
            .append_pair("worker_id", &target.identity.worker_id);
        url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, target: &ConnectTarget) -> Result<Box<dyn Link>, TransportError> {
        let url = Self::endpoint(target);
        let mut request = url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", target.credential.expose()))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, response) = tokio_tungstenite::connect_async(request).await?;
        debug!(
            status = %response.status(),
            worker_id = %target.identity.worker_id,
            "WebSocket handshake complete"
        );
        Ok(Box::new(WebSocketLink { stream }))
    }
}

struct WebSocketLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Link for WebSocketLink {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(e) => {
                        warn!(error = %e, "Dropping non UTF-8 binary frame");
                    }
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Server closed the connection");
                    return None;
                }
                // Pings are answered by tungstenite itself.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "Error while closing WebSocket");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::link::{Credential, WorkerIdentity};

    #[test]
    fn test_endpoint_carries_worker_id() {
        let target = ConnectTarget {
            url: Url::parse("wss://dispatch.example.com/ws?v=2").unwrap(),
            identity: WorkerIdentity::new("w 42"),
            credential: Credential::new("tok"),
        };
        let url = WebSocketConnector::endpoint(&target);
        assert_eq!(url.as_str(), "wss://dispatch.example.com/ws?v=2&worker_id=w+42");
    }
}

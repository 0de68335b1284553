//! Push channel transports.
//!
//! A [`PushTransport`] opens one authenticated channel; the returned
//! [`PushStream`] yields decoded [`PushEvent`]s until the server goes away.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use crate::error::{NotifyError, Result};
use crate::event::PushEvent;
use crate::store::install_rustls_provider;

/// An open push channel.
#[async_trait]
pub trait PushStream: Send {
    /// Next event from the server. `None` means the channel is gone.
    async fn next_event(&mut self) -> Option<Result<PushEvent>>;

    /// Close the channel. Called exactly once before the stream is dropped.
    async fn close(&mut self);
}

/// Opens push channels for a bearer token.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self, token: &str) -> Result<Box<dyn PushStream>>;
}

/// How long `close()` waits for the peer to acknowledge a close frame.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// WebSocket transport speaking JSON `{"event", "data"}` text frames.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
    close_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        install_rustls_provider();
        Self {
            url: url.into(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Bound the close handshake; a silent peer is dropped after `timeout`.
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PushTransport for WebSocketTransport {
    async fn connect(&self, token: &str) -> Result<Box<dyn PushStream>> {
        let mut request = self.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| NotifyError::connection(format!("invalid auth token: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        info!("Connecting to push channel: {}", self.url);
        let (stream, response) = connect_async(request).await?;
        debug!(status = %response.status(), "Push channel handshake complete");

        Ok(Box::new(WebSocketPushStream {
            stream,
            close_timeout: self.close_timeout,
        }))
    }
}

struct WebSocketPushStream {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    close_timeout: Duration,
}

#[async_trait]
impl PushStream for WebSocketPushStream {
    async fn next_event(&mut self) -> Option<Result<PushEvent>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(e.into())),
            };

            match message {
                Message::Text(text) => return Some(PushEvent::decode(text.as_str())),
                Message::Binary(data) => {
                    return Some(match std::str::from_utf8(&data) {
                        Ok(text) => PushEvent::decode(text),
                        Err(e) => Err(NotifyError::protocol(format!("non UTF-8 frame: {e}"))),
                    });
                }
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_string())
                        .filter(|reason| !reason.is_empty());
                    return Some(Ok(PushEvent::Disconnect { reason }));
                }
                // Pings are answered by tungstenite on the next read.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    trace!("Control frame on push channel");
                }
            }
        }
    }

    async fn close(&mut self) {
        let timeout = self.close_timeout;
        let stream = &mut self.stream;
        let handshake = async move {
            if let Err(e) = stream.close(None).await {
                warn!("Error closing push channel: {}", e);
                return;
            }
            // Drain until the peer acknowledges the close.
            while let Some(Ok(_)) = stream.next().await {}
        };
        if tokio::time::timeout(timeout, handshake).await.is_err() {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Push channel peer did not acknowledge close, dropping connection"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

    #[tokio::test]
    async fn test_websocket_transport_sends_bearer_and_decodes_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut auth_header = None;
            let mut ws = accept_hdr_async(socket, |req: &Request, resp: Response| {
                auth_header = req
                    .headers()
                    .get(AUTHORIZATION)
                    .map(|v| v.to_str().unwrap().to_string());
                Ok(resp)
            })
            .await
            .unwrap();

            ws.send(Message::text(
                r#"{"event":"new_notification","data":{"id":9,"userId":1,"title":"Hi","message":"Yo","type":"message","createdAt":"2024-05-01T12:00:00Z"}}"#,
            ))
            .await
            .unwrap();
            ws.send(Message::text(r#"{"event":"bogus"}"#)).await.unwrap();
            ws.close(None).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
            auth_header
        });

        let transport = WebSocketTransport::new(format!("ws://{addr}/notifications"));
        let mut stream = transport.connect("tok-123").await.unwrap();

        match stream.next_event().await {
            Some(Ok(PushEvent::NewNotification(n))) => assert_eq!(n.id, 9),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            stream.next_event().await,
            Some(Err(NotifyError::Protocol(_)))
        ));
        assert!(matches!(
            stream.next_event().await,
            Some(Ok(PushEvent::Disconnect { .. }))
        ));
        stream.close().await;

        let auth_header = server.await.unwrap();
        assert_eq!(auth_header.as_deref(), Some("Bearer tok-123"));
    }

    #[tokio::test]
    async fn test_connect_refused_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = WebSocketTransport::new(format!("ws://{addr}/"));
        assert!(transport.connect("t").await.is_err());
    }

    #[tokio::test]
    async fn test_close_returns_when_peer_goes_silent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Completes the handshake, then never reads or answers the close frame.
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(ws);
        });

        let transport = WebSocketTransport::new(format!("ws://{addr}/"))
            .with_close_timeout(Duration::from_millis(200));
        let mut stream = transport.connect("t").await.unwrap();

        let closed = tokio::time::timeout(Duration::from_secs(5), stream.close()).await;
        assert!(closed.is_ok(), "close hung on a silent peer");
        server.abort();
    }
}

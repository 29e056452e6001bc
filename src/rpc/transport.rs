//! Transports to a single node
//!
//! A [`Connector`] opens a [`Transport`] for one URL. The HTTP transport posts
//! each request; the WebSocket transport keeps one socket open and waits for
//! the reply frame. Both map their failures into [`RpcError`] so the retry
//! loop can decide between repeating, rotating, or giving up.

use crate::error::RpcError;
use crate::rpc::classify::classify_status;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// An open channel to one node
#[async_trait]
pub trait Transport: Send {
    /// Send a serialized JSON-RPC request and return the raw reply text
    async fn request(&mut self, body: &str) -> Result<String, RpcError>;

    /// Release the connection
    async fn close(&mut self) {}
}

/// Opens transports for node URLs
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str, timeout: Duration) -> Result<Box<dyn Transport>, RpcError>;
}

/// Picks HTTP or WebSocket by URL scheme
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnector;

#[async_trait]
impl Connector for DefaultConnector {
    async fn open(&self, url: &str, timeout: Duration) -> Result<Box<dyn Transport>, RpcError> {
        if url.starts_with("ws://") || url.starts_with("wss://") {
            Ok(Box::new(WsTransport::connect(url, timeout).await?))
        } else {
            Ok(Box::new(HttpTransport::new(url, timeout)?))
        }
    }
}

/// JSON-RPC over HTTP POST
pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    /// Build a transport for `url`; no request is made yet
    pub fn new(url: &str, timeout: Duration) -> Result<Self, RpcError> {
        let client = ClientBuilder::new()
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .timeout(timeout)
            .use_rustls_tls()
            .user_agent(concat!("hive_client/", env!("CARGO_PKG_VERSION")))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                RpcError::TransportUnreachable {
                    url: url.to_string(),
                    reason: format!("HTTP client build failed: {e}"),
                }
            })?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    fn map_error(&self, error: &reqwest::Error) -> RpcError {
        if error.is_timeout() {
            return RpcError::TransportTimeout {
                url: self.url.clone(),
            };
        }
        let reason = if error.is_connect() {
            "connection refused or unreachable"
        } else if error.is_body() || error.is_decode() {
            "response body error"
        } else if error.is_redirect() {
            "too many redirects"
        } else {
            "network error"
        };
        RpcError::TransportUnreachable {
            url: self.url.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&mut self, body: &str) -> Result<String, RpcError> {
        let response = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .body(body.to_owned())
            .send()
            .await
            .map_err(|e| self.map_error(&e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_error(&e))?;
        if status.is_success() {
            return Ok(text);
        }

        if let Some(err) = classify_status(status.as_u16()) {
            tracing::trace!(node = %self.url, status = status.as_u16(), "http request failed");
            return Err(err);
        }
        // Some nodes put JSON-RPC errors behind a non-2xx status
        if serde_json::from_str::<serde_json::Value>(&text).is_ok() {
            return Ok(text);
        }
        Err(RpcError::TransportUnreachable {
            url: self.url.clone(),
            reason: format!("HTTP {}", status.as_u16()),
        })
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// JSON-RPC over a WebSocket
pub struct WsTransport {
    stream: WsStream,
    url: String,
    timeout: Duration,
}

impl WsTransport {
    /// Open the socket, bounded by `timeout`
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, RpcError> {
        tracing::debug!(node = url, "connecting to websocket");
        let (stream, _response) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url))
            .await
            .map_err(|_| RpcError::TransportTimeout {
                url: url.to_string(),
            })?
            .map_err(|e| RpcError::TransportUnreachable {
                url: url.to_string(),
                reason: format!("WebSocket connection failed: {e}"),
            })?;
        Ok(Self {
            stream,
            url: url.to_string(),
            timeout,
        })
    }

    fn closed(&self, reason: impl Into<String>) -> RpcError {
        RpcError::TransportUnreachable {
            url: self.url.clone(),
            reason: reason.into(),
        }
    }

    async fn exchange(&mut self, body: &str) -> Result<String, RpcError> {
        self.stream
            .send(Message::Text(body.to_owned().into()))
            .await
            .map_err(|e| self.closed(format!("WebSocket send error: {e}")))?;

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => {
                    return String::from_utf8(bytes.to_vec())
                        .map_err(|_| RpcError::InvalidResponse("binary frame is not UTF-8".to_string()));
                }
                Some(Ok(Message::Close(_))) | None => return Err(self.closed("WebSocket closed")),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(self.closed(format!("WebSocket receive error: {e}"))),
            }
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn request(&mut self, body: &str) -> Result<String, RpcError> {
        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.exchange(body)).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::TransportTimeout {
                url: self.url.clone(),
            }),
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::trace!(node = %self.url, error = %e, "websocket close failed");
        }
    }
}

//! Websocket transport over tokio-tungstenite
//!
//! TLS peer verification is on by default. Disabling it is an explicit opt-out
//! meant for local test endpoints with self-signed certificates.

use std::borrow::Cow;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async_tls_with_config,
    tungstenite::{
        self,
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    Connector, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::TransportError;
use crate::traits::{CloseInfo, Frame, Transport};

pub struct WsTransport {
    verify_peer: bool,
    ws: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl WsTransport {
    pub fn new(verify_peer: bool) -> Self {
        Self {
            verify_peer,
            ws: None,
        }
    }

    pub fn verify_peer(&self) -> bool {
        self.verify_peer
    }

    /// `None` uses the default native-tls connector, which verifies the peer.
    fn tls_connector(&self) -> Result<Option<Connector>, TransportError> {
        if self.verify_peer {
            return Ok(None);
        }
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()?;
        Ok(Some(Connector::NativeTls(tls)))
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&mut self, url: &Url) -> Result<(), TransportError> {
        let connector = self.tls_connector()?;
        if !self.verify_peer && url.scheme() == "wss" {
            warn!(url = %url, "TLS certificate verification disabled");
        }

        let (ws, response) = connect_async_tls_with_config(url.as_str(), None, false, connector).await?;

        let server = response
            .headers()
            .get("server")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        info!(status = ?response.status(), server = %server, "Websocket connected");

        self.ws = Some(ws);
        Ok(())
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        let ws = self.ws.as_mut().ok_or(TransportError::ConnectionClosed)?;
        ws.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        let ws = self.ws.as_mut()?;
        loop {
            match ws.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text))),
                Ok(Message::Ping(data)) => {
                    trace!("Received WS ping, sending pong");
                    if let Err(e) = ws.send(Message::Pong(data)).await {
                        return Some(Err(e.into()));
                    }
                }
                Ok(Message::Close(frame)) => {
                    let close = frame.map(|f| CloseInfo {
                        code: u16::from(f.code),
                        reason: f.reason.into_owned(),
                    });
                    return Some(Ok(Frame::Close(close)));
                }
                Ok(other) => {
                    debug!(len = other.len(), "Ignoring non-text websocket frame");
                }
                Err(tungstenite::Error::ConnectionClosed) => return None,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        let Some(ws) = self.ws.as_mut() else {
            return Ok(());
        };
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.to_string()),
        };
        match ws.close(Some(frame)).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

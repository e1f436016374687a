use async_trait::async_trait;
use url::Url;

use crate::error::TransportError;

/// Close code and reason supplied by the peer (or by us when closing locally)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

/// Inbound frame surfaced by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close(Option<CloseInfo>),
}

/// Transport capability: connect, send, receive, close.
/// Implemented over websockets for production and by scripted fakes in tests.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Open the connection and complete the websocket handshake
    async fn open(&mut self, url: &Url) -> Result<(), TransportError>;

    /// Send one text frame
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Next inbound frame; `None` once the stream has ended.
    /// Control frames (ping/pong) are handled internally.
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Start the closing handshake with the given code
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}

/// Lifecycle and message callbacks driven by a `Session`.
///
/// All callbacks run on the session's network thread, in order, never
/// concurrently with each other.
pub trait SessionHandler: Send + 'static {
    /// Connection is open; queue any handshake messages on `outbound`.
    fn on_open(&mut self, outbound: &mut Outbound);

    /// Connection attempt or established connection failed
    fn on_fail(&mut self, diagnostic: &str);

    /// Connection closed, with the peer's close frame when one was received
    fn on_close(&mut self, close: Option<&CloseInfo>);

    /// One text payload received
    fn on_message(&mut self, payload: &str);
}

/// Messages a handler asks the session to send
#[derive(Debug, Default)]
pub struct Outbound {
    messages: Vec<String>,
}

impl Outbound {
    pub fn send(&mut self, text: impl Into<String>) {
        self.messages.push(text.into());
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub(crate) fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }
}

//! Transport session: one persistent streaming connection driven on its own
//! network thread.
//!
//! `Session::connect` validates the URI, spawns the thread and returns
//! immediately. Open/fail/close and every received payload are delivered to the
//! `SessionHandler` from that thread. `shutdown` (also run on drop) closes the
//! connection with "going away" and joins the thread, so no callback fires
//! once it returns.

use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use url::Url;

use crate::error::ConnectError;
use crate::traits::{CloseInfo, Frame, Outbound, SessionHandler, Transport};

/// RFC 6455 "going away"
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// How long a local close waits for the peer's close frame
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Closed,
    Failed,
}

impl ConnectionState {
    /// No further transitions happen from a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }

    /// Numeric encoding used by the connection_state gauge
    pub fn as_metric(self) -> i64 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Open => 2,
            ConnectionState::Closing => 3,
            ConnectionState::Closed => 4,
            ConnectionState::Failed => 5,
        }
    }
}

/// Snapshot of the session as recorded by the network thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: ConnectionState,
    /// Transport diagnostic from the last failure
    pub last_failure: Option<String>,
    /// Close code and reason from the peer
    pub close_info: Option<CloseInfo>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            last_failure: None,
            close_info: None,
        }
    }
}

pub struct Session {
    url: Url,
    status: watch::Receiver<SessionStatus>,
    shutdown_tx: watch::Sender<bool>,
    thread: Option<JoinHandle<()>>,
}

impl Session {
    /// Schedule a connection to `uri` and return without waiting for it.
    ///
    /// Fails synchronously only for a malformed URI or when the network thread
    /// or its runtime cannot be created. A refused or failed handshake is
    /// reported later through `SessionHandler::on_fail`.
    pub fn connect<T, H>(uri: &str, transport: T, handler: H) -> Result<Self, ConnectError>
    where
        T: Transport,
        H: SessionHandler,
    {
        let url = parse_uri(uri)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ConnectError::Spawn)?;

        let (status_tx, status_rx) = watch::channel(SessionStatus {
            state: ConnectionState::Connecting,
            ..SessionStatus::default()
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(url = %url, "Create connection");
        let driver = Driver {
            url: url.clone(),
            transport,
            handler,
            status: status_tx,
            shutdown: shutdown_rx,
        };
        let thread = std::thread::Builder::new()
            .name("tickerlog-net".to_string())
            .spawn(move || runtime.block_on(driver.run()))
            .map_err(ConnectError::Spawn)?;

        Ok(Self {
            url,
            status: status_rx,
            shutdown_tx,
            thread: Some(thread),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn last_failure(&self) -> Option<String> {
        self.status.borrow().last_failure.clone()
    }

    pub fn close_info(&self) -> Option<CloseInfo> {
        self.status.borrow().close_info.clone()
    }

    /// Watch handle for status changes (e.g. to wait for a terminal state)
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Close the connection if open and join the network thread.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        self.shutdown_tx.send_replace(true);
        if thread.join().is_err() {
            error!("Network thread panicked");
        }
        info!(url = %self.url, state = ?self.state(), "Session shut down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn parse_uri(uri: &str) -> Result<Url, ConnectError> {
    let url = Url::parse(uri).map_err(|e| ConnectError::InvalidUri {
        uri: uri.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConnectError::UnsupportedScheme(other.to_string())),
    }
}

/// Owns the transport and handler on the network thread
struct Driver<T, H> {
    url: Url,
    transport: T,
    handler: H,
    status: watch::Sender<SessionStatus>,
    shutdown: watch::Receiver<bool>,
}

impl<T: Transport, H: SessionHandler> Driver<T, H> {
    async fn run(mut self) {
        let opened = tokio::select! {
            result = self.transport.open(&self.url) => result,
            _ = self.shutdown.changed() => {
                info!(url = %self.url, "Shutdown requested before connection opened");
                self.closed(None);
                return;
            }
        };

        if let Err(e) = opened {
            self.fail(&e.to_string());
            return;
        }

        self.set_state(ConnectionState::Open);
        info!(url = %self.url, "Connection opened");

        let mut outbound = Outbound::default();
        self.handler.on_open(&mut outbound);
        for message in outbound.take() {
            if let Err(e) = self.transport.send(message).await {
                self.fail(&e.to_string());
                return;
            }
        }

        loop {
            tokio::select! {
                // A dropped sender means the session handle is gone: treat as shutdown too
                _ = self.shutdown.changed() => break,
                frame = self.transport.recv() => match frame {
                    Some(Ok(Frame::Text(payload))) => self.handler.on_message(&payload),
                    Some(Ok(Frame::Close(close))) => {
                        self.closed(close);
                        return;
                    }
                    Some(Err(e)) => {
                        self.fail(&e.to_string());
                        return;
                    }
                    None => {
                        self.closed(None);
                        return;
                    }
                },
            }
        }

        self.close_locally().await;
    }

    /// Send "going away" and wait (bounded) for the peer to answer.
    async fn close_locally(&mut self) {
        self.set_state(ConnectionState::Closing);
        if let Err(e) = self.transport.close(CLOSE_GOING_AWAY, "").await {
            warn!(error = %e, "Error closing connection");
        }

        let transport = &mut self.transport;
        let peer_close = tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, async {
            loop {
                match transport.recv().await {
                    Some(Ok(Frame::Close(close))) => return close,
                    // payloads arriving while closing are not delivered
                    Some(Ok(Frame::Text(_))) => continue,
                    Some(Err(_)) | None => return None,
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            warn!(
                timeout_secs = CLOSE_HANDSHAKE_TIMEOUT.as_secs(),
                "Timed out waiting for close handshake"
            );
            None
        });

        self.closed(peer_close);
    }

    fn set_state(&self, state: ConnectionState) {
        self.status.send_modify(|status| status.state = state);
    }

    fn fail(&mut self, diagnostic: &str) {
        error!(url = %self.url, error = %diagnostic, "Connection failed");
        self.status.send_modify(|status| {
            status.state = ConnectionState::Failed;
            status.last_failure = Some(diagnostic.to_string());
        });
        self.handler.on_fail(diagnostic);
    }

    fn closed(&mut self, close: Option<CloseInfo>) {
        self.status.send_modify(|status| {
            status.state = ConnectionState::Closed;
            status.close_info = close.clone();
        });
        self.handler.on_close(close.as_ref());
    }
}

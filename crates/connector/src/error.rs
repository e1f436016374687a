use std::path::PathBuf;
use thiserror::Error;

/// Synchronous failures of `connect`: nothing was scheduled.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("invalid uri {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    /// Network thread or its runtime could not be created
    #[error("failed to spawn network thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Failures reported by the transport after `connect` has returned.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("tls error: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("connection closed")]
    ConnectionClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractErrorKind {
    /// Payload does not begin with `{`
    MalformedStart,
    /// Input ended before the closing `}`
    UnexpectedEnd,
}

/// A single payload could not be converted into a row. Carries the payload for diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?} while extracting row from {payload:?}")]
pub struct ExtractError {
    pub kind: ExtractErrorKind,
    pub payload: String,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("failed to open output file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("worker already started")]
    AlreadyStarted,
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

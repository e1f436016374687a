//! End-to-end tests for the ticker pipeline.
//!
//! Most tests drive the runner over a scripted in-process transport; the
//! loopback test runs the real websocket transport against a local server.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use tickerlog_connector_lib::{
    CloseInfo, ConnectError, ConnectionState, Frame, Runner, RunnerConfig, RunnerError, Transport,
    TransportError, WsTransport, CLOSE_GOING_AWAY,
};

const TICKER: &str = r#"{"type":"ticker","price":"50000","side":"buy"}"#;
const POLL: Duration = Duration::from_millis(20);

/// Handle the test keeps to drive and inspect a `FakeTransport`
#[derive(Clone)]
struct FakeRemote {
    inbound: mpsc::UnboundedSender<Frame>,
    sent: Arc<Mutex<Vec<String>>>,
    closed_with: Arc<Mutex<Option<u16>>>,
}

impl FakeRemote {
    fn deliver(&self, payload: &str) {
        self.inbound.send(Frame::Text(payload.to_string())).unwrap();
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    fn closed_with(&self) -> Option<u16> {
        *self.closed_with.lock().unwrap()
    }
}

struct FakeTransport {
    refuse: bool,
    inbound: mpsc::UnboundedReceiver<Frame>,
    sent: Arc<Mutex<Vec<String>>>,
    closed_with: Arc<Mutex<Option<u16>>>,
}

impl FakeTransport {
    fn new() -> (Self, FakeRemote) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed_with = Arc::new(Mutex::new(None));
        let remote = FakeRemote {
            inbound: tx,
            sent: Arc::clone(&sent),
            closed_with: Arc::clone(&closed_with),
        };
        (
            Self {
                refuse: false,
                inbound: rx,
                sent,
                closed_with,
            },
            remote,
        )
    }

    fn refusing() -> (Self, FakeRemote) {
        let (mut transport, remote) = Self::new();
        transport.refuse = true;
        (transport, remote)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&mut self, _url: &Url) -> Result<(), TransportError> {
        if self.refuse {
            return Err(TransportError::Connection("connection refused".to_string()));
        }
        Ok(())
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        // Once closed locally, the peer echoes the close frame
        if let Some(code) = *self.closed_with.lock().unwrap() {
            return Some(Ok(Frame::Close(Some(CloseInfo {
                code,
                reason: String::new(),
            }))));
        }
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self, code: u16, _reason: &str) -> Result<(), TransportError> {
        *self.closed_with.lock().unwrap() = Some(code);
        Ok(())
    }
}

/// Metrics are process-global per feed label, so each test uses its own feed name
fn config(feed: &str, tmp: &TempDir, symbols: &[&str]) -> RunnerConfig {
    RunnerConfig::new(
        feed,
        "wss://ws-feed.exchange.coinbase.com",
        symbols.iter().map(ToString::to_string).collect(),
        tmp.path().join("data.csv"),
    )
    .with_poll_interval(POLL)
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(ToString::to_string)
        .collect()
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn test_ticker_message_becomes_one_csv_row() {
    let tmp = TempDir::new().unwrap();
    let cfg = config("pipeline-row", &tmp, &["BTC-USD"]);
    let output = cfg.output.clone();
    let mut runner = Runner::new(cfg);
    let (transport, remote) = FakeTransport::new();

    assert!(read_lines(&output).is_empty());

    runner.start(transport).unwrap();
    assert!(wait_until(|| !remote.sent().is_empty()));
    remote.deliver(TICKER);

    assert!(wait_until(|| read_lines(&output).len() == 1));
    runner.stop();

    assert_eq!(read_lines(&output), vec!["ticker,50000,buy"]);
    assert_eq!(runner.metrics().rows_written(), 1);
}

#[test]
fn test_subscribe_sent_on_open_with_symbols_in_order() {
    let tmp = TempDir::new().unwrap();
    let mut runner = Runner::new(config("pipeline-subscribe", &tmp, &["BTC-USD", "ETH-USD"]));
    let (transport, remote) = FakeTransport::new();

    runner.start(transport).unwrap();
    assert!(wait_until(|| !remote.sent().is_empty()));
    assert!(wait_until(|| runner.is_connected()));

    let sent = remote.sent();
    assert_eq!(sent.len(), 1);
    let value: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(value["type"], "subscribe");
    assert_eq!(value["product_ids"], serde_json::json!(["BTC-USD", "ETH-USD"]));
    assert_eq!(value["channels"], serde_json::json!(["ticker"]));

    runner.stop();
    assert!(!runner.is_connected());
}

#[test]
fn test_non_ticker_and_malformed_messages_produce_no_rows() {
    let tmp = TempDir::new().unwrap();
    let cfg = config("pipeline-filter", &tmp, &["BTC-USD"]);
    let output = cfg.output.clone();
    let mut runner = Runner::new(cfg);
    let (transport, remote) = FakeTransport::new();

    runner.start(transport).unwrap();
    remote.deliver(r#"{"type":"subscriptions","channels":[{"name":"ticker","product_ids":["BTC-USD"]}]}"#);
    remote.deliver(r#"{"type":"heartbeat","sequence":90}"#);
    remote.deliver(r#"{"type":"ticker","price":"1""#);
    remote.deliver(r#"{"type":"ticker","price":"2","side":"sell"}"#);

    assert!(wait_until(|| !read_lines(&output).is_empty()));
    runner.stop();

    assert_eq!(read_lines(&output), vec!["ticker,2,sell"]);
}

#[test]
fn test_messages_written_in_arrival_order() {
    let tmp = TempDir::new().unwrap();
    let cfg = config("pipeline-order", &tmp, &["BTC-USD"]);
    let output = cfg.output.clone();
    let mut runner = Runner::new(cfg);
    let (transport, remote) = FakeTransport::new();

    runner.start(transport).unwrap();
    for i in 0..200 {
        remote.deliver(&format!(r#"{{"type":"ticker","sequence":"{}"}}"#, i));
    }
    assert!(wait_until(|| read_lines(&output).len() == 200));
    runner.stop();

    let expected: Vec<String> = (0..200).map(|i| format!("ticker,{}", i)).collect();
    assert_eq!(read_lines(&output), expected);
}

#[test]
fn test_refused_connection_reported_after_connect_returns() {
    let tmp = TempDir::new().unwrap();
    let mut runner = Runner::new(config("pipeline-refused", &tmp, &["BTC-USD"]));
    let (transport, remote) = FakeTransport::refusing();

    // Refusal is not a synchronous error
    runner.start(transport).unwrap();

    let session = runner.session().unwrap();
    assert!(wait_until(|| session.state() == ConnectionState::Failed));
    assert!(session.last_failure().unwrap().contains("connection refused"));
    assert!(remote.sent().is_empty());
    assert!(!runner.is_connected());

    runner.stop();
}

#[test]
fn test_remote_close_recorded() {
    let tmp = TempDir::new().unwrap();
    let mut runner = Runner::new(config("pipeline-remote-close", &tmp, &["BTC-USD"]));
    let (transport, remote) = FakeTransport::new();

    runner.start(transport).unwrap();
    remote
        .inbound
        .send(Frame::Close(Some(CloseInfo {
            code: 1011,
            reason: "server restart".into(),
        })))
        .unwrap();

    let session = runner.session().unwrap();
    assert!(wait_until(|| session.state() == ConnectionState::Closed));
    let close = session.close_info().unwrap();
    assert_eq!(close.code, 1011);
    assert_eq!(close.reason, "server restart");

    runner.stop();
    assert_eq!(remote.closed_with(), None);
}

#[test]
fn test_stop_closes_going_away_and_writes_nothing_after() {
    let tmp = TempDir::new().unwrap();
    let cfg = config("pipeline-stop", &tmp, &["BTC-USD"]);
    let output = cfg.output.clone();
    let mut runner = Runner::new(cfg);
    let (transport, remote) = FakeTransport::new();

    runner.start(transport).unwrap();
    remote.deliver(TICKER);
    assert!(wait_until(|| read_lines(&output).len() == 1));

    runner.stop();
    assert_eq!(remote.closed_with(), Some(CLOSE_GOING_AWAY));
    assert!(!runner.is_processing());

    // The network thread is gone, so this delivery goes nowhere
    let _ = remote.inbound.send(Frame::Text(TICKER.to_string()));
    std::thread::sleep(POLL * 3);
    assert_eq!(read_lines(&output), vec!["ticker,50000,buy"]);
}

#[test]
fn test_invalid_uri_fails_synchronously() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = config("pipeline-invalid-uri", &tmp, &["BTC-USD"]);
    cfg.uri = "ws-feed.exchange.coinbase.com".to_string();
    let mut runner = Runner::new(cfg);
    let (transport, _remote) = FakeTransport::new();

    let err = runner.start(transport).unwrap_err();
    assert!(matches!(err, RunnerError::Connect(ConnectError::InvalidUri { .. })));
    assert!(!runner.is_processing());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_websocket_loopback() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let subscribe = match ws.next().await {
            Some(Ok(Message::Text(text))) => text,
            other => panic!("expected subscribe, got {:?}", other),
        };
        ws.send(Message::Ping(vec![1, 2, 3])).await.unwrap();
        ws.send(Message::Text(TICKER.to_string())).await.unwrap();

        let mut close_code = None;
        let mut pong_seen = false;
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Pong(_) => pong_seen = true,
                Message::Close(frame) => {
                    close_code = frame.map(|f| u16::from(f.code));
                    break;
                }
                _ => {}
            }
        }
        (subscribe, pong_seen, close_code)
    });

    let tmp = TempDir::new().unwrap();
    let mut cfg = config("pipeline-loopback", &tmp, &["BTC-USD"]);
    cfg.uri = format!("ws://{}", addr);
    let output = cfg.output.clone();

    let runner = tokio::task::spawn_blocking(move || {
        let mut runner = Runner::new(cfg);
        runner.start(WsTransport::new(true)).unwrap();
        assert!(wait_until(|| read_lines(&output).len() == 1));
        runner.stop();
        (runner, read_lines(&output))
    });

    let (runner, lines) = runner.await.unwrap();
    let (subscribe, pong_seen, close_code) = server.await.unwrap();

    assert_eq!(lines, vec!["ticker,50000,buy"]);
    let value: serde_json::Value = serde_json::from_str(&subscribe).unwrap();
    assert_eq!(value["product_ids"], serde_json::json!(["BTC-USD"]));
    assert!(pong_seen);
    assert_eq!(close_code, Some(CLOSE_GOING_AWAY));
    assert!(runner.session().is_none());
}

//! Coinbase ticker subscriber
//!
//! Session handler that sends the ticker subscription on open and delivers every
//! received payload to its observers, in registration order. Observers are
//! registered on the owned subscriber and `connect` consumes it, so the observer
//! list can never change once streaming has started.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::coinbase::messages::SubscriptionRequest;
use crate::error::ConnectError;
use crate::metrics::PipelineMetrics;
use crate::session::{ConnectionState, Session};
use crate::traits::{CloseInfo, Outbound, SessionHandler, Transport};

type Observer = Box<dyn FnMut(&str) + Send>;

pub struct TickerSubscriber {
    request: SubscriptionRequest,
    observers: Vec<Observer>,
    metrics: Option<PipelineMetrics>,
    connected: Arc<AtomicBool>,
}

impl TickerSubscriber {
    pub fn new(symbols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            request: SubscriptionRequest::ticker(symbols),
            observers: Vec::new(),
            metrics: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Record connection state transitions on the given metrics handle
    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        metrics.set_connection_state(ConnectionState::Disconnected.as_metric());
        self.metrics = Some(metrics);
        self
    }

    pub fn symbols(&self) -> &[String] {
        self.request.product_ids()
    }

    pub fn register_observer<F>(&mut self, observer: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Share an externally owned connected flag (e.g. one held by the runner)
    pub fn with_connected_flag(mut self, connected: Arc<AtomicBool>) -> Self {
        self.connected = connected;
        self
    }

    /// True while the session is open; shared with the health server
    pub fn connected_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.connected)
    }

    /// Start streaming from `uri`. Returns as soon as the connection attempt is
    /// scheduled; see `Session::connect`.
    pub fn connect<T: Transport>(self, uri: &str, transport: T) -> Result<Session, ConnectError> {
        info!(uri = %uri, symbols = ?self.symbols(), observers = self.observers.len(), "Connecting ticker subscriber");
        if let Some(ref metrics) = self.metrics {
            metrics.set_connection_state(ConnectionState::Connecting.as_metric());
        }
        Session::connect(uri, transport, self)
    }

    fn set_state(&self, state: ConnectionState) {
        self.connected
            .store(state == ConnectionState::Open, Ordering::SeqCst);
        if let Some(ref metrics) = self.metrics {
            metrics.set_connection_state(state.as_metric());
        }
    }
}

impl SessionHandler for TickerSubscriber {
    fn on_open(&mut self, outbound: &mut Outbound) {
        self.set_state(ConnectionState::Open);
        match self.request.to_json() {
            Ok(msg) => {
                info!(symbols = ?self.symbols(), "Subscribing to ticker channel");
                debug!(cmd = %msg, "Sending subscribe command");
                outbound.send(msg);
            }
            Err(e) => error!(error = %e, "Failed to encode subscribe command"),
        }
    }

    fn on_fail(&mut self, diagnostic: &str) {
        self.set_state(ConnectionState::Failed);
        error!(error = %diagnostic, "Ticker connection failed, not reconnecting");
    }

    fn on_close(&mut self, close: Option<&CloseInfo>) {
        self.set_state(ConnectionState::Closed);
        match close {
            Some(info) => warn!(code = info.code, reason = %info.reason, "Ticker connection closed"),
            None => warn!("Ticker connection closed without close frame"),
        }
    }

    fn on_message(&mut self, payload: &str) {
        for observer in self.observers.iter_mut() {
            observer(payload);
        }
    }
}

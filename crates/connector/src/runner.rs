//! Pipeline orchestration: ticker subscriber -> ingestion queue -> processor.
//!
//! Start order is processor first, then session, so no payload can arrive
//! without a consumer. Stop order is session first (joined, so nothing more is
//! pushed), then processor, which writes everything already queued.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::coinbase::TickerSubscriber;
use crate::error::RunnerError;
use crate::metrics::PipelineMetrics;
use crate::processor::{TickerProcessor, DEFAULT_POLL_INTERVAL};
use crate::session::{Session, SessionStatus};
use crate::traits::Transport;

/// Plain values the pipeline needs from its caller
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub feed_name: String,
    pub uri: String,
    pub symbols: Vec<String>,
    pub output: PathBuf,
    pub poll_interval: Duration,
}

impl RunnerConfig {
    pub fn new(
        feed_name: impl Into<String>,
        uri: impl Into<String>,
        symbols: Vec<String>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            feed_name: feed_name.into(),
            uri: uri.into(),
            symbols,
            output: output.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

pub struct Runner {
    config: RunnerConfig,
    metrics: PipelineMetrics,
    processor: TickerProcessor,
    session: Option<Session>,
    connected: Arc<AtomicBool>,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        let metrics = PipelineMetrics::new(&config.feed_name);
        let processor = TickerProcessor::new(&config.output, metrics.clone())
            .with_poll_interval(config.poll_interval);
        Self {
            config,
            metrics,
            processor,
            session: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Returns whether the session is currently open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Returns a handle to the connected status
    pub fn connected_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.connected)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Status updates from the running session, if any
    pub fn session_status(&self) -> Option<watch::Receiver<SessionStatus>> {
        self.session.as_ref().map(Session::status)
    }

    pub fn is_processing(&self) -> bool {
        self.processor.is_running()
    }

    /// Start the processor, then connect over `transport`.
    ///
    /// If connecting fails synchronously the processor is stopped again, so an
    /// error leaves nothing running.
    pub fn start<T: Transport>(&mut self, transport: T) -> Result<(), RunnerError> {
        self.processor.start()?;

        let sink = self.processor.sink();
        let mut subscriber = TickerSubscriber::new(self.config.symbols.iter().cloned())
            .with_metrics(self.metrics.clone())
            .with_connected_flag(Arc::clone(&self.connected));
        subscriber.register_observer(move |payload| sink.push(payload));

        match subscriber.connect(&self.config.uri, transport) {
            Ok(session) => {
                info!(
                    feed = %self.config.feed_name,
                    uri = %self.config.uri,
                    output = %self.config.output.display(),
                    "Pipeline started"
                );
                self.session = Some(session);
                Ok(())
            }
            Err(e) => {
                error!(feed = %self.config.feed_name, error = %e, "Failed to connect, stopping processor");
                self.processor.stop();
                Err(e.into())
            }
        }
    }

    /// Close the session, then stop the processor after it has written every
    /// queued payload. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.shutdown();
        }
        self.processor.stop();
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.stop();
    }
}

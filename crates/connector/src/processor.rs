//! Ticker processor: drains the ingestion queue on a dedicated thread and
//! appends one CSV row per ticker event to the output file.
//!
//! Runs on a dedicated std::thread so file I/O never stalls the network thread.
//! The output file is owned by that thread exclusively.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use crate::error::WorkerError;
use crate::extractor::{extract, is_ticker};
use crate::metrics::PipelineMetrics;
use crate::queue::IngestionQueue;

/// Default bound on a single queue wait before the stop flag is re-checked
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// BufWriter capacity (64KB)
const WRITE_BUFFER_SIZE: usize = 65536;

pub struct TickerProcessor {
    path: PathBuf,
    queue: IngestionQueue,
    poll_interval: Duration,
    metrics: PipelineMetrics,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TickerProcessor {
    pub fn new(path: impl Into<PathBuf>, metrics: PipelineMetrics) -> Self {
        Self {
            path: path.into(),
            queue: IngestionQueue::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            metrics,
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Producer handle for the network thread
    pub fn sink(&self) -> TickerSink {
        TickerSink {
            queue: self.queue.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// Enqueue a raw payload. Never blocks on I/O.
    pub fn push(&self, message: impl Into<String>) {
        self.sink().push(message);
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Open the output file in append mode and spawn the worker thread.
    /// Fails without spawning anything if the file cannot be opened.
    pub fn start(&mut self) -> Result<(), WorkerError> {
        if self.handle.is_some() {
            return Err(WorkerError::AlreadyStarted);
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| {
                error!(path = %self.path.display(), error = %source, "Failed to open csv file");
                WorkerError::Open {
                    path: self.path.clone(),
                    source,
                }
            })?;

        self.stop.store(false, Ordering::Release);
        let worker = Worker {
            queue: self.queue.clone(),
            writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
            poll_interval: self.poll_interval,
            metrics: self.metrics.clone(),
            stop: Arc::clone(&self.stop),
        };

        let handle = std::thread::Builder::new()
            .name("tickerlog-worker".to_string())
            .spawn(move || worker.run())
            .map_err(WorkerError::Spawn)?;
        self.handle = Some(handle);

        info!(
            path = %self.path.display(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Ticker processor started"
        );
        Ok(())
    }

    /// Signal the worker to stop and join it. Messages already queued are
    /// written before the thread exits. No file I/O happens after this returns.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.stop.store(true, Ordering::Release);
        if handle.join().is_err() {
            error!("Ticker processor thread panicked");
        }
        info!(path = %self.path.display(), "Ticker processor stopped");
    }
}

impl Drop for TickerProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Cloneable producer side of the processor queue
#[derive(Clone)]
pub struct TickerSink {
    queue: IngestionQueue,
    metrics: PipelineMetrics,
}

impl TickerSink {
    pub fn push(&self, message: impl Into<String>) {
        self.queue.push(message);
        self.metrics.inc_received();
        self.metrics.set_queue_depth(self.queue.len());
    }
}

struct Worker {
    queue: IngestionQueue,
    writer: BufWriter<File>,
    poll_interval: Duration,
    metrics: PipelineMetrics,
    stop: Arc<AtomicBool>,
}

impl Worker {
    fn run(mut self) {
        while !self.stop.load(Ordering::Acquire) {
            let Some(payload) = self.queue.pop_timeout(self.poll_interval) else {
                continue;
            };

            self.process(&payload);

            let depth = self.queue.len();
            self.metrics.set_queue_depth(depth);
            if depth == 0 {
                self.flush();
            }
        }

        // Shutdown: drain whatever is already queued
        let mut drained = 0usize;
        while let Some(payload) = self.queue.try_pop() {
            self.process(&payload);
            drained += 1;
        }
        self.metrics.set_queue_depth(0);
        self.flush();
        debug!(drained, "Ticker processor drained queue on shutdown");
    }

    fn process(&mut self, payload: &str) {
        if !is_ticker(payload) {
            trace!(raw = %payload, "Skipping non-ticker message");
            self.metrics.inc_skipped();
            return;
        }

        match extract(payload) {
            Ok(row) => match writeln!(self.writer, "{}", row) {
                Ok(()) => self.metrics.inc_written(),
                Err(e) => {
                    error!(error = %e, "Failed to append csv row");
                    self.metrics.inc_write_error();
                }
            },
            Err(e) => {
                warn!(kind = ?e.kind, raw = %e.payload, "Dropping malformed ticker message");
                self.metrics.inc_parse_error();
            }
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            error!(error = %e, "Failed to flush csv file");
            self.metrics.inc_write_error();
        }
    }
}

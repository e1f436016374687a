//! Prometheus metrics for the ticker pipeline

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_vec, register_int_gauge_vec, Encoder, IntCounterVec, IntGaugeVec,
    TextEncoder,
};

const LABEL_FEED: &str = "feed";

/// Messages delivered by the transport
static MESSAGES_RECEIVED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickerlog_messages_received_total",
        "Total messages received from the websocket",
        &[LABEL_FEED]
    )
    .expect("Failed to register messages_received metric")
});

/// Rows appended to the CSV file
static ROWS_WRITTEN: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickerlog_rows_written_total",
        "Total CSV rows appended to the output file",
        &[LABEL_FEED]
    )
    .expect("Failed to register rows_written metric")
});

/// Non-ticker messages ignored by the worker
static MESSAGES_SKIPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickerlog_messages_skipped_total",
        "Total non-ticker messages ignored",
        &[LABEL_FEED]
    )
    .expect("Failed to register messages_skipped metric")
});

static PARSE_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickerlog_parse_errors_total",
        "Total ticker messages dropped because they could not be converted",
        &[LABEL_FEED]
    )
    .expect("Failed to register parse_errors metric")
});

static WRITE_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickerlog_write_errors_total",
        "Total failed appends to the output file",
        &[LABEL_FEED]
    )
    .expect("Failed to register write_errors metric")
});

static QUEUE_DEPTH: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "tickerlog_queue_depth",
        "Messages waiting in the ingestion queue",
        &[LABEL_FEED]
    )
    .expect("Failed to register queue_depth metric")
});

/// See `ConnectionState::as_metric` for the encoding
static CONNECTION_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "tickerlog_connection_state",
        "Websocket session state (0=disconnected 1=connecting 2=open 3=closing 4=closed 5=failed)",
        &[LABEL_FEED]
    )
    .expect("Failed to register connection_state metric")
});

/// Handle for recording metrics for one feed
#[derive(Clone, Debug)]
pub struct PipelineMetrics {
    feed: String,
}

impl PipelineMetrics {
    pub fn new(feed: impl Into<String>) -> Self {
        Self { feed: feed.into() }
    }

    pub fn feed(&self) -> &str {
        &self.feed
    }

    pub fn inc_received(&self) {
        MESSAGES_RECEIVED.with_label_values(&[&self.feed]).inc();
    }

    pub fn inc_written(&self) {
        ROWS_WRITTEN.with_label_values(&[&self.feed]).inc();
    }

    pub fn inc_skipped(&self) {
        MESSAGES_SKIPPED.with_label_values(&[&self.feed]).inc();
    }

    pub fn inc_parse_error(&self) {
        PARSE_ERRORS.with_label_values(&[&self.feed]).inc();
    }

    pub fn inc_write_error(&self) {
        WRITE_ERRORS.with_label_values(&[&self.feed]).inc();
    }

    pub fn set_queue_depth(&self, depth: usize) {
        QUEUE_DEPTH
            .with_label_values(&[&self.feed])
            .set(depth as i64);
    }

    pub fn set_connection_state(&self, state: i64) {
        CONNECTION_STATE.with_label_values(&[&self.feed]).set(state);
    }

    pub fn rows_written(&self) -> u64 {
        ROWS_WRITTEN.with_label_values(&[&self.feed]).get()
    }
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
    })
}

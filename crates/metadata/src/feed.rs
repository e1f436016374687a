use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::MetadataError;

/// Coinbase Exchange public market data feed
pub const COINBASE_WS_URL: &str = "wss://ws-feed.exchange.coinbase.com";

/// Coinbase Exchange public sandbox feed
pub const COINBASE_SANDBOX_WS_URL: &str = "wss://ws-feed-public.sandbox.exchange.coinbase.com";

pub const DEFAULT_SYMBOL: &str = "BTC-USD";
pub const DEFAULT_OUTPUT: &str = "data.csv";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TlsConfig {
    /// Verify the server certificate chain and hostname.
    /// Turning this off is an explicit opt-out for test endpoints only.
    #[serde(default = "default_true")]
    pub verify_peer: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self { verify_peer: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerConfig {
    /// Upper bound on how long the worker waits for a message before
    /// re-checking its stop flag.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub sandbox_endpoint: Option<String>,
    /// Instruments to subscribe, in subscription order
    pub symbols: Vec<String>,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_output() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT)
}

impl FeedConfig {
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let content = std::fs::read_to_string(path)?;
        let feed: FeedConfig = serde_yaml::from_str(&content)?;
        Ok(feed)
    }

    /// Built-in Coinbase ticker feed used when no config file is given
    pub fn coinbase_default() -> Self {
        Self {
            name: "coinbase".to_string(),
            endpoint: COINBASE_WS_URL.to_string(),
            sandbox_endpoint: Some(COINBASE_SANDBOX_WS_URL.to_string()),
            symbols: vec![DEFAULT_SYMBOL.to_string()],
            output: default_output(),
            tls: TlsConfig::default(),
            worker: WorkerConfig::default(),
        }
    }

    /// Endpoint to connect to, honouring the sandbox switch.
    pub fn endpoint_for(&self, sandbox: bool) -> Result<&str, MetadataError> {
        if !sandbox {
            return Ok(&self.endpoint);
        }
        self.sandbox_endpoint.as_deref().ok_or_else(|| {
            MetadataError::Validation(format!("feed {} has no sandbox endpoint", self.name))
        })
    }

    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.symbols.is_empty() {
            return Err(MetadataError::Validation(
                "at least one ticker symbol is required".into(),
            ));
        }
        for symbol in &self.symbols {
            if !is_valid_symbol(symbol) {
                return Err(MetadataError::Validation(format!(
                    "invalid ticker symbol {:?}: expected ASCII letters, digits and '-'",
                    symbol
                )));
            }
        }

        validate_ws_url(&self.endpoint)?;
        if let Some(ref sandbox) = self.sandbox_endpoint {
            validate_ws_url(sandbox)?;
        }

        if self.worker.poll_interval_ms == 0 {
            return Err(MetadataError::Validation(
                "worker.poll_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Instrument identifiers are short alphanumeric strings joined by hyphens (e.g. "BTC-USD").
pub fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty() && symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn validate_ws_url(endpoint: &str) -> Result<(), MetadataError> {
    let url = Url::parse(endpoint)
        .map_err(|e| MetadataError::Validation(format!("invalid endpoint {}: {}", endpoint, e)))?;
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(MetadataError::Validation(format!(
            "endpoint {} uses unsupported scheme {}",
            endpoint, other
        ))),
    }
}

//! tickerlog-metadata: feed configuration for the ticker logger

pub mod error;
pub mod feed;

pub use error::MetadataError;
pub use feed::{
    is_valid_symbol, FeedConfig, TlsConfig, WorkerConfig, COINBASE_SANDBOX_WS_URL,
    COINBASE_WS_URL, DEFAULT_OUTPUT, DEFAULT_SYMBOL,
};

//! tickerlog-connector: Coinbase ticker pipeline components
//!
//! A websocket session streams ticker payloads into an in-memory queue; a
//! dedicated worker thread converts each one to a CSV row and appends it to the
//! output file.

pub mod coinbase;
pub mod error;
pub mod extractor;
pub mod metrics;
pub mod processor;
pub mod queue;
pub mod runner;
pub mod server;
pub mod session;
pub mod traits;
pub mod transport;

pub use coinbase::{SubscriptionRequest, TickerSubscriber};
pub use error::{ConnectError, ExtractError, ExtractErrorKind, RunnerError, TransportError, WorkerError};
pub use extractor::{extract, is_ticker, CsvRow};
pub use metrics::PipelineMetrics;
pub use processor::{TickerProcessor, TickerSink};
pub use queue::IngestionQueue;
pub use runner::{Runner, RunnerConfig};
pub use server::{create_router, run_server, ServerState};
pub use session::{ConnectionState, Session, SessionStatus, CLOSE_GOING_AWAY};
pub use traits::{CloseInfo, Frame, Outbound, SessionHandler, Transport};
pub use transport::WsTransport;

//! Coinbase exchange ticker feed
//!
//! Subscribes to the public `ticker` channel and fans raw payloads out to
//! registered observers.

pub mod messages;
pub mod subscriber;

pub use messages::{SubscriptionRequest, TICKER_CHANNEL};
pub use subscriber::TickerSubscriber;

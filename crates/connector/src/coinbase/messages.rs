//! Coinbase websocket control messages

use serde::Serialize;

pub const TICKER_CHANNEL: &str = "ticker";

/// Subscribe command sent once per connection, right after open.
///
/// Serialises as `{"type":"subscribe","product_ids":[...],"channels":["ticker"]}`
/// with product ids in configured order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "type")]
    kind: &'static str,
    product_ids: Vec<String>,
    channels: Vec<&'static str>,
}

impl SubscriptionRequest {
    pub fn ticker(symbols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            kind: "subscribe",
            product_ids: symbols.into_iter().map(Into::into).collect(),
            channels: vec![TICKER_CHANNEL],
        }
    }

    pub fn product_ids(&self) -> &[String] {
        &self.product_ids
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

//! Flat JSON object -> CSV row
//!
//! Single pass over the payload characters. Keys are dropped, values are
//! copied through with their own `,` separators, so column order follows
//! the field order of the source object. Only flat objects (scalar values, no
//! nesting) are supported; a value containing an unescaped `,` or `}` is split
//! or truncated at that character.

use std::fmt;

use crate::error::{ExtractError, ExtractErrorKind};

/// Substring that marks a ticker event. Checked before extraction.
pub const TICKER_MARKER: &str = r#""type":"ticker""#;

/// One CSV line (without the trailing newline)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow(String);

impl CsvRow {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CsvRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cheap pre-filter: only ticker events are handed to `extract`.
#[inline]
pub fn is_ticker(payload: &str) -> bool {
    payload.contains(TICKER_MARKER)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitStart,
    WaitSeparator,
    CollectingValue,
    Done,
}

/// Convert one flat JSON object into a CSV row.
///
/// `{"type":"ticker","price":"100.5","volume":"3"}` becomes `ticker,100.5,3`.
/// String quotes are stripped; every other value character (including `:`) is
/// copied verbatim. Trailing input after the closing brace is ignored.
pub fn extract(payload: &str) -> Result<CsvRow, ExtractError> {
    let mut row = String::with_capacity(payload.len());
    let mut state = State::WaitStart;

    for c in payload.chars() {
        state = match (state, c) {
            (State::WaitStart, '{') => State::WaitSeparator,
            (State::WaitStart, _) => return Err(error(ExtractErrorKind::MalformedStart, payload)),

            (State::WaitSeparator, ':') => State::CollectingValue,
            (State::WaitSeparator, '}') => State::Done,
            // key characters
            (State::WaitSeparator, _) => State::WaitSeparator,

            (State::CollectingValue, ',') => {
                row.push(',');
                State::WaitSeparator
            }
            (State::CollectingValue, '}') => State::Done,
            (State::CollectingValue, '"') => State::CollectingValue,
            (State::CollectingValue, c) => {
                row.push(c);
                State::CollectingValue
            }

            (State::Done, _) => break,
        };
    }

    match state {
        State::Done => Ok(CsvRow(row)),
        State::WaitStart => Err(error(ExtractErrorKind::MalformedStart, payload)),
        State::WaitSeparator | State::CollectingValue => {
            Err(error(ExtractErrorKind::UnexpectedEnd, payload))
        }
    }
}

fn error(kind: ExtractErrorKind, payload: &str) -> ExtractError {
    ExtractError {
        kind,
        payload: payload.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COINBASE_TICKER: &str = r#"{"type":"ticker","sequence":37475248783,"product_id":"BTC-USD","price":"26543.21","open_24h":"26001.00","volume_24h":"12345.678","side":"buy","time":"2023-09-01T12:34:56.789012Z","trade_id":548934,"last_size":"0.0015"}"#;

    #[test]
    fn test_extract_drops_keys() {
        let row = extract(r#"{"type":"ticker","price":"100.5","volume":"3"}"#).unwrap();
        assert_eq!(row.as_str(), "ticker,100.5,3");
    }

    #[test]
    fn test_extract_preserves_field_order_and_count() {
        let row = extract(COINBASE_TICKER).unwrap();
        let fields: Vec<&str> = row.as_str().split(',').collect();
        assert_eq!(fields.len(), 10);
        assert_eq!(fields[0], "ticker");
        assert_eq!(fields[1], "37475248783");
        assert_eq!(fields[2], "BTC-USD");
        assert_eq!(fields[6], "buy");
        // colons inside a value are copied literally
        assert_eq!(fields[7], "2023-09-01T12:34:56.789012Z");
        assert_eq!(fields[9], "0.0015");
    }

    #[test]
    fn test_extract_numbers_unquoted() {
        let row = extract(r#"{"a":1,"b":2.5,"c":-3}"#).unwrap();
        assert_eq!(row.as_str(), "1,2.5,-3");
    }

    #[test]
    fn test_extract_empty_object() {
        let row = extract("{}").unwrap();
        assert_eq!(row.as_str(), "");
    }

    #[test]
    fn test_extract_ignores_trailing_input() {
        let row = extract("{\"price\":\"50000\",\"side\":\"buy\"}\n").unwrap();
        assert_eq!(row.as_str(), "50000,buy");
    }

    #[test]
    fn test_extract_malformed_start() {
        let err = extract("not json").unwrap_err();
        assert_eq!(err.kind, ExtractErrorKind::MalformedStart);
        assert_eq!(err.payload, "not json");
    }

    #[test]
    fn test_extract_empty_payload() {
        let err = extract("").unwrap_err();
        assert_eq!(err.kind, ExtractErrorKind::MalformedStart);
    }

    #[test]
    fn test_extract_unexpected_end() {
        let err = extract(r#"{"a":"1""#).unwrap_err();
        assert_eq!(err.kind, ExtractErrorKind::UnexpectedEnd);
        assert_eq!(err.payload, r#"{"a":"1""#);
    }

    #[test]
    fn test_extract_unexpected_end_in_key() {
        let err = extract(r#"{"a":"1","b"#).unwrap_err();
        assert_eq!(err.kind, ExtractErrorKind::UnexpectedEnd);
    }

    #[test]
    fn test_is_ticker() {
        assert!(is_ticker(r#"{"type":"ticker","price":"1"}"#));
        assert!(!is_ticker(r#"{"type":"heartbeat"}"#));
        assert!(!is_ticker(r#"{"type":"subscriptions","channels":[{"name":"ticker"}]}"#));
    }

    #[test]
    fn test_error_display_contains_payload() {
        let err = extract("oops").unwrap_err();
        assert!(err.to_string().contains("MalformedStart"));
        assert!(err.to_string().contains("oops"));
    }
}

//! OKX market candles client
//!
//! Fetches candlestick history from the OKX public REST API and converts it
//! into a [`Table`] with one row per candle.

use std::time::Duration;

use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::{f64_to_cell, Table};

/// Default base URL for the OKX API
pub const OKX_BASE_URL: &str = "https://www.okx.com";

/// Browser-like user agent; some edges reject unknown clients
const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10) AppleWebKit/537.36 Chrome/139";

/// Column names of a candle table, in the order OKX returns the fields
pub const CANDLE_COLUMNS: [&str; 9] = [
    "time",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "turnover",
    "turnover_usdt",
    "confirmed",
];

/// Errors that can occur when fetching candles
#[derive(Debug, Error)]
pub enum OkxError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// The API answered with a non-zero code
    #[error("OKX API error {code}: {msg}")]
    Api { code: String, msg: String },
}

/// OKX candles response envelope
#[derive(Debug, Deserialize)]
struct CandlesResponse {
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

/// Client for the OKX public market endpoints
#[derive(Debug, Clone)]
pub struct OkxClient {
    client: Client,
    base_url: String,
}

impl Default for OkxClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OkxClient {
    /// Create a new OkxClient against the public API
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: OKX_BASE_URL.to_string(),
        }
    }

    /// Create a client with a request timeout and a custom base URL
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, OkxError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch up to `limit` candles for `inst_id` at granularity `bar`
    ///
    /// # Arguments
    /// * `inst_id` - Instrument, e.g. `BTC-USDT`
    /// * `bar` - Granularity, e.g. `1m`, `1H`, `1D`
    /// * `limit` - Number of candles requested; OKX caps this at 300
    ///
    /// # Returns
    /// * `Ok(Table)` - Candles newest first, as OKX returns them
    /// * `Err(OkxError)` - If the request, the parsing or the API call fails
    pub async fn fetch_candles(
        &self,
        inst_id: &str,
        bar: &str,
        limit: usize,
    ) -> Result<Table, OkxError> {
        let url = format!("{}/api/v5/market/candles", self.base_url.trim_end_matches('/'));
        let limit = limit.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[("instId", inst_id), ("bar", bar), ("limit", limit.as_str())])
            .send()
            .await?;
        let text = response.text().await?;

        parse_candles(&text)
    }
}

/// Parse an OKX candles response body into a table
pub fn parse_candles(body: &str) -> Result<Table, OkxError> {
    let response: CandlesResponse = serde_json::from_str(body)?;
    if !response.code.is_empty() && response.code != "0" {
        return Err(OkxError::Api {
            code: response.code,
            msg: response.msg,
        });
    }

    let mut table = Table::new(CANDLE_COLUMNS.iter().map(|c| c.to_string()).collect());
    for fields in &response.data {
        let row = CANDLE_COLUMNS
            .iter()
            .enumerate()
            .map(|(i, column)| match (*column, fields.get(i)) {
                (_, None) => Value::Null,
                ("time", Some(ts)) => format_timestamp(ts),
                ("confirmed", Some(flag)) => flag.clone(),
                (_, Some(number)) => parse_number(number),
            })
            .collect();
        table.push_row(row);
    }
    Ok(table)
}

/// Normalize a bar size: minute bars stay lowercase, everything else is uppercased
pub fn normalize_bar(bar: &str) -> String {
    if bar.ends_with('m') {
        bar.to_string()
    } else {
        bar.to_uppercase()
    }
}

/// Convert a millisecond timestamp into `YYYY-MM-DD HH:MM:SS` (UTC)
fn format_timestamp(value: &Value) -> Value {
    let millis = match value {
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    };
    millis
        .and_then(DateTime::from_timestamp_millis)
        .map_or(Value::Null, |dt| {
            Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string())
        })
}

fn parse_number(value: &Value) -> Value {
    match value {
        Value::String(s) => s.trim().parse::<f64>().map_or(Value::Null, f64_to_cell),
        Value::Number(n) => n.as_f64().map_or(Value::Null, f64_to_cell),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Sample OKX candles response, newest first
    const VALID_RESPONSE: &str = r#"{
        "code": "0",
        "msg": "",
        "data": [
            ["1721055600000", "64010.5", "64200.1", "63900", "64150.2", "120.5", "7712345.6", "7712345.6", "0"],
            ["1721052000000", "63800", "64050", "63750.5", "64010.5", "98.25", "6280000", "6280000", "1"]
        ]
    }"#;

    #[test]
    fn test_parse_valid_response() {
        let table = parse_candles(VALID_RESPONSE).expect("Should parse valid response");

        assert_eq!(table.columns(), &CANDLE_COLUMNS);
        assert_eq!(table.len(), 2);

        let first = &table.rows()[0];
        assert_eq!(first[0], json!("2024-07-15 15:00:00"));
        assert_eq!(first[1], json!(64010.5));
        assert_eq!(first[3], json!(63900.0));
        assert_eq!(first[8], json!("0"));
    }

    #[test]
    fn test_parse_api_error() {
        let body = r#"{"code": "51001", "msg": "Instrument ID does not exist", "data": []}"#;

        match parse_candles(body) {
            Err(OkxError::Api { code, msg }) => {
                assert_eq!(code, "51001");
                assert!(msg.contains("Instrument"));
            }
            other => panic!("Expected API error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_invalid_json() {
        let result = parse_candles("not json");
        assert!(matches!(result, Err(OkxError::ParseError(_))));
    }

    #[test]
    fn test_parse_empty_data() {
        let table = parse_candles(r#"{"code":"0","msg":"","data":[]}"#).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns().len(), CANDLE_COLUMNS.len());
    }

    #[test]
    fn test_parse_short_and_malformed_rows() {
        let body = r#"{"code":"0","data":[["bad-ts", "1.5", "oops"]]}"#;
        let table = parse_candles(body).unwrap();

        let row = &table.rows()[0];
        assert_eq!(row[0], Value::Null);
        assert_eq!(row[1], json!(1.5));
        assert_eq!(row[2], Value::Null);
        assert_eq!(row[4], Value::Null);
    }

    #[test]
    fn test_normalize_bar() {
        assert_eq!(normalize_bar("1m"), "1m");
        assert_eq!(normalize_bar("15m"), "15m");
        assert_eq!(normalize_bar("1h"), "1H");
        assert_eq!(normalize_bar("1d"), "1D");
        assert_eq!(normalize_bar("1W"), "1W");
    }

    #[test]
    fn test_default_implementation() {
        let client = OkxClient::default();
        assert_eq!(client.base_url(), OKX_BASE_URL);
    }

    #[test]
    fn test_with_timeout_keeps_base_url() {
        let client = OkxClient::with_timeout("http://localhost:9", Duration::from_secs(1))
            .expect("Client should build");
        assert_eq!(client.base_url(), "http://localhost:9");
    }

    #[tokio::test]
    async fn test_fetch_from_unreachable_host_fails() {
        let client = OkxClient::with_timeout("http://127.0.0.1:9", Duration::from_millis(500))
            .expect("Client should build");
        let result = client.fetch_candles("BTC-USDT", "1H", 10).await;
        assert!(matches!(result, Err(OkxError::RequestFailed(_))));
    }
}

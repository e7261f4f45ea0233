//! Price-history operations
//!
//! Fetches candles through the cache, computes indicators over the full
//! padded history and returns the most recent `limit` rows as CSV.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::{CacheManager, CachePolicy, Request};
use crate::data::{normalize_bar, OkxClient, Table};
use crate::indicators::add_indicators;

/// Extra rows fetched ahead of the requested window so indicators can warm up
pub const WARMUP_ROWS: usize = 62;

/// Smallest number of candles fetched per request
pub const MIN_FETCH: usize = 300;

/// How long fetched candles stay fresh in memory
pub const PRICE_CACHE_TTL: Duration = Duration::from_secs(300);

/// Columns of a price-history result, in output order
pub const PRICE_COLUMNS: [&str; 17] = [
    "time", "open", "close", "high", "low", "volume", "turnover", "MACD", "DIF", "DEA",
    "KDJ.K", "KDJ.D", "KDJ.J", "RSI", "BOLL.U", "BOLL.M", "BOLL.L",
];

/// Number of rows to fetch for a result of `limit` rows
pub fn fetch_size(limit: usize) -> usize {
    MIN_FETCH.max(limit.saturating_add(WARMUP_ROWS))
}

/// Fingerprint of a candle fetch; `fetch_limit` is the padded size
pub fn candles_request(inst_id: &str, bar: &str, fetch_limit: usize) -> Request {
    Request::new("okx_candles")
        .kwarg("instId", inst_id)
        .kwarg("bar", bar)
        .kwarg("limit", fetch_limit)
}

/// Adds indicators to `table` and renders the last `limit` rows as CSV
///
/// Indicators are computed over every row before trimming, so the warm-up
/// rows shape the values of the returned ones.
///
/// # Arguments
/// * `table` - Rows in ascending time order
/// * `close_col`, `low_col`, `high_col` - Source columns for the indicators
/// * `columns` - Output columns, in order
/// * `limit` - Number of data rows to keep
///
/// # Returns
/// * `Some(String)` - Header line followed by at most `limit` rows
/// * `None` - If the table is empty, has no close column or cannot be rendered
pub fn enrich_and_trim(
    mut table: Table,
    close_col: &str,
    low_col: &str,
    high_col: &str,
    columns: &[&str],
    limit: usize,
) -> Option<String> {
    if table.is_empty() {
        return None;
    }
    let close = table.column_f64(close_col)?;
    let low = table.column_f64(low_col).unwrap_or_default();
    let high = table.column_f64(high_col).unwrap_or_default();

    add_indicators(&mut table, &close, &low, &high);
    match table.select(columns).tail(limit).to_csv() {
        Ok(csv) => Some(csv),
        Err(e) => {
            warn!(error = %e, "failed to render price table");
            None
        }
    }
}

/// Price operations backed by a shared cache
#[derive(Debug, Clone)]
pub struct PriceService {
    cache: Arc<CacheManager>,
    okx: OkxClient,
}

impl PriceService {
    pub fn new(cache: Arc<CacheManager>, okx: OkxClient) -> Self {
        Self { cache, okx }
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Candle history for an OKX instrument with indicator columns
    ///
    /// # Arguments
    /// * `inst_id` - Instrument, e.g. `BTC-USDT`
    /// * `bar` - Granularity; anything but minute bars is upper-cased
    /// * `limit` - Number of rows to return
    ///
    /// # Returns
    /// CSV text, or `Not Found for {inst_id}` when no candles are available
    pub async fn okx_prices(&self, inst_id: &str, bar: &str, limit: usize) -> String {
        let bar = normalize_bar(bar);
        let fetch_limit = fetch_size(limit);
        let request = candles_request(inst_id, &bar, fetch_limit);

        let table: Option<Table> = self
            .cache
            .cached_call(&request, CachePolicy::with_ttl(PRICE_CACHE_TTL), || {
                self.okx.fetch_candles(inst_id, &bar, fetch_limit)
            })
            .await;

        let Some(mut table) = table else {
            return not_found(inst_id);
        };
        debug!(inst_id, bar = %bar, rows = table.len(), "candles loaded");

        table.sort_by_column("time");
        enrich_and_trim(table, "close", "low", "high", &PRICE_COLUMNS, limit)
            .unwrap_or_else(|| not_found(inst_id))
    }
}

fn not_found(inst_id: &str) -> String {
    format!("Not Found for {}", inst_id)
}

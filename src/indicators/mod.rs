//! Technical indicators appended to price tables
//!
//! Computes MACD (DIF, DEA, MACD), KDJ (K, D, J), RSI and Bollinger bands
//! (M, U, L) from aligned close, low and high series. The engine is a pure
//! function: no I/O and no shared state. Degenerate inputs (short series,
//! zero ranges, zero losses) produce `NaN` rather than errors.

pub mod series;

use crate::data::Table;
use series::{
    alpha_from_com, alpha_from_span, diff, ewm, rolling_max, rolling_mean, rolling_min,
    rolling_std,
};

pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const KDJ_WINDOW: usize = 9;
/// Center of mass of the K and D smoothing
pub const KDJ_COM: f64 = 2.0;
pub const RSI_WINDOW: usize = 14;
pub const BOLL_WINDOW: usize = 20;
pub const BOLL_WIDTH: f64 = 2.0;

/// Names of the columns [`add_indicators`] writes, in output order
pub const INDICATOR_COLUMNS: [&str; 10] = [
    "DIF", "DEA", "MACD", "KDJ.K", "KDJ.D", "KDJ.J", "RSI", "BOLL.M", "BOLL.U", "BOLL.L",
];

/// Indicator series, each the same length as the input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Indicators {
    pub dif: Vec<f64>,
    pub dea: Vec<f64>,
    pub macd: Vec<f64>,
    pub kdj_k: Vec<f64>,
    pub kdj_d: Vec<f64>,
    pub kdj_j: Vec<f64>,
    pub rsi: Vec<f64>,
    pub boll_m: Vec<f64>,
    pub boll_u: Vec<f64>,
    pub boll_l: Vec<f64>,
}

impl Indicators {
    /// Pairs each column name with its series
    pub fn columns(&self) -> [(&'static str, &[f64]); 10] {
        [
            ("DIF", &self.dif),
            ("DEA", &self.dea),
            ("MACD", &self.macd),
            ("KDJ.K", &self.kdj_k),
            ("KDJ.D", &self.kdj_d),
            ("KDJ.J", &self.kdj_j),
            ("RSI", &self.rsi),
            ("BOLL.M", &self.boll_m),
            ("BOLL.U", &self.boll_u),
            ("BOLL.L", &self.boll_l),
        ]
    }
}

/// Computes every indicator over `close`, `low` and `high`
///
/// The output length follows `close`. A shorter `low` or `high` is treated as
/// undefined for the missing rows.
pub fn compute(close: &[f64], low: &[f64], high: &[f64]) -> Indicators {
    let n = close.len();
    let aligned = |s: &[f64]| -> Vec<f64> {
        (0..n).map(|i| s.get(i).copied().unwrap_or(f64::NAN)).collect()
    };
    let low = aligned(low);
    let high = aligned(high);

    let (dif, dea, macd) = macd(close);
    let (kdj_k, kdj_d, kdj_j) = kdj(close, &low, &high);
    let rsi = rsi(close);
    let (boll_m, boll_u, boll_l) = bollinger(close);

    Indicators {
        dif,
        dea,
        macd,
        kdj_k,
        kdj_d,
        kdj_j,
        rsi,
        boll_m,
        boll_u,
        boll_l,
    }
}

/// Appends the indicator columns to `table`, overwriting same-named columns
///
/// Row order and count of `table` are preserved.
pub fn add_indicators(table: &mut Table, close: &[f64], low: &[f64], high: &[f64]) {
    let indicators = compute(close, low, high);
    for (name, values) in indicators.columns() {
        table.set_column_f64(name, values);
    }
}

fn macd(close: &[f64]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let fast = ewm(close, alpha_from_span(MACD_FAST as f64));
    let slow = ewm(close, alpha_from_span(MACD_SLOW as f64));
    let dif: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let dea = ewm(&dif, alpha_from_span(MACD_SIGNAL as f64));
    let macd = dif.iter().zip(&dea).map(|(d, e)| 2.0 * (d - e)).collect();
    (dif, dea, macd)
}

fn kdj(close: &[f64], low: &[f64], high: &[f64]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let low_min = rolling_min(low, KDJ_WINDOW);
    let high_max = rolling_max(high, KDJ_WINDOW);
    let rsv: Vec<f64> = close
        .iter()
        .zip(low_min.iter().zip(&high_max))
        .map(|(c, (lo, hi))| {
            let range = hi - lo;
            if range == 0.0 || range.is_nan() {
                f64::NAN
            } else {
                (c - lo) / range * 100.0
            }
        })
        .collect();

    let alpha = alpha_from_com(KDJ_COM);
    let k = ewm(&rsv, alpha);
    let d = ewm(&k, alpha);
    let j = k.iter().zip(&d).map(|(k, d)| 3.0 * k - 2.0 * d).collect();
    (k, d, j)
}

/// RSI from simple rolling means of gains and losses
///
/// With no losses in the window the ratio is infinite and RSI is 100; with
/// neither gains nor losses it is undefined.
fn rsi(close: &[f64]) -> Vec<f64> {
    let delta = diff(close);
    let gain: Vec<f64> = delta.iter().map(|&d| if d > 0.0 { d } else { 0.0 }).collect();
    let loss: Vec<f64> = delta.iter().map(|&d| if d < 0.0 { -d } else { 0.0 }).collect();
    let avg_gain = rolling_mean(&gain, RSI_WINDOW);
    let avg_loss = rolling_mean(&loss, RSI_WINDOW);

    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(g, l)| 100.0 - 100.0 / (1.0 + g / l))
        .collect()
}

fn bollinger(close: &[f64]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mid = rolling_mean(close, BOLL_WINDOW);
    let std = rolling_std(close, BOLL_WINDOW);
    let upper = mid.iter().zip(&std).map(|(m, s)| m + BOLL_WIDTH * s).collect();
    let lower = mid.iter().zip(&std).map(|(m, s)| m - BOLL_WIDTH * s).collect();
    (mid, upper, lower)
}

//! Tabular data returned by upstream providers
//!
//! `Table` is the common currency between providers, the cache and the
//! indicator engine. It serializes as plain JSON so any table can be cached,
//! and renders to CSV the way operations return data to their callers.

pub mod okx;

pub use okx::{normalize_bar, OkxClient, OkxError};

use std::cmp::Ordering;

use csv::{Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

/// Errors raised while decoding or rendering a table
#[derive(Debug, Error)]
pub enum TableError {
    /// A decoded row does not have one cell per column
    #[error("Row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },

    /// CSV rendering failed
    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Column-named rows of JSON cells
///
/// Every row has exactly one cell per column; decoding rejects tables that
/// break this. Undefined numbers (NaN or infinite) are stored as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Wire form of a [`Table`] before row widths are checked
#[derive(Deserialize)]
struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl TryFrom<RawTable> for Table {
    type Error = TableError;

    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        let expected = raw.columns.len();
        if let Some((row, cells)) = raw.rows.iter().enumerate().find(|(_, r)| r.len() != expected) {
            return Err(TableError::RaggedRow {
                row,
                found: cells.len(),
                expected,
            });
        }
        Ok(Table {
            columns: raw.columns,
            rows: raw.rows,
        })
    }
}

impl Table {
    /// Creates an empty table with the given column names
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends a row, padding with `null` or truncating to the column count
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Returns a column as numbers
    ///
    /// Numeric strings are parsed; anything else becomes `NaN`. Returns `None`
    /// if the column does not exist.
    pub fn column_f64(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| cell_to_f64(&row[idx])).collect())
    }

    /// Adds a numeric column, or overwrites it if the name already exists
    ///
    /// Values beyond the row count are ignored; missing values become `null`.
    pub fn set_column_f64(&mut self, name: &str, values: &[f64]) {
        let idx = match self.column_index(name) {
            Some(idx) => idx,
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(Value::Null);
                }
                self.columns.len() - 1
            }
        };

        for (i, row) in self.rows.iter_mut().enumerate() {
            row[idx] = values.get(i).copied().map(f64_to_cell).unwrap_or(Value::Null);
        }
    }

    /// Sorts rows ascending by `name`; a no-op for unknown columns
    ///
    /// The sort is stable and `null` cells go last.
    pub fn sort_by_column(&mut self, name: &str) {
        if let Some(idx) = self.column_index(name) {
            self.rows.sort_by(|a, b| compare_cells(&a[idx], &b[idx]));
        }
    }

    /// Returns a table with only the named columns, in the given order
    ///
    /// Unknown names produce a column of `null`.
    pub fn select(&self, names: &[&str]) -> Table {
        let indices: Vec<Option<usize>> = names.iter().map(|n| self.column_index(n)).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|idx| idx.map_or(Value::Null, |i| row[i].clone()))
                    .collect()
            })
            .collect();

        Table {
            columns: names.iter().map(|n| n.to_string()).collect(),
            rows,
        }
    }

    /// Returns the last `n` rows
    pub fn tail(&self, n: usize) -> Table {
        let start = self.rows.len().saturating_sub(n);
        Table {
            columns: self.columns.clone(),
            rows: self.rows[start..].to_vec(),
        }
    }

    /// Renders the table as CSV with a header line
    ///
    /// Floats are printed with two decimals, integers as-is and `null` as an
    /// empty field. There is no trailing newline.
    pub fn to_csv(&self) -> Result<String, TableError> {
        let mut writer = WriterBuilder::new()
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(format_cell))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;

        let mut text = String::from_utf8_lossy(&bytes).into_owned();
        if text.ends_with('\n') {
            text.pop();
        }
        Ok(text)
    }
}

/// Converts a number to a cell, mapping non-finite values to `null`
pub fn f64_to_cell(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn cell_to_f64(cell: &Value) -> f64 {
    match cell {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn compare_cells(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Text of a single CSV field, before quoting
fn format_cell(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) if n.is_f64() => format!("{:.2}", n.as_f64().unwrap_or(f64::NAN)),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_table() -> Table {
        let mut table = Table::new(vec!["time".into(), "close".into(), "volume".into()]);
        table.push_row(vec![json!("2024-07-16"), json!(10.5), json!(300)]);
        table.push_row(vec![json!("2024-07-15"), json!("10.1"), json!(200)]);
        table.push_row(vec![json!("2024-07-17"), json!(null), json!(100)]);
        table
    }

    #[test]
    fn test_push_row_pads_and_truncates() {
        let mut table = Table::new(vec!["a".into(), "b".into()]);
        table.push_row(vec![json!(1)]);
        table.push_row(vec![json!(1), json!(2), json!(3)]);

        assert_eq!(table.rows()[0], vec![json!(1), Value::Null]);
        assert_eq!(table.rows()[1], vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_column_f64_coerces_cells() {
        let table = sample_table();
        let close = table.column_f64("close").unwrap();

        assert!((close[0] - 10.5).abs() < 1e-12);
        assert!((close[1] - 10.1).abs() < 1e-12);
        assert!(close[2].is_nan());
        assert!(table.column_f64("missing").is_none());
    }

    #[test]
    fn test_set_column_adds_and_overwrites() {
        let mut table = sample_table();
        table.set_column_f64("RSI", &[1.0, f64::NAN]);

        assert_eq!(table.columns().last().map(String::as_str), Some("RSI"));
        let idx = table.column_index("RSI").unwrap();
        assert_eq!(table.rows()[0][idx], json!(1.0));
        assert_eq!(table.rows()[1][idx], Value::Null);
        assert_eq!(table.rows()[2][idx], Value::Null);

        table.set_column_f64("RSI", &[5.0, 6.0, 7.0]);
        assert_eq!(table.columns().len(), 4);
        assert_eq!(table.rows()[2][idx], json!(7.0));
    }

    #[test]
    fn test_sort_by_column() {
        let mut table = sample_table();
        table.sort_by_column("time");

        let times: Vec<&Value> = table.rows().iter().map(|r| &r[0]).collect();
        assert_eq!(times, vec![&json!("2024-07-15"), &json!("2024-07-16"), &json!("2024-07-17")]);

        table.sort_by_column("close");
        assert_eq!(table.rows()[2][1], Value::Null, "null sorts last");
    }

    #[test]
    fn test_select_and_tail() {
        let table = sample_table();
        let selected = table.select(&["volume", "time", "nope"]);

        assert_eq!(selected.columns(), &["volume", "time", "nope"]);
        assert_eq!(selected.rows()[0], vec![json!(300), json!("2024-07-16"), Value::Null]);

        let tail = table.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.rows()[0][0], json!("2024-07-15"));
        assert_eq!(table.tail(10).len(), 3);
    }

    #[test]
    fn test_to_csv_formats_cells() {
        let table = sample_table();
        let csv = table.to_csv().unwrap();

        assert_eq!(
            csv,
            "time,close,volume\n2024-07-16,10.50,300\n2024-07-15,10.1,200\n2024-07-17,,100"
        );
    }

    #[test]
    fn test_to_csv_escapes_fields() {
        let mut table = Table::new(vec!["name".into()]);
        table.push_row(vec![json!("a,b")]);
        table.push_row(vec![json!("say \"hi\"")]);

        assert_eq!(table.to_csv().unwrap(), "name\n\"a,b\"\n\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_table_json_round_trip() {
        let table = sample_table();
        let json = serde_json::to_string(&table).unwrap();
        let back: Table = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_to_csv_empty_table_is_header_only() {
        let table = Table::new(vec!["time".into(), "close".into()]);
        assert_eq!(table.to_csv().unwrap(), "time,close");
    }

    #[test]
    fn test_ragged_rows_are_rejected_on_decode() {
        let body = r#"{"columns":["time","open","high","low","close"],
                       "rows":[["2024-01-01 00:00:00",1.0]]}"#;

        match serde_json::from_str::<Table>(body) {
            Err(e) => assert!(e.to_string().contains("Row 0 has 2 cells, expected 5")),
            Ok(table) => panic!("Expected a decode error, got {:?}", table),
        }
    }

    #[test]
    fn test_empty_rows_decode() {
        let table: Table = serde_json::from_str(r#"{"columns":["a"],"rows":[]}"#).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns(), &["a"]);
    }
}

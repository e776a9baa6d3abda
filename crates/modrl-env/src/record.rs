//! Per-step info records and their CSV persistence.

use std::fs;
use std::path::PathBuf;

use serde::ser::{Serialize, Serializer};

use crate::error::Result;

/// A single logged value.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum LogValue {
    /// Flag.
    Bool(bool),
    /// Counter.
    Int(i64),
    /// Measurement.
    Float(f64),
    /// Vector measurement.
    Array(Vec<f64>),
}

impl From<bool> for LogValue {
    fn from(v: bool) -> Self {
        LogValue::Bool(v)
    }
}

impl From<u64> for LogValue {
    fn from(v: u64) -> Self {
        LogValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for LogValue {
    fn from(v: f64) -> Self {
        LogValue::Float(v)
    }
}

impl From<Vec<f64>> for LogValue {
    fn from(v: Vec<f64>) -> Self {
        LogValue::Array(v)
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Decimal form that keeps a fractional part on whole numbers (`1.0`).
fn decimal(v: f64) -> String {
    let s = v.to_string();
    if v.is_finite() && !s.contains('.') {
        format!("{s}.0")
    } else {
        s
    }
}

/// Two-digit signed exponent (`1.23e-05`).
fn scientific(v: f64) -> String {
    let s = format!("{v:.2e}");
    let Some((mantissa, exp)) = s.split_once('e') else {
        return s;
    };
    let (sign, digits) = match exp.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exp),
    };
    format!("{mantissa}e{sign}{digits:0>2}")
}

impl LogValue {
    fn csv_cell(&self) -> String {
        match self {
            LogValue::Bool(v) => v.to_string(),
            LogValue::Int(v) => v.to_string(),
            LogValue::Float(v) => v.to_string(),
            LogValue::Array(values) => join(values.iter().map(f64::to_string)),
        }
    }

    fn summary_cell(&self, key: &str) -> String {
        match self {
            LogValue::Array(values) => join(values.iter().map(|&v| decimal(round3(v)))),
            LogValue::Bool(v) => u8::from(*v).to_string(),
            LogValue::Int(v) => v.to_string(),
            LogValue::Float(v) if key.contains("time") && !key.contains("timeout") => {
                if *v > 0.001 {
                    decimal(round3(*v))
                } else {
                    scientific(*v)
                }
            }
            LogValue::Float(v) => decimal(round3(*v)),
        }
    }
}

fn join(cells: impl Iterator<Item = String>) -> String {
    cells.collect::<Vec<_>>().join(" ")
}

/// Flat, insertion-ordered key/value record.
///
/// Inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfoRecord {
    entries: Vec<(String, LogValue)>,
}

impl InfoRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<LogValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Merge another record into this one.
    pub fn extend(&mut self, other: InfoRecord) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&LogValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a float or integer value as `f64`.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            LogValue::Float(v) => Some(*v),
            LogValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Look up a flag.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            LogValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LogValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the record is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One-line human readable rendering used for episode summaries.
    ///
    /// Arrays print as space separated values, flags as `0`/`1`, tiny
    /// durations in scientific notation, everything else rounded to three
    /// decimals.
    pub fn summary_line(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| format!("{key}: {}", value.summary_cell(key)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Serialize for InfoRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(k, v)| (k, v)))
    }
}

/// Writes accumulated records as one CSV table per flush.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    /// Create a sink writing into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File written for an episode.
    pub fn path_for(&self, episode: u64) -> PathBuf {
        self.dir.join(format!("episode_{episode}.csv"))
    }

    /// Write `records` as a table keyed by row index.
    ///
    /// Columns are the union of all keys in first-seen order; cells for keys
    /// a record lacks stay empty.
    pub fn write(&self, episode: u64, records: &[InfoRecord]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(episode);

        let mut columns: Vec<&str> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.contains(&key) {
                    columns.push(key);
                }
            }
        }

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(std::iter::once("").chain(columns.iter().copied()))?;
        for (row, record) in records.iter().enumerate() {
            let cells = columns
                .iter()
                .map(|key| record.get(key).map(LogValue::csv_cell).unwrap_or_default());
            writer.write_record(std::iter::once(row.to_string()).chain(cells))?;
        }
        writer.flush()?;

        Ok(path)
    }
}

//! CSV bar loading.
//!
//! Expected header: `timestamp,open,high,low,close,volume` (capitalised
//! variants and `datetime`/`date` for the time column are accepted).
//! Timestamps are RFC 3339 or `%Y-%m-%d %H:%M:%S` / `%Y-%m-%d` in UTC.
//!
//! Rows with a blank or non-finite field, or a non-positive close, are
//! dropped and counted. The surviving series must have strictly increasing
//! timestamps.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regimelab_core::domain::{validate_series, Bar, BarError};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}: unrecognised timestamp '{value}'")]
    Timestamp { line: u64, value: String },

    #[error("no usable bars ({dropped} rows dropped)")]
    NoBars { dropped: usize },

    #[error("invalid bar series: {0}")]
    Series(#[from] BarError),
}

/// Bars read from one file plus provenance.
#[derive(Debug, Clone)]
pub struct LoadedBars {
    pub symbol: String,
    pub bars: Vec<Bar>,
    /// Rows skipped because a price or volume was blank or invalid.
    pub dropped_rows: usize,
    pub dataset_hash: String,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "Timestamp", alias = "datetime", alias = "Datetime", alias = "date", alias = "Date")]
    timestamp: String,
    #[serde(alias = "Open")]
    open: Option<f64>,
    #[serde(alias = "High")]
    high: Option<f64>,
    #[serde(alias = "Low")]
    low: Option<f64>,
    #[serde(alias = "Close")]
    close: Option<f64>,
    #[serde(alias = "Volume")]
    volume: Option<f64>,
}

pub fn load_bars_csv(path: &Path) -> Result<LoadedBars, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let (bars, dropped_rows) = read_bars(file)?;
    if dropped_rows > 0 {
        tracing::warn!(path = %path.display(), dropped_rows, "dropped rows with missing or inconsistent OHLCV values");
    }
    let dataset_hash = dataset_hash(&bars);
    tracing::debug!(path = %path.display(), bars = bars.len(), "loaded bars");
    Ok(LoadedBars {
        symbol: symbol_from_path(path),
        bars,
        dropped_rows,
        dataset_hash,
    })
}

/// Parse bars from any CSV source. Returns the bars and the dropped-row count.
pub fn read_bars<R: Read>(reader: R) -> Result<(Vec<Bar>, usize), LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();
    let mut dropped = 0;

    for record in rdr.deserialize::<CsvRow>() {
        let row = record?;
        let line = bars.len() as u64 + dropped as u64 + 2;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| LoadError::Timestamp {
            line,
            value: row.timestamp.clone(),
        })?;

        let (Some(open), Some(high), Some(low), Some(close), Some(volume)) =
            (row.open, row.high, row.low, row.close, row.volume)
        else {
            dropped += 1;
            continue;
        };
        let bar = Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        };
        if !bar.is_sane() {
            dropped += 1;
            continue;
        }
        bars.push(bar);
    }

    if bars.is_empty() {
        return Err(LoadError::NoBars { dropped });
    }
    validate_series(&bars)?;
    Ok((bars, dropped))
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

/// Upper-cased file stem, e.g. `data/btc_1h.csv` → `BTC_1H`.
pub fn symbol_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_uppercase())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

/// All `*.csv` files directly inside `dir`, sorted by name.
pub fn discover_csv_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let entries = std::fs::read_dir(dir).map_err(|source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| LoadError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        if path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// BLAKE3 over the bar fields, in order. Identical series hash identically.
pub fn dataset_hash(bars: &[Bar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(&bar.timestamp.timestamp().to_le_bytes());
        for v in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
            hasher.update(&v.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

//! Multi-ticker runs.
//!
//! Each ticker is an independent run with its own model, session and
//! ledger, so the batch parallelises with Rayon and one failure never
//! stops the others.

use rayon::prelude::*;
use regimelab_core::domain::Bar;
use std::path::PathBuf;

use crate::config::BacktestConfig;
use crate::data_loader::load_bars_csv;
use crate::runner::{run_backtest, BacktestResult, RunError};

/// Outcome for one ticker.
#[derive(Debug)]
pub struct BatchEntry {
    pub symbol: String,
    pub result: Result<BacktestResult, RunError>,
}

impl BatchEntry {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run every `(symbol, bars)` pair. Output order matches input order.
pub fn run_batch(inputs: &[(String, Vec<Bar>)], config: &BacktestConfig) -> Vec<BatchEntry> {
    inputs
        .par_iter()
        .map(|(symbol, bars)| BatchEntry {
            symbol: symbol.clone(),
            result: run_backtest(symbol, bars, config),
        })
        .collect()
}

/// Load and run every CSV file. A file that fails to load becomes a failed
/// entry, like a failed run.
pub fn run_csv_batch(files: &[PathBuf], config: &BacktestConfig) -> Vec<BatchEntry> {
    files
        .par_iter()
        .map(|path| {
            let symbol = crate::data_loader::symbol_from_path(path);
            let result = load_bars_csv(path)
                .map_err(RunError::from)
                .and_then(|loaded| run_backtest(&symbol, &loaded.bars, config));
            if let Err(e) = &result {
                tracing::warn!(symbol = %symbol, error = %e, "batch entry failed");
            }
            BatchEntry { symbol, result }
        })
        .collect()
}

/// Count of successful and failed entries.
pub fn tally(entries: &[BatchEntry]) -> (usize, usize) {
    let ok = entries.iter().filter(|e| e.is_ok()).count();
    (ok, entries.len() - ok)
}

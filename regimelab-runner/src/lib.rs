//! RegimeLab Runner: backtest orchestration on top of `regimelab-core`.
//!
//! - TOML configuration with defaults and full validation
//! - CSV bar loading
//! - Single runs with the regime-fit fallback policy, and parallel batches
//! - Performance summary and artifact export

pub mod batch;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;

pub use batch::{run_batch, run_csv_batch, BatchEntry};
pub use config::{BacktestConfig, ConfigError, ConvergenceFallback, RunId};
pub use data_loader::{load_bars_csv, LoadError, LoadedBars};
pub use export::ArtifactWriter;
pub use metrics::PerformanceSummary;
pub use runner::{run_backtest, run_csv_backtest, BacktestResult, RegimePoint, RunError};

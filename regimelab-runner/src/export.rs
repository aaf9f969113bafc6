//! Artifact export: JSON, CSV and a Markdown summary per run.
//!
//! `summary.json` holds the full `BacktestResult` with its `schema_version`;
//! unknown versions are rejected on load. The CSV files are flat views for
//! external tools.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use regimelab_core::domain::{EquityPoint, Trade};

use crate::runner::{BacktestResult, RegimePoint, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult`, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

pub fn export_trades_csv(trades: &[Trade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "entry_bar",
        "entry_time",
        "entry_price",
        "conditions_at_entry",
        "exit_bar",
        "exit_time",
        "exit_price",
        "exit_reason",
        "regime_at_exit",
        "size",
        "pnl",
        "return_pct",
    ])?;

    for t in trades {
        wtr.write_record([
            t.entry_bar.to_string(),
            t.entry_time.to_rfc3339(),
            format!("{:.6}", t.entry_price),
            t.conditions_at_entry.to_string(),
            t.exit_bar.to_string(),
            t.exit_time.to_rfc3339(),
            format!("{:.6}", t.exit_price),
            format!("{:?}", t.exit_reason),
            t.regime_at_exit.to_string(),
            format!("{:.6}", t.size),
            format!("{:.2}", t.pnl),
            format!("{:.4}", t.return_pct()),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_equity_csv(equity: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "cash", "position_value", "total_equity"])?;
    for p in equity {
        wtr.write_record([
            p.timestamp.to_rfc3339(),
            format!("{:.2}", p.cash),
            format!("{:.2}", p.position_value),
            format!("{:.2}", p.total_equity),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Empty cells mark bars without a regime label or a vote.
pub fn export_regimes_csv(regimes: &[RegimePoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "regime", "conditions_met"])?;
    for r in regimes {
        wtr.write_record([
            r.timestamp.to_rfc3339(),
            r.regime.map(|l| l.to_string()).unwrap_or_default(),
            r.conditions_met.map(|n| n.to_string()).unwrap_or_default(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Writes one directory of artifacts per run.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// `<output>/<symbol>-<first 12 hex of run_id>/`.
    pub fn run_dir(&self, result: &BacktestResult) -> PathBuf {
        let prefix: String = result.run_id.chars().take(12).collect();
        self.output_dir.join(format!("{}-{}", result.symbol, prefix))
    }

    /// Write `summary.json`, `trades.csv`, `trades.json`, `equity.csv`,
    /// `regimes.csv` and `report.md`. Returns the run directory.
    pub fn save(&self, result: &BacktestResult) -> Result<PathBuf> {
        let run_dir = self.run_dir(result);
        std::fs::create_dir_all(&run_dir)
            .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

        write(&run_dir.join("summary.json"), &export_json(result)?)?;
        write(&run_dir.join("trades.csv"), &export_trades_csv(&result.trades)?)?;
        let trades_json =
            serde_json::to_string_pretty(&result.trades).context("failed to serialize trades")?;
        write(&run_dir.join("trades.json"), &trades_json)?;
        write(&run_dir.join("equity.csv"), &export_equity_csv(&result.equity)?)?;
        write(&run_dir.join("regimes.csv"), &export_regimes_csv(&result.regimes)?)?;
        write(&run_dir.join("report.md"), &generate_report(result))?;

        tracing::info!(path = %run_dir.display(), "artifacts written");
        Ok(run_dir)
    }
}

fn write(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

/// Load a `BacktestResult` from an artifact directory's `summary.json`.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let path = dir.join("summary.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

// ─── Markdown report ────────────────────────────────────────────────

pub fn generate_report(result: &BacktestResult) -> String {
    let s = &result.summary;
    let mut md = String::with_capacity(1024);

    md.push_str(&format!("# Backtest Report: {}\n\n", result.symbol));
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!(
        "| Period | {} to {} |\n",
        result.start_time.format("%Y-%m-%d %H:%M"),
        result.end_time.format("%Y-%m-%d %H:%M")
    ));
    md.push_str(&format!(
        "| Bars | {} (trading from bar {}) |\n",
        result.bar_count, result.start_index
    ));
    md.push_str(&format!("| Run ID | {} |\n", result.run_id));
    match &result.model {
        Some(m) => md.push_str(&format!(
            "| Regime model | {} states, {:?}, {} iterations, converged: {} |\n",
            m.n_states, m.covariance_type, m.iterations, m.converged
        )),
        None => md.push_str(&format!(
            "| Regime model | **FALLBACK** ({}) |\n",
            result.fallback_reason.as_deref().unwrap_or("unknown")
        )),
    }
    md.push('\n');

    md.push_str("## Performance\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Initial capital | ${:.2} |\n", s.initial_capital));
    md.push_str(&format!("| Final equity | ${:.2} |\n", s.final_equity));
    md.push_str(&format!("| Total return | {:.2}% |\n", s.total_return_pct));
    md.push_str(&format!("| Buy & hold | {:.2}% |\n", s.buy_and_hold_pct));
    md.push_str(&format!("| Alpha | {:.2}% |\n", s.alpha_pct));
    md.push_str(&format!("| Max drawdown | {:.2}% |\n", s.max_drawdown_pct));
    md.push_str(&format!(
        "| Win rate | {} |\n",
        s.win_rate_pct
            .map(|w| format!("{w:.1}%"))
            .unwrap_or_else(|| "n/a".to_string())
    ));
    md.push_str(&format!(
        "| Trades | {} ({} won, {} lost) |\n",
        s.trade_count, s.winners, s.losers
    ));
    if s.missing_indicator_bars > 0 {
        md.push_str(&format!(
            "| Bars with missing indicators | {} |\n",
            s.missing_indicator_bars
        ));
    }
    if result.open_position.is_some() {
        md.push_str("| Open at end | yes (marked to market) |\n");
    }
    md
}

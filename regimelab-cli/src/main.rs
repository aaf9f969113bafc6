//! RegimeLab CLI: regime-gated backtests from CSV bar files.
//!
//! Commands:
//! - `run`: backtest one CSV file and write artifacts
//! - `batch`: backtest every CSV file in a directory in parallel
//! - `config`: print the effective config as TOML, optionally validating a file

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use regimelab_runner::batch::tally;
use regimelab_runner::data_loader::discover_csv_files;
use regimelab_runner::{
    run_csv_backtest, run_csv_batch, ArtifactWriter, BacktestConfig, BacktestResult,
};

#[derive(Parser)]
#[command(
    name = "regimelab",
    about = "RegimeLab CLI: HMM regime-gated leveraged backtesting"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest a single CSV file of OHLCV bars.
    Run {
        /// CSV with columns timestamp,open,high,low,close,volume.
        #[arg(long)]
        data: PathBuf,

        /// Symbol label. Defaults to the upper-cased file stem.
        #[arg(long)]
        symbol: Option<String>,

        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Print the summary only; write no artifacts.
        #[arg(long, default_value_t = false)]
        no_export: bool,
    },
    /// Backtest every CSV file in a directory.
    Batch {
        /// Directory containing one CSV file per ticker.
        #[arg(long)]
        data_dir: PathBuf,

        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Print the effective config as TOML.
    Config {
        /// Validate this file and print it with defaults filled in.
        #[arg(long)]
        validate: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            data,
            symbol,
            config,
            output_dir,
            no_export,
        } => run_cmd(&data, symbol.as_deref(), config.as_deref(), &output_dir, no_export),
        Commands::Batch {
            data_dir,
            config,
            output_dir,
        } => batch_cmd(&data_dir, config.as_deref(), &output_dir),
        Commands::Config { validate } => config_cmd(validate.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<BacktestConfig> {
    let config = match path {
        Some(p) => BacktestConfig::from_file(p)?,
        None => BacktestConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn run_cmd(
    data: &Path,
    symbol: Option<&str>,
    config_path: Option<&Path>,
    output_dir: &Path,
    no_export: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let result = run_csv_backtest(data, symbol, &config)?;

    print_summary(&result);

    if !no_export {
        let run_dir = ArtifactWriter::new(output_dir).save(&result)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn batch_cmd(data_dir: &Path, config_path: Option<&Path>, output_dir: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let files = discover_csv_files(data_dir)?;
    if files.is_empty() {
        bail!("no CSV files found in {}", data_dir.display());
    }

    tracing::info!(files = files.len(), dir = %data_dir.display(), "starting batch");
    let entries = run_csv_batch(&files, &config);
    let writer = ArtifactWriter::new(output_dir);

    println!();
    println!(
        "{:<12} {:>8} {:>10} {:>10} {:>10} {:>10}",
        "Symbol", "Trades", "Return%", "B&H%", "Alpha%", "MaxDD%"
    );
    for entry in &entries {
        match &entry.result {
            Ok(r) => {
                let s = &r.summary;
                println!(
                    "{:<12} {:>8} {:>10.2} {:>10.2} {:>10.2} {:>10.2}{}",
                    entry.symbol,
                    s.trade_count,
                    s.total_return_pct,
                    s.buy_and_hold_pct,
                    s.alpha_pct,
                    s.max_drawdown_pct,
                    if r.regime_fallback { "  (regime fallback)" } else { "" }
                );
                writer.save(r)?;
            }
            Err(e) => println!("{:<12} FAILED: {e}", entry.symbol),
        }
    }

    let (ok, failed) = tally(&entries);
    println!();
    println!("{ok} succeeded, {failed} failed. Artifacts in {}", output_dir.display());
    if ok == 0 {
        bail!("every batch entry failed");
    }
    Ok(())
}

fn config_cmd(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    if let Some(p) = path {
        eprintln!("{} is valid", p.display());
    }
    print!("{}", config.to_toml()?);
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let s = &result.summary;
    println!();
    println!("=== Backtest Result ===");
    println!("Symbol:         {}", result.symbol);
    println!(
        "Period:         {} to {}",
        result.start_time.format("%Y-%m-%d %H:%M"),
        result.end_time.format("%Y-%m-%d %H:%M")
    );
    println!(
        "Bars:           {} (trading from bar {})",
        result.bar_count, result.start_index
    );
    match &result.model {
        Some(m) => println!(
            "Regime model:   {} states, bull={} bear={}, converged={} after {} iterations",
            m.n_states, m.bull_state, m.bear_state, m.converged, m.iterations
        ),
        None => println!("Regime model:   none (fallback to Neutral, gate disabled)"),
    }
    println!("Trades:         {}", s.trade_count);
    println!();
    println!("--- Performance ---");
    println!("Initial:        ${:.2}", s.initial_capital);
    println!("Final Equity:   ${:.2}", s.final_equity);
    println!("Total Return:   {:.2}%", s.total_return_pct);
    println!("Buy & Hold:     {:.2}%", s.buy_and_hold_pct);
    println!("Alpha:          {:.2}%", s.alpha_pct);
    println!("Max Drawdown:   {:.2}%", s.max_drawdown_pct);
    match s.win_rate_pct {
        Some(w) => println!("Win Rate:       {w:.1}%"),
        None => println!("Win Rate:       n/a"),
    }
    if let Some(h) = s.avg_trade_duration_hours {
        println!("Avg Duration:   {h:.1}h");
    }
    if result.open_position.is_some() {
        println!("Open position marked to market at the last close.");
    }
    if let Some(reason) = &result.fallback_reason {
        println!();
        println!("WARNING: regime model failed ({reason}); entries used the condition vote only");
    }
    if s.missing_indicator_bars > 0 {
        println!("WARNING: {} bars had missing indicators", s.missing_indicator_bars);
    }
    println!();
}

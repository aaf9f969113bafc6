//! Serializable backtest configuration.
//!
//! Every field has a default, so an empty TOML file is a valid config:
//!
//! ```toml
//! [regime]
//! n_states = 7
//! covariance_type = "diagonal"
//! on_convergence_failure = "abort"
//!
//! [strategy]
//! min_conditions_for_entry = 7
//!
//! [strategy.thresholds]
//! rsi_max = 90.0
//!
//! [risk]
//! initial_capital = 2000.0
//! leverage = 2.5
//! cooldown_hours = 48
//! ```

use regimelab_core::conditions::{ConditionThresholds, CONDITION_COUNT};
use regimelab_core::engine::{RegimeGate, SimulationConfig};
use regimelab_core::hmm::{CovarianceType, HmmConfig, DEFAULT_MIN_COVAR};
use regimelab_core::indicators::{warmup_bars, IndicatorParams};
use regimelab_core::regime::{DetectorConfig, InferenceMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Content hash of a configuration (hex BLAKE3).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(String),

    #[error("invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// What to do when the regime HMM cannot be fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceFallback {
    /// Fail the run.
    #[default]
    Abort,
    /// Label every bar Neutral, disable the regime gate and flag the result.
    NeutralRegime,
}

/// `[regime]`: feature extraction and HMM fitting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeSection {
    pub n_states: usize,
    pub covariance_type: CovarianceType,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub seed: u64,
    pub min_training_samples: usize,
    /// Rolling window for the volume-volatility feature.
    pub volatility_window: usize,
    pub inference: InferenceMode,
    pub on_convergence_failure: ConvergenceFallback,
}

impl Default for RegimeSection {
    fn default() -> Self {
        let hmm = HmmConfig::default();
        Self {
            n_states: hmm.n_states,
            covariance_type: hmm.covariance_type,
            max_iterations: hmm.max_iterations,
            tolerance: hmm.tolerance,
            seed: hmm.seed,
            min_training_samples: DetectorConfig::default().min_training_samples,
            volatility_window: regimelab_core::features::DEFAULT_VOLATILITY_WINDOW,
            inference: InferenceMode::default(),
            on_convergence_failure: ConvergenceFallback::default(),
        }
    }
}

/// `[strategy]`: entry vote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySection {
    pub min_conditions_for_entry: u8,
    pub thresholds: ConditionThresholds,
}

impl Default for StrategySection {
    fn default() -> Self {
        Self {
            min_conditions_for_entry: 7,
            thresholds: ConditionThresholds::default(),
        }
    }
}

/// `[risk]`: capital, leverage and re-entry cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSection {
    pub initial_capital: f64,
    pub leverage: f64,
    pub cooldown_hours: u32,
    pub liquidate_at_end: bool,
}

impl Default for RiskSection {
    fn default() -> Self {
        let sim = SimulationConfig::default();
        Self {
            initial_capital: sim.initial_capital,
            leverage: sim.leverage,
            cooldown_hours: sim.cooldown_hours,
            liquidate_at_end: sim.liquidate_at_end,
        }
    }
}

/// Complete, reproducible description of a backtest run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub regime: RegimeSection,
    pub strategy: StrategySection,
    pub risk: RiskSection,
    pub indicators: IndicatorParams,
}

impl BacktestConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Deterministic id: BLAKE3 of the canonical JSON form. Two runs with
    /// identical configs share an id.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    /// Check every field and report all violations at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        let r = &self.regime;
        if r.n_states < 1 {
            problems.push("regime.n_states must be >= 1".to_string());
        }
        if r.max_iterations < 1 {
            problems.push("regime.max_iterations must be >= 1".to_string());
        }
        if !(r.tolerance.is_finite() && r.tolerance > 0.0) {
            problems.push(format!("regime.tolerance must be > 0, got {}", r.tolerance));
        }
        if r.min_training_samples < 1 {
            problems.push("regime.min_training_samples must be >= 1".to_string());
        }
        if r.volatility_window < 2 {
            problems.push(format!(
                "regime.volatility_window must be >= 2, got {}",
                r.volatility_window
            ));
        }

        if self.strategy.min_conditions_for_entry > CONDITION_COUNT {
            problems.push(format!(
                "strategy.min_conditions_for_entry must be <= {CONDITION_COUNT}, got {}",
                self.strategy.min_conditions_for_entry
            ));
        }

        let risk = &self.risk;
        if !(risk.initial_capital.is_finite() && risk.initial_capital > 0.0) {
            problems.push(format!(
                "risk.initial_capital must be > 0, got {}",
                risk.initial_capital
            ));
        }
        if !(risk.leverage.is_finite() && risk.leverage >= 1.0) {
            problems.push(format!("risk.leverage must be >= 1, got {}", risk.leverage));
        }

        let p = &self.indicators;
        for (name, period) in [
            ("rsi", p.rsi),
            ("macd_fast", p.macd_fast),
            ("macd_slow", p.macd_slow),
            ("macd_signal", p.macd_signal),
            ("adx", p.adx),
            ("ema_fast", p.ema_fast),
            ("ema_slow", p.ema_slow),
            ("volume_sma", p.volume_sma),
            ("momentum", p.momentum),
        ] {
            if period < 1 {
                problems.push(format!("indicators.{name} must be >= 1"));
            }
        }
        if p.volatility < 2 {
            problems.push(format!("indicators.volatility must be >= 2, got {}", p.volatility));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            hmm: HmmConfig {
                n_states: self.regime.n_states,
                covariance_type: self.regime.covariance_type,
                max_iterations: self.regime.max_iterations,
                tolerance: self.regime.tolerance,
                seed: self.regime.seed,
                min_covar: DEFAULT_MIN_COVAR,
            },
            min_training_samples: self.regime.min_training_samples,
        }
    }

    /// Simulator parameters. Warm-up comes from the indicator periods.
    pub fn simulation_config(&self, regime_gate: RegimeGate) -> SimulationConfig {
        SimulationConfig {
            initial_capital: self.risk.initial_capital,
            leverage: self.risk.leverage,
            cooldown_hours: self.risk.cooldown_hours,
            min_conditions: self.strategy.min_conditions_for_entry,
            liquidate_at_end: self.risk.liquidate_at_end,
            regime_gate,
            warmup_bars: warmup_bars(&self.indicators),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        let config = BacktestConfig::from_toml("").unwrap();
        assert_eq!(config, BacktestConfig::default());
        assert_eq!(config.regime.n_states, 7);
        assert_eq!(config.regime.covariance_type, CovarianceType::Diagonal);
        assert_eq!(config.strategy.min_conditions_for_entry, 7);
        assert_eq!(config.risk.cooldown_hours, 48);
        assert_eq!(config.risk.leverage, 2.5);
        assert_eq!(config.risk.initial_capital, 2000.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let text = r#"
            [regime]
            n_states = 3
            covariance_type = "full"
            on_convergence_failure = "neutral_regime"

            [strategy.thresholds]
            adx_min = 20.0
        "#;
        let config = BacktestConfig::from_toml(text).unwrap();
        assert_eq!(config.regime.n_states, 3);
        assert_eq!(config.regime.covariance_type, CovarianceType::Full);
        assert_eq!(
            config.regime.on_convergence_failure,
            ConvergenceFallback::NeutralRegime
        );
        assert_eq!(config.regime.max_iterations, 1000);
        assert_eq!(config.strategy.thresholds.adx_min, 20.0);
        assert_eq!(config.strategy.thresholds.rsi_max, 90.0);
        assert_eq!(config.risk, RiskSection::default());
    }

    #[test]
    fn toml_round_trip() {
        let mut config = BacktestConfig::default();
        config.regime.inference = InferenceMode::Filtered;
        config.risk.liquidate_at_end = true;
        let text = config.to_toml().unwrap();
        assert_eq!(BacktestConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn unknown_enum_value_is_a_parse_error() {
        let err = BacktestConfig::from_toml("[regime]\ncovariance_type = \"spherical\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validate_reports_every_violation() {
        let mut config = BacktestConfig::default();
        config.regime.n_states = 0;
        config.strategy.min_conditions_for_entry = 9;
        config.risk.leverage = 0.5;
        config.risk.initial_capital = 0.0;

        match config.validate() {
            Err(ConfigError::Invalid(problems)) => {
                assert_eq!(problems.len(), 4, "{problems:?}");
                assert!(problems.iter().any(|p| p.contains("n_states")));
                assert!(problems.iter().any(|p| p.contains("min_conditions_for_entry")));
                assert!(problems.iter().any(|p| p.contains("leverage")));
                assert!(problems.iter().any(|p| p.contains("initial_capital")));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn single_state_and_zero_cooldown_are_valid() {
        let mut config = BacktestConfig::default();
        config.regime.n_states = 1;
        config.risk.cooldown_hours = 0;
        config.strategy.min_conditions_for_entry = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn run_id_is_deterministic_and_content_addressed() {
        let a = BacktestConfig::default();
        let b = BacktestConfig::default();
        assert_eq!(a.run_id().unwrap(), b.run_id().unwrap());
        assert_eq!(a.run_id().unwrap().len(), 64);

        let mut c = a;
        c.risk.cooldown_hours = 24;
        assert_ne!(a.run_id().unwrap(), c.run_id().unwrap());
    }

    #[test]
    fn derived_configs_follow_sections() {
        let mut config = BacktestConfig::default();
        config.regime.n_states = 4;
        config.risk.cooldown_hours = 12;

        let detector = config.detector_config();
        assert_eq!(detector.hmm.n_states, 4);
        assert_eq!(detector.min_training_samples, 100);

        let sim = config.simulation_config(RegimeGate::Disabled);
        assert_eq!(sim.cooldown_hours, 12);
        assert_eq!(sim.min_conditions, 7);
        assert_eq!(sim.regime_gate, RegimeGate::Disabled);
        assert_eq!(sim.warmup_bars, warmup_bars(&config.indicators));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "[risk]\nleverage = 3.0\n").unwrap();
        let config = BacktestConfig::from_file(&path).unwrap();
        assert_eq!(config.risk.leverage, 3.0);

        let missing = BacktestConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}

//! Regime detector and the fitted regime model.
//!
//! States are labelled by their mean log return: the highest is Bull, the
//! lowest is Bear, everything else Neutral. Ties go to the lowest state id.
//! With a single state Bull and Bear coincide and Bull wins, so every bar
//! is labelled Bull.

use super::scaler::StandardScaler;
use crate::domain::RegimeLabel;
use crate::features::{FeatureVector, N_FEATURES};
use crate::hmm::algorithms::argmax;
use crate::hmm::{CovarianceType, FitReport, ForwardFilter, GaussianHmm, HmmConfig, HmmError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegimeError {
    #[error("insufficient training data: need {needed} rows, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("HMM fitting failed: {0}")]
    Convergence(#[source] HmmError),
}

/// How a regime stream is inferred from a feature sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceMode {
    /// Most likely path over the whole sequence.
    #[default]
    Viterbi,
    /// Forward filter: each label uses only the bars up to and including it.
    Filtered,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    pub hmm: HmmConfig,
    pub min_training_samples: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            hmm: HmmConfig::default(),
            min_training_samples: 100,
        }
    }
}

/// Trains [`RegimeModel`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegimeDetector {
    config: DetectorConfig,
}

impl RegimeDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn train(&self, rows: &[FeatureVector]) -> Result<RegimeModel, RegimeError> {
        let needed = self.config.min_training_samples.max(self.config.hmm.n_states);
        if rows.len() < needed {
            return Err(RegimeError::InsufficientData {
                needed,
                got: rows.len(),
            });
        }

        let raw: Vec<[f64; N_FEATURES]> = rows.iter().map(FeatureVector::as_array).collect();
        let scaler = StandardScaler::fit(&raw);
        let data: Vec<Vec<f64>> = raw.iter().map(|r| scaler.transform(r)).collect();

        tracing::debug!(
            samples = data.len(),
            n_states = self.config.hmm.n_states,
            covariance = ?self.config.hmm.covariance_type,
            "fitting regime HMM"
        );

        let (hmm, report) = GaussianHmm::fit(&data, &self.config.hmm).map_err(|e| match e {
            HmmError::InsufficientData { needed, got, .. } => {
                RegimeError::InsufficientData { needed, got }
            }
            other => RegimeError::Convergence(other),
        })?;

        let mean_returns: Vec<f64> = hmm.emissions().iter().map(|e| e.mean()[0]).collect();
        let (bull_state, bear_state) = assign_roles(&mean_returns);

        if report.converged {
            tracing::info!(
                iterations = report.iterations,
                log_likelihood = report.log_likelihood,
                bull_state,
                bear_state,
                "regime model converged"
            );
        } else {
            tracing::warn!(
                iterations = report.iterations,
                log_likelihood = report.log_likelihood,
                "regime model hit the iteration cap without converging"
            );
        }

        Ok(RegimeModel {
            scaler,
            hmm,
            bull_state,
            bear_state,
            report,
            training_samples: rows.len(),
        })
    }
}

/// `(bull, bear)` = (argmax, argmin) of per-state mean return, lowest id on ties.
fn assign_roles(mean_returns: &[f64]) -> (usize, usize) {
    let negated: Vec<f64> = mean_returns.iter().map(|m| -m).collect();
    (argmax(mean_returns), argmax(&negated))
}

/// Fit summary carried into run results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeDiagnostics {
    pub n_states: usize,
    pub covariance_type: CovarianceType,
    pub training_samples: usize,
    pub converged: bool,
    pub iterations: usize,
    pub log_likelihood: f64,
    pub bull_state: usize,
    pub bear_state: usize,
}

/// A trained regime classifier. Immutable; prediction is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegimeModel {
    scaler: StandardScaler,
    hmm: GaussianHmm,
    bull_state: usize,
    bear_state: usize,
    report: FitReport,
    training_samples: usize,
}

impl RegimeModel {
    pub fn n_states(&self) -> usize {
        self.hmm.n_states()
    }

    pub fn bull_state(&self) -> usize {
        self.bull_state
    }

    pub fn bear_state(&self) -> usize {
        self.bear_state
    }

    pub fn hmm(&self) -> &GaussianHmm {
        &self.hmm
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn diagnostics(&self) -> RegimeDiagnostics {
        RegimeDiagnostics {
            n_states: self.n_states(),
            covariance_type: self.hmm.covariance_type(),
            training_samples: self.training_samples,
            converged: self.report.converged,
            iterations: self.report.iterations,
            log_likelihood: self.report.log_likelihood,
            bull_state: self.bull_state,
            bear_state: self.bear_state,
        }
    }

    /// Per-state mean log return in raw (unstandardised) units.
    pub fn state_mean_returns(&self) -> Vec<f64> {
        self.hmm
            .emissions()
            .iter()
            .map(|e| self.scaler.inverse(0, e.mean()[0]))
            .collect()
    }

    /// Label for a raw state id. Bull takes precedence over Bear.
    pub fn label_of(&self, state: usize) -> RegimeLabel {
        if state == self.bull_state {
            RegimeLabel::Bull
        } else if state == self.bear_state {
            RegimeLabel::Bear
        } else {
            RegimeLabel::Neutral
        }
    }

    fn standardise(&self, rows: &[FeatureVector]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|r| self.scaler.transform(&r.as_array()))
            .collect()
    }

    /// Viterbi state ids for a contiguous run of feature rows.
    pub fn predict_states(&self, rows: &[FeatureVector]) -> Vec<usize> {
        self.hmm.decode(&self.standardise(rows))
    }

    /// Viterbi labels for a contiguous run of feature rows.
    pub fn predict(&self, rows: &[FeatureVector]) -> Vec<RegimeLabel> {
        self.predict_states(rows)
            .into_iter()
            .map(|s| self.label_of(s))
            .collect()
    }

    /// Label a single bar from its own features only.
    pub fn predict_one(&self, row: &FeatureVector) -> RegimeLabel {
        self.label_of(self.hmm.classify_one(&self.scaler.transform(&row.as_array())))
    }

    /// Smoothed state probabilities, one row of `n_states` per input row.
    pub fn posteriors(&self, rows: &[FeatureVector]) -> Vec<Vec<f64>> {
        self.hmm.posteriors(&self.standardise(rows))
    }

    /// Causal labels: each bar uses only the rows up to and including it.
    pub fn predict_filtered(&self, rows: &[FeatureVector]) -> Vec<RegimeLabel> {
        let mut filter = self.filter();
        rows.iter().map(|r| filter.update(r)).collect()
    }

    pub fn filter(&self) -> RegimeFilter<'_> {
        RegimeFilter {
            model: self,
            inner: self.hmm.filter(),
        }
    }

    /// Labels aligned with bars. Undefined rows stay `None`; defined rows
    /// are inferred as one sequence in the requested mode.
    pub fn label_series(
        &self,
        rows: &[Option<FeatureVector>],
        mode: InferenceMode,
    ) -> Vec<Option<RegimeLabel>> {
        let (indices, valid): (Vec<usize>, Vec<FeatureVector>) = rows
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.map(|f| (i, f)))
            .unzip();
        let labels = match mode {
            InferenceMode::Viterbi => self.predict(&valid),
            InferenceMode::Filtered => self.predict_filtered(&valid),
        };
        let mut out = vec![None; rows.len()];
        for (i, label) in indices.into_iter().zip(labels) {
            out[i] = Some(label);
        }
        out
    }
}

/// Streaming regime labeller. Produces the same labels as
/// [`RegimeModel::predict_filtered`] one bar at a time.
#[derive(Debug, Clone)]
pub struct RegimeFilter<'a> {
    model: &'a RegimeModel,
    inner: ForwardFilter<'a>,
}

impl RegimeFilter<'_> {
    pub fn update(&mut self, row: &FeatureVector) -> RegimeLabel {
        let state = self.inner.step(&self.model.scaler.transform(&row.as_array()));
        self.model.label_of(state)
    }
}

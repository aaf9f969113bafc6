//! Gaussian HMM parameters and Baum–Welch fitting.

use super::algorithms::{argmax, backward, forward, log_sum_exp, posteriors, viterbi};
use super::gaussian::{weighted_moments, CovarianceType, GaussianEmission};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::Serialize;
use thiserror::Error;

/// Variance floor added to every covariance diagonal.
pub const DEFAULT_MIN_COVAR: f64 = 1e-3;

const KMEANS_MAX_ITER: usize = 100;
const STATIONARY_MAX_ITER: usize = 10_000;
const STATIONARY_TOL: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HmmError {
    #[error("need at least {needed} observations to fit {n_states} states, got {got}")]
    InsufficientData {
        needed: usize,
        got: usize,
        n_states: usize,
    },

    #[error("log-likelihood became non-finite at iteration {iteration}")]
    NonFiniteLikelihood { iteration: usize },

    #[error("covariance of state {state} is not positive definite")]
    NotPositiveDefinite { state: usize },
}

/// Fitting parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HmmConfig {
    pub n_states: usize,
    pub covariance_type: CovarianceType,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub seed: u64,
    pub min_covar: f64,
}

impl Default for HmmConfig {
    fn default() -> Self {
        Self {
            n_states: 7,
            covariance_type: CovarianceType::Diagonal,
            max_iterations: 1000,
            tolerance: 1e-4,
            seed: 42,
            min_covar: DEFAULT_MIN_COVAR,
        }
    }
}

/// Outcome of an EM run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitReport {
    pub converged: bool,
    pub iterations: usize,
    pub log_likelihood: f64,
}

/// A fitted Gaussian hidden Markov model. Immutable after [`GaussianHmm::fit`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaussianHmm {
    covariance_type: CovarianceType,
    start: Vec<f64>,
    transitions: Vec<Vec<f64>>,
    emissions: Vec<GaussianEmission>,
}

impl GaussianHmm {
    /// Fit by Baum–Welch EM from a deterministic k-means initialisation.
    pub fn fit(data: &[Vec<f64>], config: &HmmConfig) -> Result<(Self, FitReport), HmmError> {
        let k = config.n_states;
        if k == 0 || data.len() < k.max(2) {
            return Err(HmmError::InsufficientData {
                needed: k.max(2),
                got: data.len(),
                n_states: k,
            });
        }

        let mut model = Self::initialise(data, config)?;
        let mut prev_ll = f64::NEG_INFINITY;
        let mut report = FitReport {
            converged: false,
            iterations: 0,
            log_likelihood: f64::NEG_INFINITY,
        };

        for iteration in 0..config.max_iterations.max(1) {
            let log_emis = model.log_emissions(data);
            let (log_start, log_trans) = model.log_params();
            let (alpha, ll) = forward(&log_start, &log_trans, &log_emis);
            if !ll.is_finite() {
                return Err(HmmError::NonFiniteLikelihood { iteration });
            }
            report.iterations = iteration + 1;
            report.log_likelihood = ll;

            if (ll - prev_ll).abs() < config.tolerance {
                report.converged = true;
                tracing::debug!(iterations = iteration + 1, log_likelihood = ll, "EM converged");
                break;
            }
            prev_ll = ll;

            let beta = backward(&log_trans, &log_emis);
            let gamma = posteriors(&alpha, &beta, ll);
            model.start = normalise(gamma[0].clone());
            model.update_transitions(&alpha, &beta, &log_trans, &log_emis, ll);
            model.update_emissions(data, &gamma, config)?;

            if (iteration + 1) % 50 == 0 {
                tracing::debug!(iteration = iteration + 1, log_likelihood = ll, "EM progress");
            }
        }

        Ok((model, report))
    }

    fn initialise(data: &[Vec<f64>], config: &HmmConfig) -> Result<Self, HmmError> {
        let k = config.n_states;
        let centers = kmeans(data, k, config.seed);

        let uniform = vec![1.0; data.len()];
        let (_, pooled) = weighted_moments(data, &uniform, config.covariance_type, config.min_covar)
            .ok_or(HmmError::InsufficientData {
                needed: k,
                got: 0,
                n_states: k,
            })?;

        let emissions = centers
            .into_iter()
            .enumerate()
            .map(|(state, mean)| {
                GaussianEmission::new(mean, pooled.clone())
                    .ok_or(HmmError::NotPositiveDefinite { state })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            covariance_type: config.covariance_type,
            start: vec![1.0 / k as f64; k],
            transitions: vec![vec![1.0 / k as f64; k]; k],
            emissions,
        })
    }

    fn update_transitions(
        &mut self,
        alpha: &[Vec<f64>],
        beta: &[Vec<f64>],
        log_trans: &[Vec<f64>],
        log_emis: &[Vec<f64>],
        ll: f64,
    ) {
        let k = self.n_states();
        let mut counts = vec![vec![0.0; k]; k];
        for t in 0..log_emis.len().saturating_sub(1) {
            for i in 0..k {
                for j in 0..k {
                    let log_xi =
                        alpha[t][i] + log_trans[i][j] + log_emis[t + 1][j] + beta[t + 1][j] - ll;
                    counts[i][j] += log_xi.exp();
                }
            }
        }
        for (row, new) in self.transitions.iter_mut().zip(counts) {
            // A state never left keeps its previous row.
            if new.iter().sum::<f64>() > f64::EPSILON {
                *row = normalise(new);
            }
        }
    }

    fn update_emissions(
        &mut self,
        data: &[Vec<f64>],
        gamma: &[Vec<f64>],
        config: &HmmConfig,
    ) -> Result<(), HmmError> {
        for state in 0..self.n_states() {
            let weights: Vec<f64> = gamma.iter().map(|g| g[state]).collect();
            // A state with no responsibility keeps its previous emission.
            let Some((mean, cov)) =
                weighted_moments(data, &weights, config.covariance_type, config.min_covar)
            else {
                continue;
            };
            self.emissions[state] =
                GaussianEmission::new(mean, cov).ok_or(HmmError::NotPositiveDefinite { state })?;
        }
        Ok(())
    }

    pub fn n_states(&self) -> usize {
        self.start.len()
    }

    pub fn covariance_type(&self) -> CovarianceType {
        self.covariance_type
    }

    pub fn start_probabilities(&self) -> &[f64] {
        &self.start
    }

    pub fn transition_matrix(&self) -> &[Vec<f64>] {
        &self.transitions
    }

    pub fn emissions(&self) -> &[GaussianEmission] {
        &self.emissions
    }

    fn log_params(&self) -> (Vec<f64>, Vec<Vec<f64>>) {
        let log_start = self.start.iter().map(|p| p.ln()).collect();
        let log_trans = self
            .transitions
            .iter()
            .map(|row| row.iter().map(|p| p.ln()).collect())
            .collect();
        (log_start, log_trans)
    }

    /// Emission log densities `[t][state]`.
    pub fn log_emissions(&self, data: &[Vec<f64>]) -> Vec<Vec<f64>> {
        data.iter()
            .map(|x| self.emissions.iter().map(|e| e.log_pdf(x)).collect())
            .collect()
    }

    /// Total log-likelihood of `data`.
    pub fn score(&self, data: &[Vec<f64>]) -> f64 {
        let (log_start, log_trans) = self.log_params();
        forward(&log_start, &log_trans, &self.log_emissions(data)).1
    }

    /// Viterbi state path.
    pub fn decode(&self, data: &[Vec<f64>]) -> Vec<usize> {
        let (log_start, log_trans) = self.log_params();
        viterbi(&log_start, &log_trans, &self.log_emissions(data))
    }

    /// Smoothed state probabilities `[t][state]`.
    pub fn posteriors(&self, data: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let (log_start, log_trans) = self.log_params();
        let log_emis = self.log_emissions(data);
        let (alpha, ll) = forward(&log_start, &log_trans, &log_emis);
        let beta = backward(&log_trans, &log_emis);
        posteriors(&alpha, &beta, ll)
    }

    /// Long-run state occupancy implied by the transition matrix.
    ///
    /// Power iteration on the lazy chain `(I + A) / 2`, which has the same
    /// stationary distribution as `A` and converges for periodic chains too.
    pub fn stationary_distribution(&self) -> Vec<f64> {
        let k = self.transitions.len();
        let mut pi = vec![1.0 / k as f64; k];
        for _ in 0..STATIONARY_MAX_ITER {
            let next: Vec<f64> = (0..k)
                .map(|j| {
                    let flow: f64 = (0..k).map(|i| pi[i] * self.transitions[i][j]).sum();
                    0.5 * (pi[j] + flow)
                })
                .collect();
            let next = normalise(next);
            let delta: f64 = next.iter().zip(&pi).map(|(a, b)| (a - b).abs()).sum();
            pi = next;
            if delta < STATIONARY_TOL {
                break;
            }
        }
        pi
    }

    /// Most likely state for a single observation taken in isolation.
    ///
    /// The prior is the stationary distribution, not `start`: after EM the
    /// start vector is fitted to the first training bar alone and is close
    /// to one-hot, which would pin every isolated call to that state.
    pub fn classify_one(&self, x: &[f64]) -> usize {
        let scores: Vec<f64> = self
            .stationary_distribution()
            .iter()
            .zip(&self.emissions)
            .map(|(p, e)| p.ln() + e.log_pdf(x))
            .collect();
        argmax(&scores)
    }

    /// Causal forward filter over a whole sequence.
    pub fn filter(&self) -> ForwardFilter<'_> {
        let (log_start, log_trans) = self.log_params();
        ForwardFilter {
            model: self,
            log_start,
            log_trans,
            log_alpha: None,
        }
    }
}

/// Incremental forward filter: each step uses only observations seen so far.
#[derive(Debug, Clone)]
pub struct ForwardFilter<'a> {
    model: &'a GaussianHmm,
    log_start: Vec<f64>,
    log_trans: Vec<Vec<f64>>,
    log_alpha: Option<Vec<f64>>,
}

impl ForwardFilter<'_> {
    /// Advance by one observation and return the filtered most likely state.
    pub fn step(&mut self, x: &[f64]) -> usize {
        let k = self.log_start.len();
        let emis: Vec<f64> = self.model.emissions.iter().map(|e| e.log_pdf(x)).collect();
        let mut next: Vec<f64> = match &self.log_alpha {
            None => (0..k).map(|j| self.log_start[j] + emis[j]).collect(),
            Some(prev) => (0..k)
                .map(|j| {
                    let terms: Vec<f64> = (0..k).map(|i| prev[i] + self.log_trans[i][j]).collect();
                    log_sum_exp(&terms) + emis[j]
                })
                .collect(),
        };
        // Normalise so long sequences do not drift toward -inf.
        let norm = log_sum_exp(&next);
        if norm.is_finite() {
            next.iter_mut().for_each(|v| *v -= norm);
        }
        let state = argmax(&next);
        self.log_alpha = Some(next);
        state
    }
}

fn normalise(mut row: Vec<f64>) -> Vec<f64> {
    let total: f64 = row.iter().sum();
    if total > 0.0 {
        row.iter_mut().for_each(|v| *v /= total);
    }
    row
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Lloyd's k-means from `k` distinct rows sampled with a seeded RNG.
/// An empty cluster keeps its previous center.
fn kmeans(data: &[Vec<f64>], k: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut picks = sample(&mut rng, data.len(), k).into_vec();
    picks.sort_unstable();
    let mut centers: Vec<Vec<f64>> = picks.into_iter().map(|i| data[i].clone()).collect();
    let mut assignment = vec![usize::MAX; data.len()];

    for _ in 0..KMEANS_MAX_ITER {
        let mut changed = false;
        for (x, slot) in data.iter().zip(assignment.iter_mut()) {
            let distances: Vec<f64> = centers.iter().map(|c| -squared_distance(x, c)).collect();
            let nearest = argmax(&distances);
            if *slot != nearest {
                *slot = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let d = data[0].len();
        let mut sums = vec![vec![0.0; d]; k];
        let mut counts = vec![0usize; k];
        for (x, &c) in data.iter().zip(&assignment) {
            counts[c] += 1;
            for (s, v) in sums[c].iter_mut().zip(x) {
                *s += v;
            }
        }
        for ((center, sum), count) in centers.iter_mut().zip(sums).zip(counts) {
            if count > 0 {
                *center = sum.into_iter().map(|s| s / count as f64).collect();
            }
        }
    }
    centers
}

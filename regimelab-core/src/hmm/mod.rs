//! Gaussian hidden Markov model.
//!
//! - `gaussian`: emission densities (diagonal or full covariance)
//! - `algorithms`: log-space forward/backward/Viterbi
//! - `model`: parameters, Baum–Welch fitting and inference entry points

pub mod algorithms;
pub mod gaussian;
pub mod model;

pub use gaussian::{CovarianceType, GaussianEmission};
pub use model::{FitReport, ForwardFilter, GaussianHmm, HmmConfig, HmmError, DEFAULT_MIN_COVAR};

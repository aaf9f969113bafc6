//! Multivariate Gaussian emission density.
//!
//! Covariances are held as a dense row-major `d × d` matrix together with
//! their lower Cholesky factor. A diagonal covariance is the special case
//! with a diagonal factor, so both kinds share one density path.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Shape of the per-state covariance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CovarianceType {
    #[default]
    Diagonal,
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaussianEmission {
    mean: Vec<f64>,
    covariance: Vec<f64>,
    #[serde(skip)]
    factor: Vec<f64>,
    #[serde(skip)]
    log_det: f64,
}

impl GaussianEmission {
    /// Build from a mean and a row-major covariance.
    ///
    /// Returns `None` when the covariance is not positive definite.
    pub fn new(mean: Vec<f64>, covariance: Vec<f64>) -> Option<Self> {
        let d = mean.len();
        if covariance.len() != d * d {
            return None;
        }
        let factor = cholesky(&covariance, d)?;
        let log_det = 2.0 * (0..d).map(|i| factor[i * d + i].ln()).sum::<f64>();
        Some(Self {
            mean,
            covariance,
            factor,
            log_det,
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Row-major covariance matrix.
    pub fn covariance(&self) -> &[f64] {
        &self.covariance
    }

    /// Diagonal of the covariance matrix.
    pub fn variances(&self) -> Vec<f64> {
        let d = self.dim();
        (0..d).map(|i| self.covariance[i * d + i]).collect()
    }

    /// Log probability density at `x`.
    pub fn log_pdf(&self, x: &[f64]) -> f64 {
        let d = self.dim();
        // Solve L z = (x - mean) by forward substitution; mahalanobis = |z|^2.
        let mut z = vec![0.0; d];
        for i in 0..d {
            let mut acc = x[i] - self.mean[i];
            for k in 0..i {
                acc -= self.factor[i * d + k] * z[k];
            }
            z[i] = acc / self.factor[i * d + i];
        }
        let mahalanobis: f64 = z.iter().map(|v| v * v).sum();
        -0.5 * (d as f64 * (2.0 * PI).ln() + self.log_det + mahalanobis)
    }
}

/// Lower Cholesky factor of a symmetric row-major matrix, or `None` when it
/// is not positive definite.
pub fn cholesky(matrix: &[f64], d: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0; d * d];
    for i in 0..d {
        for j in 0..=i {
            let mut sum = matrix[i * d + j];
            for k in 0..j {
                sum -= l[i * d + k] * l[j * d + k];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i * d + i] = sum.sqrt();
            } else {
                l[i * d + j] = sum / l[j * d + j];
            }
        }
    }
    Some(l)
}

/// Weighted mean and covariance of `data`, with `min_covar` added to every
/// variance. Off-diagonal terms are zeroed for [`CovarianceType::Diagonal`].
///
/// Returns `None` when the weights sum to (effectively) zero.
pub fn weighted_moments(
    data: &[Vec<f64>],
    weights: &[f64],
    covariance_type: CovarianceType,
    min_covar: f64,
) -> Option<(Vec<f64>, Vec<f64>)> {
    let d = data.first()?.len();
    let total: f64 = weights.iter().sum();
    if total <= f64::EPSILON || !total.is_finite() {
        return None;
    }

    let mut mean = vec![0.0; d];
    for (x, &w) in data.iter().zip(weights) {
        for (m, v) in mean.iter_mut().zip(x) {
            *m += w * v;
        }
    }
    mean.iter_mut().for_each(|m| *m /= total);

    let mut cov = vec![0.0; d * d];
    for (x, &w) in data.iter().zip(weights) {
        for i in 0..d {
            let di = x[i] - mean[i];
            for j in 0..d {
                if covariance_type == CovarianceType::Diagonal && i != j {
                    continue;
                }
                cov[i * d + j] += w * di * (x[j] - mean[j]);
            }
        }
    }
    cov.iter_mut().for_each(|c| *c /= total);
    for i in 0..d {
        cov[i * d + i] += min_covar;
    }
    Some((mean, cov))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_normal_density() {
        let g = GaussianEmission::new(vec![0.0], vec![1.0]).unwrap();
        let expected = -0.5 * (2.0 * PI).ln();
        assert!((g.log_pdf(&[0.0]) - expected).abs() < 1e-12);
        assert!((g.log_pdf(&[1.0]) - (expected - 0.5)).abs() < 1e-12);
    }

    #[test]
    fn full_matches_diagonal_when_uncorrelated() {
        let full = GaussianEmission::new(vec![1.0, -1.0], vec![2.0, 0.0, 0.0, 0.5]).unwrap();
        let x = [0.3, 0.2];
        let expected = -0.5 * (2.0 * (2.0 * PI).ln() + (2.0f64 * 0.5).ln())
            - 0.5 * ((0.3f64 - 1.0).powi(2) / 2.0 + (0.2f64 + 1.0).powi(2) / 0.5);
        assert!((full.log_pdf(&x) - expected).abs() < 1e-12);
    }

    #[test]
    fn correlated_covariance_density() {
        // cov = [[1, 0.5], [0.5, 1]], det = 0.75, inverse = [[4/3, -2/3], [-2/3, 4/3]]
        let g = GaussianEmission::new(vec![0.0, 0.0], vec![1.0, 0.5, 0.5, 1.0]).unwrap();
        let x = [1.0, 1.0];
        let maha = 4.0 / 3.0 * 2.0 - 2.0 * 2.0 / 3.0;
        let expected = -0.5 * (2.0 * (2.0 * PI).ln() + 0.75f64.ln() + maha);
        assert!((g.log_pdf(&x) - expected).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_positive_definite() {
        assert!(GaussianEmission::new(vec![0.0, 0.0], vec![1.0, 2.0, 2.0, 1.0]).is_none());
        assert!(GaussianEmission::new(vec![0.0], vec![0.0]).is_none());
    }

    #[test]
    fn weighted_moments_diagonal() {
        let data = vec![vec![0.0, 0.0], vec![2.0, 4.0]];
        let (mean, cov) =
            weighted_moments(&data, &[1.0, 1.0], CovarianceType::Diagonal, 0.0).unwrap();
        assert_eq!(mean, vec![1.0, 2.0]);
        assert_eq!(cov, vec![1.0, 0.0, 0.0, 4.0]);
    }

    #[test]
    fn weighted_moments_full_with_floor() {
        let data = vec![vec![0.0, 0.0], vec![2.0, 4.0]];
        let (_, cov) = weighted_moments(&data, &[1.0, 1.0], CovarianceType::Full, 1e-3).unwrap();
        for (got, want) in cov.iter().zip([1.001, 2.0, 2.0, 4.001]) {
            assert!((got - want).abs() < 1e-12, "{got} != {want}");
        }
    }

    #[test]
    fn zero_weight_has_no_moments() {
        let data = vec![vec![1.0]];
        assert!(weighted_moments(&data, &[0.0], CovarianceType::Diagonal, 1e-3).is_none());
    }
}

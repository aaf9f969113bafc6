//! Log-space forward, backward and Viterbi recursions.
//!
//! All inputs are log probabilities: `log_start[k]`, `log_trans[i][j]`, and
//! per-observation emission log densities `log_emis[t][k]`.

/// `ln(sum(exp(values)))`, `-inf` for an empty or all `-inf` slice.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Index of the largest value; ties resolve to the lowest index.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Forward pass. Returns `alpha[t][k] = ln P(x_0..=x_t, s_t = k)` and the
/// total log-likelihood.
pub fn forward(
    log_start: &[f64],
    log_trans: &[Vec<f64>],
    log_emis: &[Vec<f64>],
) -> (Vec<Vec<f64>>, f64) {
    let k = log_start.len();
    let mut alpha: Vec<Vec<f64>> = Vec::with_capacity(log_emis.len());
    let mut scratch = vec![0.0; k];

    for (t, emis) in log_emis.iter().enumerate() {
        let row: Vec<f64> = if t == 0 {
            (0..k).map(|j| log_start[j] + emis[j]).collect()
        } else {
            let prev = &alpha[t - 1];
            (0..k)
                .map(|j| {
                    for i in 0..k {
                        scratch[i] = prev[i] + log_trans[i][j];
                    }
                    log_sum_exp(&scratch) + emis[j]
                })
                .collect()
        };
        alpha.push(row);
    }

    let log_likelihood = alpha
        .last()
        .map(|last| log_sum_exp(last))
        .unwrap_or(f64::NEG_INFINITY);
    (alpha, log_likelihood)
}

/// Backward pass: `beta[t][k] = ln P(x_{t+1}.. | s_t = k)`.
pub fn backward(log_trans: &[Vec<f64>], log_emis: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = log_emis.len();
    let k = log_trans.len();
    let mut beta = vec![vec![0.0; k]; n];
    let mut scratch = vec![0.0; k];

    for t in (0..n.saturating_sub(1)).rev() {
        for i in 0..k {
            for j in 0..k {
                scratch[j] = log_trans[i][j] + log_emis[t + 1][j] + beta[t + 1][j];
            }
            beta[t][i] = log_sum_exp(&scratch);
        }
    }
    beta
}

/// State posteriors `gamma[t][k] = P(s_t = k | x)` from forward and backward
/// passes.
pub fn posteriors(alpha: &[Vec<f64>], beta: &[Vec<f64>], log_likelihood: f64) -> Vec<Vec<f64>> {
    alpha
        .iter()
        .zip(beta)
        .map(|(a, b)| {
            a.iter()
                .zip(b)
                .map(|(x, y)| (x + y - log_likelihood).exp())
                .collect()
        })
        .collect()
}

/// Most likely state path. Ties resolve to the lowest state id, both in
/// the back-pointers and in the final state.
pub fn viterbi(log_start: &[f64], log_trans: &[Vec<f64>], log_emis: &[Vec<f64>]) -> Vec<usize> {
    let n = log_emis.len();
    if n == 0 {
        return Vec::new();
    }
    let k = log_start.len();

    let mut delta: Vec<f64> = (0..k).map(|j| log_start[j] + log_emis[0][j]).collect();
    let mut backptr = vec![vec![0usize; k]; n];
    let mut scratch = vec![0.0; k];

    for t in 1..n {
        let mut next = vec![0.0; k];
        for j in 0..k {
            for i in 0..k {
                scratch[i] = delta[i] + log_trans[i][j];
            }
            let best = argmax(&scratch);
            backptr[t][j] = best;
            next[j] = scratch[best] + log_emis[t][j];
        }
        delta = next;
    }

    let mut path = vec![0usize; n];
    path[n - 1] = argmax(&delta);
    for t in (1..n).rev() {
        path[t - 1] = backptr[t][path[t]];
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ln(m: &[&[f64]]) -> Vec<Vec<f64>> {
        m.iter().map(|r| r.iter().map(|v| v.ln()).collect()).collect()
    }

    #[test]
    fn log_sum_exp_handles_neg_infinity() {
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY, f64::NEG_INFINITY]), f64::NEG_INFINITY);
        assert!((log_sum_exp(&[0.0, 0.0]) - 2f64.ln()).abs() < 1e-12);
        assert!((log_sum_exp(&[1000.0, 1000.0]) - (1000.0 + 2f64.ln())).abs() < 1e-9);
    }

    #[test]
    fn argmax_prefers_lowest_on_tie() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0]), 1);
        assert_eq!(argmax(&[2.0, 2.0]), 0);
    }

    #[test]
    fn forward_matches_brute_force() {
        // Two states, two observations; enumerate all 4 paths.
        let start = [0.6, 0.4];
        let trans = [[0.7, 0.3], [0.4, 0.6]];
        let emis = [[0.5, 0.1], [0.4, 0.3]];
        let mut total = 0.0;
        for s0 in 0..2 {
            for s1 in 0..2 {
                total += start[s0] * emis[0][s0] * trans[s0][s1] * emis[1][s1];
            }
        }
        let (_, ll) = forward(
            &start.map(f64::ln),
            &ln(&[&trans[0], &trans[1]]),
            &ln(&[&emis[0], &emis[1]]),
        );
        assert!((ll - total.ln()).abs() < 1e-12);
    }

    #[test]
    fn posteriors_sum_to_one() {
        let log_start = vec![0.5f64.ln(), 0.5f64.ln()];
        let log_trans = ln(&[&[0.9, 0.1], &[0.2, 0.8]]);
        let log_emis = ln(&[&[0.8, 0.1], &[0.7, 0.2], &[0.1, 0.9]]);
        let (alpha, ll) = forward(&log_start, &log_trans, &log_emis);
        let beta = backward(&log_trans, &log_emis);
        for row in posteriors(&alpha, &beta, ll) {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn viterbi_follows_strong_emissions() {
        let log_start = vec![0.5f64.ln(), 0.5f64.ln()];
        let log_trans = ln(&[&[0.8, 0.2], &[0.2, 0.8]]);
        let log_emis = ln(&[&[0.9, 0.1], &[0.9, 0.1], &[0.1, 0.9], &[0.1, 0.9]]);
        assert_eq!(viterbi(&log_start, &log_trans, &log_emis), vec![0, 0, 1, 1]);
    }

    #[test]
    fn viterbi_tie_picks_lowest_state() {
        let log_start = vec![0.5f64.ln(), 0.5f64.ln()];
        let log_trans = ln(&[&[0.5, 0.5], &[0.5, 0.5]]);
        let log_emis = ln(&[&[0.5, 0.5], &[0.5, 0.5]]);
        assert_eq!(viterbi(&log_start, &log_trans, &log_emis), vec![0, 0]);
    }

    #[test]
    fn empty_sequence() {
        assert!(viterbi(&[0.0], &[vec![0.0]], &[]).is_empty());
        let (alpha, ll) = forward(&[0.0], &[vec![0.0]], &[]);
        assert!(alpha.is_empty());
        assert_eq!(ll, f64::NEG_INFINITY);
    }
}

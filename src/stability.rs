// Stability bound on the subspace dimension for a pair of domains

use crate::error::{AdaptError, Result};
use log::debug;
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Parameters of the eigenvalue-gap stability bound.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StabilityConfig {
    /// Scale parameter; larger values shrink the right-hand side of the bound.
    pub gamma: f64,
    /// Confidence parameter in (0, 1).
    pub delta: f64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        StabilityConfig {
            gamma: 1e5,
            delta: 0.1,
        }
    }
}

impl StabilityConfig {
    fn validate(&self) -> Result<()> {
        if !(self.gamma.is_finite() && self.gamma > 0.0) {
            return Err(AdaptError::InvalidParameter(format!(
                "stability gamma must be positive and finite, got {}",
                self.gamma
            )));
        }
        if !(self.delta > 0.0 && self.delta < 1.0) {
            return Err(AdaptError::InvalidParameter(format!(
                "stability delta must lie in (0, 1), got {}",
                self.delta
            )));
        }
        Ok(())
    }
}

/// Right-hand side of the stability condition for candidate index `d`:
///
/// `(1 + sqrt(ln(2/delta) / 2)) * 16 * d^1.5 * beta / (gamma * sqrt(n_min))`
pub fn stability_threshold(d: usize, beta: f64, n_min: usize, config: &StabilityConfig) -> f64 {
    let confidence = 1.0 + ((2.0 / config.delta).ln() / 2.0).sqrt();
    let numerator = 16.0 * (d as f64).powf(1.5) * beta;
    confidence * numerator / (config.gamma * (n_min as f64).sqrt())
}

/// Largest subspace dimension whose eigenvalue gap clears the stability bound.
///
/// The two singular-value sequences are truncated to the shorter length and
/// combined by element-wise minimum. Every index `d` in `0..len-1` is tested
/// with `eig[d] - eig[d+1] >= stability_threshold(d)`, recording `d + 1` on
/// success. All candidates are scanned; the largest recorded value wins even
/// when smaller indices fail. When nothing qualifies the full truncated
/// length is returned.
///
/// # Errors
/// `EmptyInput` if either sequence is empty, `InvalidParameter` for a
/// non-positive `gamma`, `delta` outside (0, 1), a negative or non-finite
/// `beta`, or `n_min == 0`.
pub fn stability_max_dimension(
    source_singular_values: ArrayView1<f64>,
    target_singular_values: ArrayView1<f64>,
    beta: f64,
    n_min: usize,
    config: &StabilityConfig,
) -> Result<usize> {
    config.validate()?;
    if source_singular_values.is_empty() || target_singular_values.is_empty() {
        return Err(AdaptError::EmptyInput("singular value sequence is empty"));
    }
    if !(beta.is_finite() && beta >= 0.0) {
        return Err(AdaptError::InvalidParameter(format!(
            "beta must be non-negative and finite, got {}",
            beta
        )));
    }
    if n_min == 0 {
        return Err(AdaptError::InvalidParameter(
            "sample-size floor n_min must be positive".to_string(),
        ));
    }

    let len = source_singular_values.len().min(target_singular_values.len());
    let eig: Vec<f64> = (0..len)
        .map(|i| source_singular_values[i].min(target_singular_values[i]))
        .collect();

    let mut d_max: Option<usize> = None;
    for d in 0..len.saturating_sub(1) {
        let gap = eig[d] - eig[d + 1];
        let rhs = stability_threshold(d, beta, n_min, config);
        if gap >= rhs {
            d_max = Some(d + 1);
        }
    }

    let chosen = d_max.unwrap_or(len);
    debug!(
        "Stability bound over {} eigenvalues (beta={:.4}, n_min={}, gamma={}, delta={}): d_max={}{}",
        len,
        beta,
        n_min,
        config.gamma,
        config.delta,
        chosen,
        if d_max.is_none() { " (no stable gap, using full length)" } else { "" }
    );
    Ok(chosen)
}

/// Largest absolute entry across both domains.
pub fn pooled_max_abs(source: ArrayView2<f64>, target: ArrayView2<f64>) -> f64 {
    source
        .iter()
        .chain(target.iter())
        .fold(0.0_f64, |acc, &v| acc.max(v.abs()))
}

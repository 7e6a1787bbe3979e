// Entropic-regularized optimal transport via Sinkhorn-Knopp matrix scaling

use crate::error::{AdaptError, Result};
use float_cmp::approx_eq;
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// What to do when the plain scaling iteration underflows.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stabilization {
    /// Fail with `NumericalInstability`.
    Disabled,
    /// Restart in the log domain, where `exp(-M/reg)` is never formed.
    LogDomainFallback,
}

/// Iteration controls for the Sinkhorn solver.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SinkhornConfig {
    /// Iteration cap. One iteration updates both `u` and `v`.
    pub max_iter: usize,
    /// Stop once the largest marginal deviation falls below this.
    pub tolerance: f64,
    pub stabilization: Stabilization,
    /// Treat a result that hit `max_iter` as an error rather than a best
    /// estimate.
    pub require_convergence: bool,
}

impl Default for SinkhornConfig {
    fn default() -> Self {
        SinkhornConfig {
            max_iter: 1000,
            tolerance: 1e-9,
            stabilization: Stabilization::LogDomainFallback,
            require_convergence: false,
        }
    }
}

/// Coupling matrix plus convergence diagnostics.
#[derive(Debug, Clone)]
pub struct SinkhornOutput {
    /// Shape: (n_source, n_target). Rows sum to `a`, columns to `b`.
    pub coupling: Array2<f64>,
    pub converged: bool,
    pub iterations: usize,
    /// Largest absolute deviation of a row or column sum from its marginal.
    pub marginal_error: f64,
    /// Whether the log-domain iteration produced this result.
    pub log_domain: bool,
}

impl SinkhornOutput {
    /// Returns the coupling, or `NumericalInstability` if the iteration cap
    /// was reached first.
    pub fn into_converged(self) -> Result<Array2<f64>> {
        if !self.converged {
            return Err(non_convergence(self.iterations, self.marginal_error));
        }
        Ok(self.coupling)
    }
}

fn non_convergence(iterations: usize, marginal_error: f64) -> AdaptError {
    AdaptError::NumericalInstability(format!(
        "Sinkhorn did not converge in {} iterations (marginal error {:.3e})",
        iterations, marginal_error
    ))
}

/// Marginals must sum to one within this tolerance.
const MARGINAL_SUM_TOLERANCE: f64 = 1e-6;

/// Computes the entropic OT coupling between marginals `a` and `b` under cost
/// `cost` with regularization `reg`.
///
/// Scaling vectors start uniform and alternate `u = a / (K v)`,
/// `v = b / (Kᵀ u)` with `K = exp(-cost / reg)`. The loop stops when both
/// row and column sums are within `config.tolerance` of their marginals or
/// after `config.max_iter` iterations; the result records which happened.
///
/// If a scaling denominator underflows to zero while its marginal entry is
/// positive, the solver either switches to the log-domain iteration or
/// fails, per `config.stabilization`. A coupling with non-finite entries is
/// never returned.
pub fn sinkhorn_knopp(
    a: ArrayView1<f64>,
    b: ArrayView1<f64>,
    cost: ArrayView2<f64>,
    reg: f64,
    config: &SinkhornConfig,
) -> Result<SinkhornOutput> {
    validate_problem(a, b, cost, reg, config)?;
    let (n_s, n_t) = cost.dim();

    let kernel = cost.mapv(|c| (-c / reg).exp());
    let mut u = Array1::<f64>::from_elem(n_s, 1.0 / n_s as f64);
    let mut v = Array1::<f64>::from_elem(n_t, 1.0 / n_t as f64);

    let mut iterations = 0;
    let mut marginal_error = f64::INFINITY;
    let mut converged = false;

    while iterations < config.max_iter {
        iterations += 1;

        let kv = kernel.dot(&v);
        match scale_marginal(a, kv.view()) {
            Some(next) => u = next,
            None => return underflow(a, b, cost, reg, config, iterations),
        }
        let ktu = kernel.t().dot(&u);
        match scale_marginal(b, ktu.view()) {
            Some(next) => v = next,
            None => return underflow(a, b, cost, reg, config, iterations),
        }

        // After the v update the column sums match b up to rounding; the
        // row sums carry the remaining error.
        let row_sums = &u * &kernel.dot(&v);
        let col_sums = &v * &kernel.t().dot(&u);
        marginal_error = max_deviation(row_sums.view(), a).max(max_deviation(col_sums.view(), b));
        if marginal_error < config.tolerance {
            converged = true;
            break;
        }
    }

    // gamma = diag(u) K diag(v)
    let coupling = (&kernel * &u.view().insert_axis(Axis(1))) * &v;
    finish(coupling, converged, iterations, marginal_error, false, config)
}

/// Log-domain Sinkhorn. Works on dual potentials `f`, `g` with
/// `gamma_ij = exp((f_i + g_j - M_ij) / reg)`, using log-sum-exp updates so
/// that small `reg` cannot underflow the kernel.
pub fn sinkhorn_log_domain(
    a: ArrayView1<f64>,
    b: ArrayView1<f64>,
    cost: ArrayView2<f64>,
    reg: f64,
    config: &SinkhornConfig,
) -> Result<SinkhornOutput> {
    validate_problem(a, b, cost, reg, config)?;
    let (n_s, n_t) = cost.dim();

    let log_a = a.mapv(f64::ln);
    let log_b = b.mapv(f64::ln);
    let mut f = Array1::<f64>::zeros(n_s);
    let mut g = Array1::<f64>::zeros(n_t);

    let mut iterations = 0;
    let mut marginal_error = f64::INFINITY;
    let mut converged = false;

    while iterations < config.max_iter {
        iterations += 1;

        for i in 0..n_s {
            let lse = log_sum_exp(cost.row(i).iter().zip(g.iter()).map(|(&m, &g_j)| (g_j - m) / reg));
            f[i] = reg * (log_a[i] - lse);
        }
        for j in 0..n_t {
            let lse = log_sum_exp(cost.column(j).iter().zip(f.iter()).map(|(&m, &f_i)| (f_i - m) / reg));
            g[j] = reg * (log_b[j] - lse);
        }

        let coupling = log_domain_coupling(&f, &g, cost, reg);
        marginal_error = marginal_error_of(&coupling, a, b);
        if marginal_error < config.tolerance {
            converged = true;
            break;
        }
    }

    let coupling = log_domain_coupling(&f, &g, cost, reg);
    finish(coupling, converged, iterations, marginal_error, true, config)
}

/// Largest absolute deviation of the row and column sums of `coupling` from
/// `a` and `b`.
pub fn marginal_error_of(coupling: &Array2<f64>, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let rows = coupling.sum_axis(Axis(1));
    let cols = coupling.sum_axis(Axis(0));
    max_deviation(rows.view(), a).max(max_deviation(cols.view(), b))
}

fn underflow(
    a: ArrayView1<f64>,
    b: ArrayView1<f64>,
    cost: ArrayView2<f64>,
    reg: f64,
    config: &SinkhornConfig,
    iteration: usize,
) -> Result<SinkhornOutput> {
    match config.stabilization {
        Stabilization::LogDomainFallback => {
            warn!(
                "Sinkhorn kernel underflow at iteration {} (reg={}); switching to log-domain iteration.",
                iteration, reg
            );
            sinkhorn_log_domain(a, b, cost, reg, config)
        }
        Stabilization::Disabled => Err(AdaptError::NumericalInstability(format!(
            "Sinkhorn scaling denominator underflowed at iteration {} (reg={})",
            iteration, reg
        ))),
    }
}

/// `marginal / denominator` elementwise. Zero marginal entries give zero
/// regardless of the denominator; `None` signals underflow.
fn scale_marginal(marginal: ArrayView1<f64>, denominator: ArrayView1<f64>) -> Option<Array1<f64>> {
    let mut out = Array1::<f64>::zeros(marginal.len());
    for ((o, &m), &d) in out.iter_mut().zip(marginal.iter()).zip(denominator.iter()) {
        if m == 0.0 {
            continue;
        }
        if !(d > 0.0) || !d.is_finite() {
            return None;
        }
        let scaled = m / d;
        if !scaled.is_finite() {
            return None;
        }
        *o = scaled;
    }
    Some(out)
}

fn log_sum_exp<I: Iterator<Item = f64> + Clone>(values: I) -> f64 {
    let max = values.clone().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + values.map(|x| (x - max).exp()).sum::<f64>().ln()
}

fn log_domain_coupling(
    f: &Array1<f64>,
    g: &Array1<f64>,
    cost: ArrayView2<f64>,
    reg: f64,
) -> Array2<f64> {
    Array2::from_shape_fn(cost.dim(), |(i, j)| {
        let exponent = (f[i] + g[j] - cost[[i, j]]) / reg;
        if exponent == f64::NEG_INFINITY || exponent.is_nan() {
            0.0
        } else {
            exponent.exp()
        }
    })
}

fn max_deviation(sums: ArrayView1<f64>, marginal: ArrayView1<f64>) -> f64 {
    sums.iter()
        .zip(marginal.iter())
        .fold(0.0_f64, |acc, (s, m)| acc.max((s - m).abs()))
}

fn finish(
    coupling: Array2<f64>,
    converged: bool,
    iterations: usize,
    marginal_error: f64,
    log_domain: bool,
    config: &SinkhornConfig,
) -> Result<SinkhornOutput> {
    if coupling.iter().any(|g| !g.is_finite()) {
        return Err(AdaptError::NumericalInstability(
            "Sinkhorn coupling contains non-finite entries".to_string(),
        ));
    }
    if converged {
        debug!(
            "Sinkhorn converged after {} iterations (marginal error {:.3e}, log domain: {}).",
            iterations, marginal_error, log_domain
        );
    } else {
        warn!(
            "Sinkhorn stopped at the iteration cap {} with marginal error {:.3e}.",
            iterations, marginal_error
        );
    }
    if config.require_convergence && !converged {
        return Err(non_convergence(iterations, marginal_error));
    }
    Ok(SinkhornOutput {
        coupling,
        converged,
        iterations,
        marginal_error,
        log_domain,
    })
}

fn validate_problem(
    a: ArrayView1<f64>,
    b: ArrayView1<f64>,
    cost: ArrayView2<f64>,
    reg: f64,
    config: &SinkhornConfig,
) -> Result<()> {
    let (n_s, n_t) = cost.dim();
    if n_s == 0 || n_t == 0 {
        return Err(AdaptError::EmptyInput("cost matrix has no rows or no columns"));
    }
    if a.len() != n_s {
        return Err(AdaptError::DimensionMismatch {
            context: "source marginal length vs cost rows",
            expected: n_s,
            found: a.len(),
        });
    }
    if b.len() != n_t {
        return Err(AdaptError::DimensionMismatch {
            context: "target marginal length vs cost columns",
            expected: n_t,
            found: b.len(),
        });
    }
    if !(reg.is_finite() && reg > 0.0) {
        return Err(AdaptError::InvalidParameter(format!(
            "regularization must be positive and finite, got {}",
            reg
        )));
    }
    if config.max_iter == 0 {
        return Err(AdaptError::InvalidParameter(
            "Sinkhorn max_iter must be positive".to_string(),
        ));
    }
    validate_marginal("source", a)?;
    validate_marginal("target", b)?;
    if cost.iter().any(|&c| !c.is_finite() || c < 0.0) {
        return Err(AdaptError::InvalidParameter(
            "cost matrix has negative or non-finite entries".to_string(),
        ));
    }
    Ok(())
}

fn validate_marginal(name: &str, marginal: ArrayView1<f64>) -> Result<()> {
    if marginal.iter().any(|&p| !p.is_finite() || p < 0.0) {
        return Err(AdaptError::InvalidParameter(format!(
            "{} marginal has negative or non-finite entries",
            name
        )));
    }
    let total = marginal.sum();
    if !approx_eq!(f64, total, 1.0, epsilon = MARGINAL_SUM_TOLERANCE) {
        return Err(AdaptError::InvalidParameter(format!(
            "{} marginal sums to {} instead of 1",
            name, total
        )));
    }
    Ok(())
}

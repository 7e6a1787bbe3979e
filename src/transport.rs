// Optimal transport of source points onto the target domain

use crate::error::{AdaptError, Result};
use crate::knn::{accuracy, check_labels, OneNearestNeighbor};
use crate::sinkhorn::{sinkhorn_knopp, SinkhornConfig};
use log::{info, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// How the coupling turns source rows into target-space points.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportMapping {
    /// `S_a = gamma · T`. Rows keep the `1/n_s` scale of the coupling.
    Raw,
    /// `S_a = diag(1 / gamma·1) · gamma · T`, the barycentric projection.
    Barycentric,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TransportConfig {
    pub sinkhorn: SinkhornConfig,
    pub mapping: TransportMapping,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            sinkhorn: SinkhornConfig::default(),
            mapping: TransportMapping::Raw,
        }
    }
}

/// Transported source features and the solver diagnostics behind them.
#[derive(Debug, Clone)]
pub struct TransportPlan {
    /// Shape: (n_source, n_features)
    pub transported_source: Array2<f64>,
    /// Shape: (n_source, n_target)
    pub coupling: Array2<f64>,
    pub converged: bool,
    pub iterations: usize,
    pub log_domain: bool,
}

/// Result of the transport evaluation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct TransportEvaluation {
    pub accuracy: f64,
    pub converged: bool,
    pub iterations: usize,
}

/// Pairwise Euclidean distances between rows of `x` and rows of `y`.
///
/// Uses `|x|² + |y|² - 2 x·y` with negative round-off clamped to zero.
pub fn pairwise_euclidean(x: ArrayView2<f64>, y: ArrayView2<f64>) -> Result<Array2<f64>> {
    if x.ncols() != y.ncols() {
        return Err(AdaptError::DimensionMismatch {
            context: "feature columns for pairwise distances",
            expected: x.ncols(),
            found: y.ncols(),
        });
    }
    let x_sq: Array1<f64> = x.map_axis(Axis(1), |row| row.dot(&row));
    let y_sq: Array1<f64> = y.map_axis(Axis(1), |row| row.dot(&row));
    let mut distances = x.dot(&y.t());
    distances.mapv_inplace(|v| -2.0 * v);
    distances += &x_sq.insert_axis(Axis(1));
    distances += &y_sq;
    distances.mapv_inplace(|v| v.max(0.0).sqrt());
    Ok(distances)
}

/// Pairwise Euclidean cost scaled by its largest entry into `[0, 1]`. An
/// all-zero cost matrix is returned as is.
pub fn normalized_cost(source: ArrayView2<f64>, target: ArrayView2<f64>) -> Result<Array2<f64>> {
    let mut cost = pairwise_euclidean(source, target)?;
    let max = cost.iter().fold(0.0_f64, |acc, &c| acc.max(c));
    if max > 0.0 {
        cost /= max;
    }
    Ok(cost)
}

/// Uniform probability vector of length `n`.
pub fn uniform_marginal(n: usize) -> Array1<f64> {
    Array1::from_elem(n, 1.0 / n as f64)
}

/// Solves entropic OT between the uniform empirical measures on `source` and
/// `target` rows and maps the source rows into target space.
pub fn transport_source(
    source: ArrayView2<f64>,
    target: ArrayView2<f64>,
    reg: f64,
    config: &TransportConfig,
) -> Result<TransportPlan> {
    check_domains(source, target)?;
    let a = uniform_marginal(source.nrows());
    let b = uniform_marginal(target.nrows());
    let cost = normalized_cost(source, target)?;

    let solved = sinkhorn_knopp(a.view(), b.view(), cost.view(), reg, &config.sinkhorn)?;
    if !solved.converged {
        warn!(
            "Transport with reg={} uses an unconverged coupling (marginal error {:.3e}).",
            reg, solved.marginal_error
        );
    }

    let mut transported_source = solved.coupling.dot(&target);
    if config.mapping == TransportMapping::Barycentric {
        let mass = solved.coupling.sum_axis(Axis(1));
        for (mut row, &m) in transported_source.axis_iter_mut(Axis(0)).zip(mass.iter()) {
            if m > 0.0 {
                row.mapv_inplace(|v| v / m);
            }
        }
    }

    Ok(TransportPlan {
        transported_source,
        coupling: solved.coupling,
        converged: solved.converged,
        iterations: solved.iterations,
        log_domain: solved.log_domain,
    })
}

/// Transports the source onto the target with regularization `reg`, fits
/// 1-NN on the transported source, and scores predictions for the target.
///
/// Target labels are used only for the final score.
pub fn ot_transport_accuracy(
    source: ArrayView2<f64>,
    target: ArrayView2<f64>,
    source_labels: ArrayView1<usize>,
    target_labels: ArrayView1<usize>,
    reg: f64,
    config: &TransportConfig,
) -> Result<TransportEvaluation> {
    check_labels("source labels", source.nrows(), source_labels.len())?;
    check_labels("target labels", target.nrows(), target_labels.len())?;
    let plan = transport_source(source, target, reg, config)?;

    let model = OneNearestNeighbor::fit(plan.transported_source.view(), source_labels)?;
    let predicted = model.predict(target)?;
    let accuracy = accuracy(predicted.view(), target_labels)?;
    info!(
        "OT transport accuracy with reg={}: {:.4} ({} Sinkhorn iterations{})",
        reg,
        accuracy,
        plan.iterations,
        if plan.log_domain { ", log domain" } else { "" }
    );
    Ok(TransportEvaluation {
        accuracy,
        converged: plan.converged,
        iterations: plan.iterations,
    })
}

pub(crate) fn check_domains(source: ArrayView2<f64>, target: ArrayView2<f64>) -> Result<()> {
    if source.nrows() == 0 {
        return Err(AdaptError::EmptyInput("source matrix has zero rows"));
    }
    if target.nrows() == 0 {
        return Err(AdaptError::EmptyInput("target matrix has zero rows"));
    }
    if source.ncols() != target.ncols() {
        return Err(AdaptError::DimensionMismatch {
            context: "target feature columns",
            expected: source.ncols(),
            found: target.ncols(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn distances_match_direct_computation() {
        let x = array![[0.0, 0.0], [3.0, 4.0]];
        let y = array![[0.0, 0.0], [6.0, 8.0], [3.0, 0.0]];
        let d = pairwise_euclidean(x.view(), y.view()).unwrap();
        let expected = array![[0.0, 10.0, 3.0], [5.0, 5.0, 4.0]];
        for (a, b) in d.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn normalized_cost_lies_in_unit_interval() {
        let x = array![[0.0, 0.0], [3.0, 4.0]];
        let y = array![[6.0, 8.0], [1.0, 1.0]];
        let cost = normalized_cost(x.view(), y.view()).unwrap();
        assert_abs_diff_eq!(cost[[0, 0]], 1.0, epsilon = 1e-12);
        assert!(cost.iter().all(|&c| (0.0..=1.0).contains(&c)));
    }

    #[test]
    fn identical_point_sets_keep_zero_cost() {
        let x = array![[1.0, 1.0], [1.0, 1.0]];
        let cost = normalized_cost(x.view(), x.view()).unwrap();
        assert!(cost.iter().all(|&c| c == 0.0));
    }

    #[test]
    fn raw_mapping_keeps_coupling_scale() {
        let s = array![[0.0], [1.0]];
        let t = array![[0.0], [1.0]];
        let raw = transport_source(s.view(), t.view(), 0.01, &TransportConfig::default()).unwrap();
        let bary = transport_source(
            s.view(),
            t.view(),
            0.01,
            &TransportConfig {
                mapping: TransportMapping::Barycentric,
                ..TransportConfig::default()
            },
        )
        .unwrap();
        // Nearly a permutation: row 1 goes to t[1] with mass 1/2.
        assert_abs_diff_eq!(raw.transported_source[[1, 0]], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(bary.transported_source[[1, 0]], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(bary.transported_source[[0, 0]], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn mismatched_domains_are_rejected() {
        let s = array![[0.0, 1.0]];
        let t = array![[0.0, 1.0, 2.0]];
        assert!(matches!(
            transport_source(s.view(), t.view(), 0.1, &TransportConfig::default()),
            Err(AdaptError::DimensionMismatch { .. })
        ));
        let empty = Array2::<f64>::zeros((0, 2));
        assert!(matches!(
            transport_source(empty.view(), s.view(), 0.1, &TransportConfig::default()),
            Err(AdaptError::EmptyInput(_))
        ));
    }

    #[test]
    fn label_counts_are_checked() {
        let s = array![[0.0], [1.0]];
        let result = ot_transport_accuracy(
            s.view(),
            s.view(),
            array![0usize].view(),
            array![0usize, 1].view(),
            0.1,
            &TransportConfig::default(),
        );
        assert!(matches!(result, Err(AdaptError::DimensionMismatch { .. })));
    }
}

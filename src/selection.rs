// Cross-validated hyperparameter selection on the source domain

use crate::error::{AdaptError, Result};
use crate::evaluation::{average_over_splits, split_accuracy, CrossValidationConfig, Split};
use crate::knn::{accuracy, check_labels, OneNearestNeighbor};
use crate::pca::PcaDecomposition;
use crate::transport::{transport_source, TransportConfig};
use log::{debug, info, warn};
use ndarray::{ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Mean split accuracy recorded for one candidate value.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CandidateScore<T> {
    pub value: T,
    pub accuracy: f64,
}

/// Outcome of a sweep: the winning value, its score, and every score seen.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Selection<T> {
    pub best: T,
    pub accuracy: f64,
    pub scores: Vec<CandidateScore<T>>,
}

pub type DimensionSelection = Selection<usize>;
pub type RegularizationSelection = Selection<f64>;

/// How a regularization candidate is scored.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RegularizationScoring {
    /// 1-NN on raw source splits. The transport solver is not run, so every
    /// candidate is scored by the same procedure and the split noise decides.
    #[default]
    SourceSplit,
    /// Transport the training half onto the held-out half with the
    /// candidate `reg`, fit 1-NN on the transported half, and score on the
    /// held-out half.
    TransportedSplit,
}

/// Seeds for candidate `index` start after every earlier candidate's trials,
/// so each candidate sees fresh splits and the sweep stays reproducible.
fn candidate_seed(base_seed: u64, index: usize, n_trials: usize) -> u64 {
    base_seed.wrapping_add((index as u64).wrapping_mul(n_trials as u64))
}

/// Keeps the first candidate with the highest score.
fn pick_best<T: Copy>(scores: Vec<CandidateScore<T>>) -> Option<Selection<T>> {
    let mut best: Option<CandidateScore<T>> = None;
    for score in &scores {
        match best {
            Some(current) if score.accuracy <= current.accuracy => {}
            _ => best = Some(*score),
        }
    }
    best.map(|b| Selection {
        best: b.value,
        accuracy: b.accuracy,
        scores,
    })
}

/// Picks the subspace dimension in `1..=d_max` with the best mean 1-NN
/// accuracy over random halves of the source domain.
///
/// Only the source matrix is decomposed; the target plays no part. A
/// candidate beyond the source's usable rank is skipped. Ties keep the
/// smaller dimension.
///
/// # Errors
/// `InvalidParameter` for `d_max == 0` or zero trials, `DimensionMismatch`
/// for a label count that differs from the row count, `InvalidDimension` if
/// no candidate is usable.
pub fn select_dimension(
    source: ArrayView2<f64>,
    source_labels: ArrayView1<usize>,
    d_max: usize,
    config: &CrossValidationConfig,
) -> Result<DimensionSelection> {
    check_labels("source labels", source.nrows(), source_labels.len())?;
    config.validate()?;
    if d_max == 0 {
        return Err(AdaptError::InvalidParameter(
            "upper bound for the dimension search must be at least 1".to_string(),
        ));
    }

    let decomposition = PcaDecomposition::fit(source)?;
    let base_seed = config.base_seed();
    info!(
        "Selecting subspace dimension in 1..={} with {} split trials per candidate.",
        d_max, config.n_trials
    );

    let mut scores = Vec::with_capacity(d_max);
    for d in 1..=d_max {
        let basis = match decomposition.basis(d) {
            Ok(basis) => basis,
            Err(e) if e.is_invalid_dimension() => {
                warn!("Skipping dimension {}: {}", d, e);
                continue;
            }
            Err(e) => return Err(e),
        };
        let projected = source.dot(&basis.axes);
        let seed = candidate_seed(base_seed, d - 1, config.n_trials);
        let score = average_over_splits(source.nrows(), config, seed, |split| {
            split_accuracy(projected.view(), source_labels, split)
        })?;
        debug!("Dimension {}: mean split accuracy {:.4}", d, score);
        scores.push(CandidateScore {
            value: d,
            accuracy: score,
        });
    }

    let selection = pick_best(scores).ok_or(AdaptError::InvalidDimension {
        requested: 1,
        max: decomposition.usable_rank(),
    })?;
    info!(
        "Selected dimension {} (mean split accuracy {:.4}).",
        selection.best, selection.accuracy
    );
    Ok(selection)
}

/// Picks the regularization strength from `candidates` with the best mean
/// split accuracy on the source domain, scored per `scoring`. Ties keep the
/// earlier candidate.
///
/// # Errors
/// `EmptyInput` for an empty candidate list, `InvalidParameter` for a
/// non-positive candidate or zero trials. Solver failures under
/// `TransportedSplit` are propagated.
pub fn select_regularization(
    source: ArrayView2<f64>,
    source_labels: ArrayView1<usize>,
    candidates: &[f64],
    config: &CrossValidationConfig,
    scoring: RegularizationScoring,
    transport: &TransportConfig,
) -> Result<RegularizationSelection> {
    check_labels("source labels", source.nrows(), source_labels.len())?;
    config.validate()?;
    if candidates.is_empty() {
        return Err(AdaptError::EmptyInput("no regularization candidates"));
    }
    if let Some(bad) = candidates.iter().find(|r| !(r.is_finite() && **r > 0.0)) {
        return Err(AdaptError::InvalidParameter(format!(
            "regularization candidates must be positive and finite, got {}",
            bad
        )));
    }

    let base_seed = config.base_seed();
    info!(
        "Selecting regularization among {:?} with {} split trials per candidate ({:?}).",
        candidates, config.n_trials, scoring
    );

    let mut scores = Vec::with_capacity(candidates.len());
    for (index, &reg) in candidates.iter().enumerate() {
        let seed = candidate_seed(base_seed, index, config.n_trials);
        let score = average_over_splits(source.nrows(), config, seed, |split| match scoring {
            RegularizationScoring::SourceSplit => split_accuracy(source, source_labels, split),
            RegularizationScoring::TransportedSplit => {
                transported_split_accuracy(source, source_labels, split, reg, transport)
            }
        })?;
        debug!("Regularization {}: mean split accuracy {:.4}", reg, score);
        scores.push(CandidateScore {
            value: reg,
            accuracy: score,
        });
    }

    let selection = pick_best(scores).ok_or(AdaptError::EmptyInput("no regularization candidates"))?;
    info!(
        "Selected regularization {} (mean split accuracy {:.4}).",
        selection.best, selection.accuracy
    );
    Ok(selection)
}

/// Transports the training half onto the test half and scores 1-NN fitted on
/// the transported training rows. Test labels are used only for the score.
fn transported_split_accuracy(
    features: ArrayView2<f64>,
    labels: ArrayView1<usize>,
    split: &Split,
    reg: f64,
    transport: &TransportConfig,
) -> Result<f64> {
    let train_x = features.select(Axis(0), &split.train);
    let train_y = labels.select(Axis(0), &split.train);
    let test_x = features.select(Axis(0), &split.test);
    let test_y = labels.select(Axis(0), &split.test);

    let plan = transport_source(train_x.view(), test_x.view(), reg, transport)?;
    let model = OneNearestNeighbor::fit(plan.transported_source.view(), train_y.view())?;
    let predicted = model.predict(test_x.view())?;
    accuracy(predicted.view(), test_y.view())
}

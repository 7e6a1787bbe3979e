// Repeated random-split evaluation shared by the selectors

use crate::error::{AdaptError, Result};
use crate::knn::{check_labels, OneNearestNeighbor};
use log::trace;
use ndarray::{ArrayView1, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Trial count and seeding for a repeated random-split estimate.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CrossValidationConfig {
    /// Number of independent 50/50 splits to average over.
    pub n_trials: usize,
    /// Base seed. Trial `i` uses `seed + i`; `None` draws a base seed from
    /// entropy.
    pub seed: Option<u64>,
}

impl CrossValidationConfig {
    pub fn new(n_trials: usize, seed: Option<u64>) -> Self {
        Self { n_trials, seed }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.n_trials == 0 {
            return Err(AdaptError::InvalidParameter(
                "number of cross-validation trials must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Seed to use for every trial of one sweep.
    pub(crate) fn base_seed(&self) -> u64 {
        match self.seed {
            Some(seed) => seed,
            None => ChaCha8Rng::from_entropy().gen(),
        }
    }
}

/// Row indices of one train/test split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffles `0..n_rows` and puts the first `n_rows / 2` indices in the
/// training half, the remainder in the test half.
///
/// # Errors
/// `EmptyInput` when fewer than two rows leave one half empty.
pub fn random_half_split<R: Rng + ?Sized>(n_rows: usize, rng: &mut R) -> Result<Split> {
    if n_rows < 2 {
        return Err(AdaptError::EmptyInput(
            "random split needs at least two rows",
        ));
    }
    let mut indices: Vec<usize> = (0..n_rows).collect();
    indices.shuffle(rng);
    let test = indices.split_off(n_rows / 2);
    Ok(Split {
        train: indices,
        test,
    })
}

/// Deterministic generator for trial `trial` of a sweep seeded with `base_seed`.
pub(crate) fn trial_rng(base_seed: u64, trial: usize) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(trial as u64))
}

/// Accuracy of 1-NN trained on `split.train` and tested on `split.test`.
pub fn split_accuracy(
    features: ArrayView2<f64>,
    labels: ArrayView1<usize>,
    split: &Split,
) -> Result<f64> {
    let train_x = features.select(Axis(0), &split.train);
    let train_y = labels.select(Axis(0), &split.train);
    let test_x = features.select(Axis(0), &split.test);
    let test_y = labels.select(Axis(0), &split.test);
    OneNearestNeighbor::fit_score(train_x.view(), train_y.view(), test_x.view(), test_y.view())
}

/// Runs `trial(split)` once per configured trial, in parallel, and returns the
/// mean of the results. Each trial draws its own split from a generator
/// derived from `base_seed`, so the outcome does not depend on scheduling.
pub(crate) fn average_over_splits<F>(
    n_rows: usize,
    config: &CrossValidationConfig,
    base_seed: u64,
    trial: F,
) -> Result<f64>
where
    F: Fn(&Split) -> Result<f64> + Sync,
{
    config.validate()?;
    let scores: Vec<f64> = (0..config.n_trials)
        .into_par_iter()
        .map(|t| {
            let mut rng = trial_rng(base_seed, t);
            let split = random_half_split(n_rows, &mut rng)?;
            trial(&split)
        })
        .collect::<Result<Vec<f64>>>()?;
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    trace!("Averaged {} split trials: {:.4}", scores.len(), mean);
    Ok(mean)
}

/// Mean 1-NN accuracy over `config.n_trials` random 50/50 splits of one
/// labeled matrix.
///
/// # Errors
/// `DimensionMismatch` if `labels` does not match the row count,
/// `EmptyInput` for fewer than two rows, `InvalidParameter` for zero trials.
pub fn repeated_split_accuracy(
    features: ArrayView2<f64>,
    labels: ArrayView1<usize>,
    config: &CrossValidationConfig,
) -> Result<f64> {
    check_labels("labels for split evaluation", features.nrows(), labels.len())?;
    let base_seed = config.base_seed();
    average_over_splits(features.nrows(), config, base_seed, |split| {
        split_accuracy(features, labels, split)
    })
}

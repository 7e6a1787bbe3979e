// One-nearest-neighbor classification and accuracy scoring

use crate::error::{AdaptError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

/// A fitted 1-nearest-neighbor classifier under Euclidean distance.
///
/// Ties go to the training row that appears first.
#[derive(Debug, Clone)]
pub struct OneNearestNeighbor {
    /// Shape: (n_train, n_features)
    train_features: Array2<f64>,
    /// Shape: (n_train)
    train_labels: Array1<usize>,
}

impl OneNearestNeighbor {
    /// Stores a copy of the training set.
    ///
    /// # Errors
    /// `EmptyInput` for zero training rows, `DimensionMismatch` if the label
    /// count differs from the row count.
    pub fn fit(features: ArrayView2<f64>, labels: ArrayView1<usize>) -> Result<Self> {
        if features.nrows() == 0 {
            return Err(AdaptError::EmptyInput("1-NN training set has zero rows"));
        }
        check_labels("1-NN training labels", features.nrows(), labels.len())?;
        Ok(Self {
            train_features: features.to_owned(),
            train_labels: labels.to_owned(),
        })
    }

    pub fn n_features(&self) -> usize {
        self.train_features.ncols()
    }

    /// Predicts a label for every row of `queries`. Rows are processed in
    /// parallel.
    pub fn predict(&self, queries: ArrayView2<f64>) -> Result<Array1<usize>> {
        if queries.ncols() != self.n_features() {
            return Err(AdaptError::DimensionMismatch {
                context: "1-NN query feature columns",
                expected: self.n_features(),
                found: queries.ncols(),
            });
        }
        let predictions: Vec<usize> = queries
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|query| self.train_labels[self.nearest_index(query)])
            .collect();
        Ok(Array1::from(predictions))
    }

    /// Fits on `(features, labels)`, predicts `queries`, and scores against
    /// `truth`.
    pub fn fit_score(
        features: ArrayView2<f64>,
        labels: ArrayView1<usize>,
        queries: ArrayView2<f64>,
        truth: ArrayView1<usize>,
    ) -> Result<f64> {
        let model = Self::fit(features, labels)?;
        let predicted = model.predict(queries)?;
        accuracy(predicted.view(), truth)
    }

    fn nearest_index(&self, query: ArrayView1<f64>) -> usize {
        let mut best_index = 0;
        let mut best_distance = f64::INFINITY;
        for (i, row) in self.train_features.axis_iter(Axis(0)).enumerate() {
            let distance: f64 = row
                .iter()
                .zip(query.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            if distance < best_distance {
                best_distance = distance;
                best_index = i;
            }
        }
        best_index
    }
}

/// Fraction of positions where `predicted` equals `truth`.
///
/// # Errors
/// `EmptyInput` for empty vectors, `DimensionMismatch` for unequal lengths.
pub fn accuracy(predicted: ArrayView1<usize>, truth: ArrayView1<usize>) -> Result<f64> {
    if truth.is_empty() {
        return Err(AdaptError::EmptyInput("no labels to score"));
    }
    check_labels("predicted labels", truth.len(), predicted.len())?;
    let correct = predicted
        .iter()
        .zip(truth.iter())
        .filter(|(p, t)| p == t)
        .count();
    Ok(correct as f64 / truth.len() as f64)
}

pub(crate) fn check_labels(context: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(AdaptError::DimensionMismatch {
            context,
            expected,
            found,
        });
    }
    Ok(())
}

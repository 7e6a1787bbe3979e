// Principal component bases for a single domain

use crate::error::{AdaptError, Result};
use crate::linalg_backends::{BackendEigh, LinAlgBackendProvider};
use log::{debug, trace};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Singular values below this fraction of the largest are treated as zero
/// when deciding how many orthonormal axes a matrix can support. Eigenvalue
/// roundoff near 1e-16 becomes roughly 1e-8 after the square root.
const RANK_TOLERANCE: f64 = 1e-5;

/// Full principal axis decomposition of one feature matrix.
///
/// Fitting is done once; `basis(d)` then slices the top `d` axes, so a
/// sweep over candidate dimensions costs a single eigendecomposition.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PcaDecomposition {
    /// Column means of the fitted data.
    /// Shape: (n_features)
    mean: Array1<f64>,
    /// Principal axes ordered by decreasing singular value.
    /// Shape: (n_features, n_axes)
    axes: Array2<f64>,
    /// Singular values of the centered data, descending.
    /// Shape: (min(n_samples, n_features))
    singular_values: Array1<f64>,
    /// Number of rows the decomposition was fitted on.
    n_samples: usize,
}

/// The top-`d` orthonormal principal directions of a matrix.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PcaBasis {
    /// Orthonormal columns, shape (n_features, d).
    pub axes: Array2<f64>,
    /// Singular values of the centered data, length min(n_samples, n_features).
    pub singular_values: Array1<f64>,
    /// Column means removed before the decomposition.
    pub mean: Array1<f64>,
}

impl PcaBasis {
    /// Number of retained directions.
    pub fn dim(&self) -> usize {
        self.axes.ncols()
    }

    /// Projects rows of `x` onto the basis without centering: `x · axes`.
    pub fn project(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.axes.nrows() {
            return Err(AdaptError::DimensionMismatch {
                context: "feature columns for projection",
                expected: self.axes.nrows(),
                found: x.ncols(),
            });
        }
        Ok(x.dot(&self.axes))
    }
}

impl PcaDecomposition {
    /// Centers `x` by its column means and computes every principal axis.
    ///
    /// When `n_features <= n_samples` the f×f scatter matrix `XcᵀXc` is
    /// eigendecomposed directly. Otherwise the n×n Gram matrix `XcXcᵀ` is
    /// used and each eigenvector is mapped back to feature space via
    /// `v_k = Xcᵀ u_k / s_k`.
    ///
    /// # Errors
    /// `EmptyInput` if `x` has no rows or no columns, `Linalg` if the
    /// eigendecomposition fails.
    pub fn fit(x: ArrayView2<f64>) -> Result<Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if n_samples == 0 {
            return Err(AdaptError::EmptyInput("feature matrix has zero rows"));
        }
        if n_features == 0 {
            return Err(AdaptError::EmptyInput("feature matrix has zero columns"));
        }

        let mean = x
            .mean_axis(Axis(0))
            .ok_or(AdaptError::EmptyInput("feature matrix has zero rows"))?;
        let centered = &x - &mean;
        let backend = LinAlgBackendProvider::<f64>::new();

        let (axes, singular_values) = if n_features <= n_samples {
            let scatter = centered.t().dot(&centered);
            let eig = backend.eigh_upper(&scatter)?;
            let order = descending_order(&eig.eigenvalues);

            let singular_values: Array1<f64> = order
                .iter()
                .map(|&i| eig.eigenvalues[i].max(0.0).sqrt())
                .collect();
            let axes = eig.eigenvectors.select(Axis(1), &order);
            (axes, singular_values)
        } else {
            let gram = centered.dot(&centered.t());
            let eig = backend.eigh_upper(&gram)?;
            let order = descending_order(&eig.eigenvalues);

            let singular_values: Array1<f64> = order
                .iter()
                .map(|&i| eig.eigenvalues[i].max(0.0).sqrt())
                .collect();
            let largest = singular_values.get(0).copied().unwrap_or(0.0);

            let mut axes = Array2::<f64>::zeros((n_features, n_samples));
            for (k, &i) in order.iter().enumerate() {
                let s_k = singular_values[k];
                // Axes past the numerical rank stay zero; basis() refuses them.
                if s_k <= RANK_TOLERANCE * largest || s_k == 0.0 {
                    continue;
                }
                let mut axis = centered.t().dot(&eig.eigenvectors.column(i));
                let norm = axis.dot(&axis).sqrt();
                if norm > 0.0 {
                    axis.mapv_inplace(|v| v / norm);
                }
                axes.slice_mut(s![.., k]).assign(&axis);
            }
            (axes, singular_values)
        };

        trace!(
            "PCA fit on {}x{} matrix, leading singular values {:?}",
            n_samples,
            n_features,
            singular_values.iter().take(5).collect::<Vec<_>>()
        );

        Ok(Self {
            mean,
            axes,
            singular_values,
            n_samples,
        })
    }

    /// Singular values of the centered data, descending.
    pub fn singular_values(&self) -> &Array1<f64> {
        &self.singular_values
    }

    /// Column means removed before decomposition.
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Largest `d` allowed by shape alone: `min(D, n - 1)`.
    pub fn max_dimension(&self) -> usize {
        self.axes.nrows().min(self.n_samples.saturating_sub(1))
    }

    /// Number of axes backed by a numerically non-zero singular value,
    /// capped by `max_dimension`.
    pub fn usable_rank(&self) -> usize {
        let largest = self.singular_values.get(0).copied().unwrap_or(0.0);
        let numerical = self
            .singular_values
            .iter()
            .take_while(|&&s| s > 0.0 && s > RANK_TOLERANCE * largest)
            .count();
        numerical.min(self.max_dimension())
    }

    /// Returns the top-`d` orthonormal basis.
    ///
    /// # Errors
    /// `InvalidDimension` if `d == 0`, if `d > min(D, n - 1)`, or if the
    /// data has fewer than `d` numerically non-zero directions.
    pub fn basis(&self, d: usize) -> Result<PcaBasis> {
        let max = self.max_dimension();
        if d == 0 || d > max {
            return Err(AdaptError::InvalidDimension { requested: d, max });
        }
        let usable = self.usable_rank();
        if d > usable {
            debug!("Dimension {} exceeds numerical rank {} of the data.", d, usable);
            return Err(AdaptError::InvalidDimension {
                requested: d,
                max: usable,
            });
        }
        Ok(PcaBasis {
            axes: self.axes.slice(s![.., ..d]).to_owned(),
            singular_values: self.singular_values.clone(),
            mean: self.mean.clone(),
        })
    }
}

/// One-shot form: centers `x` and returns its top-`d` principal basis.
pub fn pca_basis(x: ArrayView2<f64>, d: usize) -> Result<PcaBasis> {
    PcaDecomposition::fit(x)?.basis(d)
}

fn descending_order(values: &Array1<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn random_matrix(n: usize, d: usize, seed: u64) -> Array2<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Array2::random_using((n, d), Normal::new(0.0, 1.0).unwrap(), &mut rng)
    }

    fn assert_orthonormal(axes: &Array2<f64>) {
        let gram = axes.t().dot(axes);
        for i in 0..gram.nrows() {
            for j in 0..gram.ncols() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(gram[[i, j]], expected, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn covariance_path_basis_is_orthonormal() {
        let x = random_matrix(40, 6, 1);
        for d in 1..=6 {
            let basis = pca_basis(x.view(), d).unwrap();
            assert_eq!(basis.axes.dim(), (6, d));
            assert_orthonormal(&basis.axes);
        }
    }

    #[test]
    fn gram_path_basis_is_orthonormal() {
        let x = random_matrix(8, 30, 2);
        let decomposition = PcaDecomposition::fit(x.view()).unwrap();
        assert_eq!(decomposition.max_dimension(), 7);
        assert_eq!(decomposition.singular_values().len(), 8);
        for d in 1..=7 {
            assert_orthonormal(&decomposition.basis(d).unwrap().axes);
        }
    }

    #[test]
    fn both_paths_agree_on_singular_values() {
        // Same data seen as tall (covariance path) and, after padding with
        // zero columns, wide (Gram path).
        let tall = random_matrix(6, 4, 3);
        let mut wide = Array2::<f64>::zeros((6, 10));
        wide.slice_mut(s![.., ..4]).assign(&tall);

        let a = PcaDecomposition::fit(tall.view()).unwrap();
        let b = PcaDecomposition::fit(wide.view()).unwrap();
        for k in 0..4 {
            assert_abs_diff_eq!(a.singular_values()[k], b.singular_values()[k], epsilon = 1e-8);
        }
    }

    #[test]
    fn singular_values_are_descending_and_match_variance() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [10.0, 0.0], [10.0, 1.0]];
        let basis = pca_basis(x.view(), 2).unwrap();
        let sv = &basis.singular_values;
        assert!(sv[0] >= sv[1]);
        // Centered x column is ±5 on four rows: sqrt(4 * 25) = 10.
        assert_abs_diff_eq!(sv[0], 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(sv[1], 1.0, epsilon = 1e-9);
        // Leading axis is the x direction, up to sign.
        assert_abs_diff_eq!(basis.axes[[0, 0]].abs(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn mean_subtraction_is_internal() {
        let x = random_matrix(20, 3, 4);
        let shifted = &x + 100.0;
        let a = pca_basis(x.view(), 2).unwrap();
        let b = pca_basis(shifted.view(), 2).unwrap();
        for k in 0..3 {
            assert_abs_diff_eq!(a.singular_values[k], b.singular_values[k], epsilon = 1e-8);
        }
    }

    #[test]
    fn zero_and_oversized_dimensions_are_rejected() {
        let x = random_matrix(5, 3, 5);
        assert!(matches!(
            pca_basis(x.view(), 0),
            Err(AdaptError::InvalidDimension { requested: 0, .. })
        ));
        assert!(matches!(
            pca_basis(x.view(), 4),
            Err(AdaptError::InvalidDimension { requested: 4, max: 3 })
        ));

        let wide = random_matrix(3, 10, 6);
        assert!(matches!(
            pca_basis(wide.view(), 3),
            Err(AdaptError::InvalidDimension { requested: 3, max: 2 })
        ));
    }

    #[test]
    fn rank_deficient_directions_are_rejected() {
        // Every row lies on one line, so only one direction has variance.
        let x = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0], [4.0, 8.0]];
        let decomposition = PcaDecomposition::fit(x.view()).unwrap();
        assert_eq!(decomposition.usable_rank(), 1);
        assert!(decomposition.basis(1).is_ok());
        assert!(decomposition.basis(2).unwrap_err().is_invalid_dimension());
    }

    #[test]
    fn empty_matrix_is_rejected() {
        let x = Array2::<f64>::zeros((0, 3));
        assert!(matches!(
            PcaDecomposition::fit(x.view()),
            Err(AdaptError::EmptyInput(_))
        ));
    }

    #[test]
    fn projection_checks_feature_count() {
        let x = random_matrix(10, 4, 7);
        let basis = pca_basis(x.view(), 2).unwrap();
        assert_eq!(basis.project(x.view()).unwrap().dim(), (10, 2));
        let other = random_matrix(10, 5, 8);
        assert!(matches!(
            basis.project(other.view()),
            Err(AdaptError::DimensionMismatch { .. })
        ));
    }
}

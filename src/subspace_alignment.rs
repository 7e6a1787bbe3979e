// Subspace alignment between source and target principal bases

use crate::error::Result;
use crate::knn::{accuracy, check_labels, OneNearestNeighbor};
use crate::pca::{PcaBasis, PcaDecomposition};
use crate::transport::check_domains;
use log::info;
use ndarray::{Array2, ArrayView1, ArrayView2};

/// Everything produced by aligning a source subspace onto a target subspace.
#[derive(Debug, Clone)]
pub struct SubspaceAlignment {
    /// `X_s`, shape (n_features, d).
    pub source_basis: PcaBasis,
    /// `X_t`, shape (n_features, d).
    pub target_basis: PcaBasis,
    /// `M = X_sᵀ X_t`, shape (d, d).
    pub alignment: Array2<f64>,
    /// `S X_s M`, shape (n_source, d).
    pub aligned_source: Array2<f64>,
    /// `T X_t`, shape (n_target, d).
    pub projected_target: Array2<f64>,
}

impl SubspaceAlignment {
    /// Builds `d`-dimensional bases for each domain independently and maps
    /// the source coordinates into the target frame.
    ///
    /// # Errors
    /// `InvalidDimension` if `d` exceeds either domain's usable rank,
    /// `DimensionMismatch` if the feature counts differ, `EmptyInput` for a
    /// zero-row domain.
    pub fn fit(source: ArrayView2<f64>, target: ArrayView2<f64>, d: usize) -> Result<Self> {
        check_domains(source, target)?;
        let source_basis = PcaDecomposition::fit(source)?.basis(d)?;
        let target_basis = PcaDecomposition::fit(target)?.basis(d)?;
        Ok(Self::from_bases(source, target, source_basis, target_basis))
    }

    /// Same as `fit` with the decompositions already computed, so a sweep
    /// over `d` reuses one eigendecomposition per domain.
    pub fn from_decompositions(
        source: ArrayView2<f64>,
        target: ArrayView2<f64>,
        source_pca: &PcaDecomposition,
        target_pca: &PcaDecomposition,
        d: usize,
    ) -> Result<Self> {
        check_domains(source, target)?;
        let source_basis = source_pca.basis(d)?;
        let target_basis = target_pca.basis(d)?;
        Ok(Self::from_bases(source, target, source_basis, target_basis))
    }

    fn from_bases(
        source: ArrayView2<f64>,
        target: ArrayView2<f64>,
        source_basis: PcaBasis,
        target_basis: PcaBasis,
    ) -> Self {
        let projected_source = source.dot(&source_basis.axes);
        let projected_target = target.dot(&target_basis.axes);
        let alignment = source_basis.axes.t().dot(&target_basis.axes);
        let aligned_source = projected_source.dot(&alignment);
        Self {
            source_basis,
            target_basis,
            alignment,
            aligned_source,
            projected_target,
        }
    }

    pub fn dim(&self) -> usize {
        self.alignment.nrows()
    }

    /// Fits 1-NN on the aligned source and predicts the projected target.
    pub fn score(
        &self,
        source_labels: ArrayView1<usize>,
        target_labels: ArrayView1<usize>,
    ) -> Result<f64> {
        check_labels("source labels", self.aligned_source.nrows(), source_labels.len())?;
        check_labels("target labels", self.projected_target.nrows(), target_labels.len())?;
        let model = OneNearestNeighbor::fit(self.aligned_source.view(), source_labels)?;
        let predicted = model.predict(self.projected_target.view())?;
        accuracy(predicted.view(), target_labels)
    }
}

/// Target accuracy of 1-NN after subspace alignment at dimension `d`.
///
/// Deterministic: repeated calls with the same inputs give the same value.
pub fn subspace_alignment_accuracy(
    source: ArrayView2<f64>,
    target: ArrayView2<f64>,
    source_labels: ArrayView1<usize>,
    target_labels: ArrayView1<usize>,
    d: usize,
) -> Result<f64> {
    let aligned = SubspaceAlignment::fit(source, target, d)?;
    let score = aligned.score(source_labels, target_labels)?;
    info!("Subspace alignment accuracy at d={}: {:.4}", d, score);
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdaptError;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn alignment_matrix_is_basis_cross_product() {
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let s = Array2::random_using((30, 5), Normal::new(0.0, 1.0).unwrap(), &mut rng);
        let t = Array2::random_using((25, 5), Normal::new(0.0, 2.0).unwrap(), &mut rng);
        let aligned = SubspaceAlignment::fit(s.view(), t.view(), 3).unwrap();
        assert_eq!(aligned.dim(), 3);
        assert_eq!(aligned.aligned_source.dim(), (30, 3));
        assert_eq!(aligned.projected_target.dim(), (25, 3));

        let expected = aligned.source_basis.axes.t().dot(&aligned.target_basis.axes);
        for (a, b) in aligned.alignment.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
        let manual = s.dot(&aligned.source_basis.axes).dot(&aligned.alignment);
        for (a, b) in aligned.aligned_source.iter().zip(manual.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
        }
    }

    #[test]
    fn identical_domains_align_to_identity_up_to_sign() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let s = Array2::random_using((40, 4), Normal::new(0.0, 1.0).unwrap(), &mut rng);
        let aligned = SubspaceAlignment::fit(s.view(), s.view(), 2).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(aligned.alignment[[i, j]].abs(), expected, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn repeated_runs_give_identical_accuracy() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let s = Array2::random_using((20, 6), Normal::new(0.0, 1.0).unwrap(), &mut rng);
        let t = &s * 1.5 + 0.3;
        let ys = Array1::from_shape_fn(20, |i| i % 3);
        let a = subspace_alignment_accuracy(s.view(), t.view(), ys.view(), ys.view(), 3).unwrap();
        let b = subspace_alignment_accuracy(s.view(), t.view(), ys.view(), ys.view(), 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn dimension_beyond_target_rank_fails() {
        let s = array![[0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [2.0, 1.0, 1.0]];
        let t = array![[0.0, 0.0, 1.0], [1.0, 2.0, 0.0]];
        let labels_s = array![0usize, 1, 0, 1];
        let labels_t = array![0usize, 1];
        assert!(matches!(
            subspace_alignment_accuracy(s.view(), t.view(), labels_s.view(), labels_t.view(), 2),
            Err(AdaptError::InvalidDimension { requested: 2, max: 1 })
        ));
        assert!(matches!(
            subspace_alignment_accuracy(s.view(), t.view(), labels_s.view(), labels_t.view(), 0),
            Err(AdaptError::InvalidDimension { requested: 0, .. })
        ));
    }
}

// src/linalg_backends.rs

use crate::error::Result;
use ndarray::{Array1, Array2};
use ndarray_linalg::{Eigh as NdLinalgEigh, UPLO};
use std::marker::PhantomData;

/// Output of a symmetric eigendecomposition.
#[derive(Debug)]
pub struct EighOutput<F: 'static> {
    /// Eigenvalues in ascending order, as LAPACK returns them.
    pub eigenvalues: Array1<F>,
    /// Eigenvectors as columns of the matrix.
    /// eigenvectors.column(i) corresponds to eigenvalues[i].
    pub eigenvectors: Array2<F>,
}

/// Trait for symmetric eigendecomposition (similar to LAPACK's DSYEVD).
/// Implementers may read only the upper triangle of `matrix`.
pub trait BackendEigh<F: 'static + Copy + Send + Sync> {
    fn eigh_upper(&self, matrix: &Array2<F>) -> Result<EighOutput<F>>;
}

/// ndarray-linalg backed implementation. The LAPACK provider behind it is
/// chosen by the `backend_*` cargo features.
#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

impl BackendEigh<f64> for NdarrayLinAlgBackend {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput<f64>> {
        let (eigenvalues, eigenvectors) = matrix.eigh(UPLO::Upper)?;
        Ok(EighOutput { eigenvalues, eigenvectors })
    }
}

/// Dispatch point used by the rest of the crate.
#[derive(Debug, Default, Copy, Clone)]
pub struct LinAlgBackendProvider<F: 'static + Copy + Send + Sync> {
    _phantom: PhantomData<F>,
}

impl<F: 'static + Copy + Send + Sync> LinAlgBackendProvider<F> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

impl<F> BackendEigh<F> for LinAlgBackendProvider<F>
where
    F: 'static + Copy + Send + Sync,
    NdarrayLinAlgBackend: BackendEigh<F>,
{
    fn eigh_upper(&self, matrix: &Array2<F>) -> Result<EighOutput<F>> {
        NdarrayLinAlgBackend.eigh_upper(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn eigh_returns_ascending_eigenpairs() {
        let m = array![[2.0_f64, 1.0], [1.0, 2.0]];
        let out = LinAlgBackendProvider::<f64>::new().eigh_upper(&m).unwrap();
        assert_abs_diff_eq!(out.eigenvalues[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.eigenvalues[1], 3.0, epsilon = 1e-12);

        // A v = lambda v for the leading pair.
        let v = out.eigenvectors.column(1).to_owned();
        let av = m.dot(&v);
        for i in 0..2 {
            assert_abs_diff_eq!(av[i], 3.0 * v[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn provider_dispatches_to_ndarray_backend() {
        let m = array![[4.0_f64, 0.5, 0.0], [0.5, 1.0, 0.2], [0.0, 0.2, 3.0]];
        let direct = NdarrayLinAlgBackend.eigh_upper(&m).unwrap();
        let dispatched = LinAlgBackendProvider::<f64>::new().eigh_upper(&m).unwrap();
        assert_eq!(direct.eigenvalues, dispatched.eigenvalues);
        assert_eq!(direct.eigenvectors, dispatched.eigenvectors);
    }
}

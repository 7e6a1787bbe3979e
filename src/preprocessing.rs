// Per-column standardization for callers preparing feature matrices

use crate::error::{AdaptError, Result};
use log::{debug, info};
use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;

/// Standard deviations at or below this are treated as constant columns.
const CONSTANT_COLUMN_EPS: f64 = 1e-12;

/// Z-scores every column of `x` using the population standard deviation.
/// Constant columns become zero.
///
/// The adaptation routines expect already-standardized inputs and never call
/// this themselves.
pub fn standardize_columns(x: ArrayView2<f64>) -> Result<Array2<f64>> {
    let (n_rows, n_cols) = x.dim();
    if n_rows == 0 {
        return Err(AdaptError::EmptyInput("cannot standardize a matrix with zero rows"));
    }
    info!("Standardizing {} columns over {} rows.", n_cols, n_rows);

    let mut standardized = x.to_owned();
    let constant_columns: usize = standardized
        .axis_iter_mut(Axis(1))
        .into_par_iter()
        .map(|mut column| {
            let mean = column.sum() / n_rows as f64;
            column.mapv_inplace(|v| v - mean);
            let variance = column.iter().map(|v| v * v).sum::<f64>() / n_rows as f64;
            let std_dev = variance.sqrt();
            if std_dev > CONSTANT_COLUMN_EPS {
                column.mapv_inplace(|v| v / std_dev);
                0
            } else {
                column.fill(0.0);
                1
            }
        })
        .sum();

    if constant_columns > 0 {
        debug!("{} constant columns set to zero.", constant_columns);
    }
    Ok(standardized)
}

// =============================================================================
// ndarray <-> nalgebra Conversion Utilities
// =============================================================================
//
// This module centralizes the conversions between ndarray (used for data
// storage and the public API) and nalgebra (used for dense factorizations:
// Cholesky for density evaluation, symmetric eigendecomposition for the
// positive-definite covariance repair).
//
// Keeping the bridges in one place means the density and constraint code can
// stay focused on the math instead of element-by-element copy loops.
//
// =============================================================================

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

/// Convert an ndarray Array2 to a nalgebra DMatrix.
///
/// Handles non-contiguous arrays by making a contiguous copy first.
#[inline]
pub fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    let (nrows, ncols) = (a.nrows(), a.ncols());
    if let Some(slice) = a.as_slice() {
        DMatrix::from_row_slice(nrows, ncols, slice)
    } else {
        let contig = a.as_standard_layout().to_owned();
        DMatrix::from_row_slice(nrows, ncols, contig.as_slice().expect("standard layout"))
    }
}

/// Convert an ndarray Array1 to a nalgebra DVector.
#[inline]
pub fn to_dvector(v: &Array1<f64>) -> DVector<f64> {
    match v.as_slice() {
        Some(slice) => DVector::from_row_slice(slice),
        None => DVector::from_row_slice(&v.to_vec()),
    }
}

/// Convert a nalgebra DMatrix to an ndarray Array2.
#[inline]
pub fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    let (nrows, ncols) = m.shape();
    let mut result = Array2::zeros((nrows, ncols));
    for i in 0..nrows {
        for j in 0..ncols {
            result[[i, j]] = m[(i, j)];
        }
    }
    result
}

/// Convert a nalgebra DVector to an ndarray Array1.
#[inline]
pub fn to_array1(v: &DVector<f64>) -> Array1<f64> {
    Array1::from_vec(v.as_slice().to_vec())
}

/// Force exact symmetry on a nearly-symmetric matrix in place.
///
/// The M-step covariance update is symmetric in exact arithmetic but can
/// drift by a few ulps in floating point; factorization code downstream
/// assumes exact symmetry.
pub fn symmetrize(a: &mut Array2<f64>) {
    let n = a.nrows();
    debug_assert_eq!(n, a.ncols());
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (a[[i, j]] + a[[j, i]]);
            a[[i, j]] = avg;
            a[[j, i]] = avg;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Embedded dense symmetric eigensolver.
//!
//! The projected matrices are tiny (dimension `nKr` at most, tens), so the
//! solve always runs in f64 whatever the working precision.

use nalgebra::{DMatrix, SymmetricEigen};

use crate::error::EigError;

const MAX_SWEEPS: usize = 250;

/// Eigendecomposition of a small symmetric matrix, eigenvalues ascending.
#[derive(Debug, Clone)]
pub(crate) struct DenseEigen {
    pub values: Vec<f64>,
    /// Column `i` is the eigenvector of `values[i]`.
    pub vectors: DMatrix<f64>,
}

/// Solve the symmetric eigenproblem and sort the pairs ascending.
pub(crate) fn eigh_sorted(mat: DMatrix<f64>) -> Result<DenseEigen, EigError> {
    let n = mat.nrows();
    debug_assert_eq!(n, mat.ncols());

    let eig = SymmetricEigen::try_new(mat, f64::EPSILON, MAX_SWEEPS).ok_or_else(|| {
        EigError::DenseSolve(format!(
            "symmetric QR failed to converge for a {n}x{n} matrix"
        ))
    })?;

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));

    let mut values = Vec::with_capacity(n);
    let mut vectors = DMatrix::zeros(n, n);
    for (dst, &src) in order.iter().enumerate() {
        values.push(eig.eigenvalues[src]);
        vectors.set_column(dst, &eig.eigenvectors.column(src));
    }

    Ok(DenseEigen { values, vectors })
}

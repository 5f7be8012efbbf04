use crate::error::EigError;
use crate::EigFloat;

/// An implicitly defined Hermitian linear operator.
///
/// The solver never inspects matrix entries; it only applies the operator and
/// the vector kernels. Implementations must be symmetric/Hermitian or the
/// Lanczos recursion is meaningless.
pub trait HermitianOp<T: EigFloat>: Sync {
    /// Problem dimension (vector length).
    fn size(&self) -> usize;

    /// `y = A * x`.
    fn apply(&self, x: &[T], y: &mut [T]);

    /// `y = M * x` for the underlying factor when the operator is `M^H M`.
    ///
    /// Only consulted in singular-value mode; the default reports that no
    /// factor is available.
    fn apply_factor(&self, _x: &[T], _y: &mut [T]) -> Result<(), EigError> {
        Err(EigError::FactorUnavailable)
    }
}

#[rustfmt::skip]
impl<T: EigFloat> HermitianOp<T> for nalgebra_sparse::csr::CsrMatrix<T> {
    fn size(&self) -> usize { self.nrows() }

    fn apply(&self, x: &[T], y: &mut [T]) {
        assert_eq!(self.nrows(), self.ncols(), "apply: operator must be square");
        assert_eq!(x.len(), self.ncols(), "apply: x must be A.ncols() in length, x = {}, A.ncols = {}", x.len(), self.ncols());
        assert_eq!(y.len(), self.nrows(), "apply: y must be A.nrows() in length, y = {}, A.nrows = {}", y.len(), self.nrows());

        let (major_offsets, minor_indices, values) = self.csr_data();

        for (i, yval) in y.iter_mut().enumerate() {
            let mut acc = T::zero();
            for j in major_offsets[i]..major_offsets[i + 1] {
                acc += values[j] * x[minor_indices[j]];
            }
            *yval = acc;
        }
    }
}

#[rustfmt::skip]
impl<T: EigFloat> HermitianOp<T> for nalgebra_sparse::csc::CscMatrix<T> {
    fn size(&self) -> usize { self.nrows() }

    fn apply(&self, x: &[T], y: &mut [T]) {
        assert_eq!(self.nrows(), self.ncols(), "apply: operator must be square");
        assert_eq!(x.len(), self.ncols(), "apply: x must be A.ncols() in length, x = {}, A.ncols = {}", x.len(), self.ncols());
        assert_eq!(y.len(), self.nrows(), "apply: y must be A.nrows() in length, y = {}, A.nrows = {}", y.len(), self.nrows());

        let (major_offsets, minor_indices, values) = self.csc_data();

        for yval in y.iter_mut() {
            *yval = T::zero();
        }
        for (i, xval) in x.iter().enumerate() {
            for j in major_offsets[i]..major_offsets[i + 1] {
                y[minor_indices[j]] += values[j] * *xval;
            }
        }
    }
}

#[rustfmt::skip]
impl<T: EigFloat> HermitianOp<T> for nalgebra_sparse::coo::CooMatrix<T> {
    fn size(&self) -> usize { self.nrows() }

    fn apply(&self, x: &[T], y: &mut [T]) {
        assert_eq!(self.nrows(), self.ncols(), "apply: operator must be square");
        assert_eq!(x.len(), self.ncols(), "apply: x must be A.ncols() in length, x = {}, A.ncols = {}", x.len(), self.ncols());
        assert_eq!(y.len(), self.nrows(), "apply: y must be A.nrows() in length, y = {}, A.nrows = {}", y.len(), self.nrows());

        for yval in y.iter_mut() {
            *yval = T::zero();
        }
        for (i, j, v) in self.triplet_iter() {
            y[i] += *v * x[j];
        }
    }
}

/// Diagonal operator `A = diag(d)`, with `M = diag(sqrt(d))` as its factor.
///
/// Mostly useful as a transparent test operator: eigenvalues are the diagonal
/// entries and singular values of the factor are their square roots.
#[derive(Debug, Clone)]
pub struct DiagonalOp<T> {
    diag: Vec<T>,
}

impl<T: EigFloat> DiagonalOp<T> {
    pub fn new(diag: Vec<T>) -> Self {
        Self { diag }
    }
}

#[rustfmt::skip]
impl<T: EigFloat> HermitianOp<T> for DiagonalOp<T> {
    fn size(&self) -> usize { self.diag.len() }

    fn apply(&self, x: &[T], y: &mut [T]) {
        for ((yv, xv), d) in y.iter_mut().zip(x).zip(&self.diag) {
            *yv = *d * *xv;
        }
    }

    fn apply_factor(&self, x: &[T], y: &mut [T]) -> Result<(), EigError> {
        for ((yv, xv), d) in y.iter_mut().zip(x).zip(&self.diag) {
            *yv = d.sqrt() * *xv;
        }
        Ok(())
    }
}

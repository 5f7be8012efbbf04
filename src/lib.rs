//! Restarted Krylov-subspace eigensolvers for Hermitian operators.
//!
//! The primary solver is Thick-Restart Lanczos with optional Chebyshev
//! polynomial acceleration and singular-value post-processing; a
//! Jacobi-Davidson variant expands through a user-supplied correction
//! solver instead. Operators are abstract: anything implementing
//! [`HermitianOp`] can be solved, including the provided
//! `nalgebra-sparse` matrix impls.
//!
//! # Example
//!
//! ```
//! use krylov_eig::{eigensolve, DiagonalOp, EigParams};
//!
//! let op = DiagonalOp::new((1..=50).map(f64::from).collect());
//! let mut params = EigParams::new(10, 20, 5);
//! params.tol = 1e-10;
//! params.random_seed = 42;
//!
//! let out = eigensolve(&op, &params).unwrap();
//! assert!(out.diagnostics.converged);
//! assert!((out.evals[0] - 1.0).abs() < 1e-8);
//! ```

use std::fmt::Debug;
use std::iter::Sum;
use std::ops::{AddAssign, MulAssign, Neg, SubAssign};

use ndarray::{Array1, Array2};
use num_traits::{Float, FromPrimitive, One, Zero};

pub mod blas;
pub mod error;
pub mod operator;
pub mod params;

mod basis;
mod common;
mod dense;
mod jd;
mod trlm;
mod vecio;

pub use common::{cheby_op, deflate};
pub use error::EigError;
pub use jd::{CorrectionSolver, Jd};
pub use operator::{DiagonalOp, HermitianOp};
pub use params::{EigParams, Extremum, PolyAcc, SolverFamily, Spectrum, SpectrumKind};
pub use trlm::Trlm;
pub use vecio::{load_vectors, save_vectors};

/// Trait for floating point types the solvers can run in.
pub trait EigFloat:
    Float
    + FromPrimitive
    + Debug
    + Send
    + Sync
    + Zero
    + One
    + AddAssign
    + SubAssign
    + MulAssign
    + Neg<Output = Self>
    + Sum
    + 'static
{
    fn eps() -> Self;
}

impl EigFloat for f32 {
    fn eps() -> Self {
        f32::EPSILON
    }
}

impl EigFloat for f64 {
    fn eps() -> Self {
        f64::EPSILON
    }
}

/// Solve diagnostics.
///
/// # Fields
/// - restarts: restart cycles consumed
/// - op_applications: total operator applications, polynomial steps included
/// - converged: whether `nConv` pairs met the tolerance; a `false` result is
///   a partial answer, not an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub restarts: usize,
    pub op_applications: usize,
    pub converged: bool,
}

/// Converged (or best-effort) eigenpairs.
///
/// # Fields
/// - evals: eigenvalues in the configured order, or duplicated singular
///   values in singular-value mode
/// - evecs: eigenvectors, one per row
/// - residua: exact residual norms `||A v - lambda v||`, recomputed from the
///   operator rather than trusted from Ritz estimates
/// - diagnostics: solve diagnostics
#[derive(Debug, Clone)]
pub struct EigenOutput<T: EigFloat> {
    pub evals: Array1<T>,
    pub evecs: Array2<T>,
    pub residua: Array1<T>,
    pub diagnostics: Diagnostics,
}

impl<T: EigFloat> EigenOutput<T> {
    pub(crate) fn from_parts(
        evals: Vec<T>,
        vecs: &[Vec<T>],
        residua: Vec<T>,
        diagnostics: Diagnostics,
    ) -> Result<Self, EigError> {
        let count = evals.len();
        let dim = vecs.first().map_or(0, Vec::len);
        let mut flat = Vec::with_capacity(count * dim);
        for v in vecs.iter().take(count) {
            flat.extend_from_slice(v);
        }
        let evecs = Array2::from_shape_vec((count, dim), flat)?;
        Ok(Self {
            evals: Array1::from(evals),
            evecs,
            residua: Array1::from(residua),
            diagnostics,
        })
    }
}

/// The closed set of solver variants, selected from configuration.
pub enum SolverVariant<T: EigFloat> {
    Trlm(Trlm<T>),
    Jd(Jd<T>),
}

impl<T: EigFloat> SolverVariant<T> {
    /// Instantiate the variant named by `params.family`.
    ///
    /// The Jacobi-Davidson family cannot run without a correction solver;
    /// passing `None` for it is a configuration error. The extra argument is
    /// ignored by the Lanczos family.
    pub fn new(
        params: EigParams,
        correction: Option<Box<dyn CorrectionSolver<T>>>,
    ) -> Result<Self, EigError> {
        match params.family {
            SolverFamily::Trlm => Ok(SolverVariant::Trlm(Trlm::new(params)?)),
            SolverFamily::Jd => {
                let correction = correction.ok_or_else(|| {
                    EigError::Config(
                        "the Jacobi-Davidson family needs a correction solver".to_string(),
                    )
                })?;
                Ok(SolverVariant::Jd(Jd::new(params, correction)?))
            }
            SolverFamily::Arnoldi => Err(EigError::Unsupported("Arnoldi".to_string())),
        }
    }

    /// Run the selected solver against `op`, optionally from `guess`.
    pub fn run<M>(&mut self, op: &M, guess: Option<&[T]>) -> Result<EigenOutput<T>, EigError>
    where
        M: HermitianOp<T>,
    {
        match self {
            SolverVariant::Trlm(s) => s.solve(op, guess),
            SolverVariant::Jd(s) => s.solve(op, guess),
        }
    }
}

/// One-call wrapper: build the configured solver and run it from a random
/// start. Jacobi-Davidson configurations need [`SolverVariant::new`] instead,
/// since a correction solver must be supplied.
pub fn eigensolve<T, M>(op: &M, params: &EigParams) -> Result<EigenOutput<T>, EigError>
where
    T: EigFloat,
    M: HermitianOp<T>,
{
    let mut solver = SolverVariant::new(params.clone(), None)?;
    solver.run(op, None)
}

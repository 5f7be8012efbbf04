//! Jacobi-Davidson: correction-equation expansion instead of Lanczos steps.
//!
//! Two subspaces grow together: `V` (search directions) and `W` (their
//! operator images), tied by the small projected matrix `H = W^H V`. Each
//! iteration extracts the best Ritz pair from `H`, and when its residual is
//! still too large, asks an external linear solver for a correction direction
//! at the current eigenvalue estimate. Reaching `m_max` directions truncates
//! both subspaces back down to `m_min` Ritz vectors.

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::blas;
use crate::common;
use crate::dense::{self, DenseEigen};
use crate::error::EigError;
use crate::operator::HermitianOp;
use crate::params::EigParams;
use crate::vecio;
use crate::{Diagnostics, EigFloat, EigenOutput};

/// Approximate solver for the shifted correction equation
/// `(A - shift*I) t = rhs`.
///
/// `t` enters holding an initial guess and leaves holding the refined
/// solution. A loose solve is fine; the outer loop only needs a useful new
/// search direction, not an accurate inverse.
pub trait CorrectionSolver<T: EigFloat> {
    fn solve(
        &mut self,
        op: &dyn HermitianOp<T>,
        shift: T,
        rhs: &[T],
        t: &mut [T],
    ) -> Result<(), EigError>;
}

pub struct Jd<T: EigFloat> {
    params: EigParams,
    correction: Box<dyn CorrectionSolver<T>>,
    /// Spectral target the search is centered on.
    tau: T,
}

impl<T: EigFloat> Jd<T> {
    pub fn new(
        params: EigParams,
        correction: Box<dyn CorrectionSolver<T>>,
    ) -> Result<Self, EigError> {
        params.validate()?;
        Ok(Self {
            params,
            correction,
            tau: T::zero(),
        })
    }

    /// Run the solver against `op`, optionally starting from `guess`.
    ///
    /// Accepted pairs come out in acceptance order, which is descending in
    /// eigenvalue since the candidate extraction always chases the top of
    /// the projected spectrum.
    pub fn solve<M>(&mut self, op: &M, guess: Option<&[T]>) -> Result<EigenOutput<T>, EigError>
    where
        M: HermitianOp<T>,
    {
        let n = op.size();
        let m_min = self.params.n_ev;
        let m_max = self.params.n_kr;
        let k_max = self.params.n_conv;
        let tol = T::from_f64(self.params.tol).unwrap();

        if let Some(path) = self.params.vec_infile.clone() {
            return common::evaluate_stored_set(op, &path, k_max, self.params.tol);
        }

        let mut t = vec![T::zero(); n];
        common::prepare_initial_vector(&mut t, guess, self.params.random_seed)?;
        let mut rng = StdRng::seed_from_u64(self.params.random_seed.wrapping_add(1).max(1));

        let mut v_basis: Vec<Vec<T>> = Vec::new();
        let mut w_basis: Vec<Vec<T>> = Vec::new();
        let mut h = DMatrix::<f64>::zeros(0, 0);

        let mut w = vec![T::zero(); n];
        let mut u = vec![T::zero(); n];
        let mut r = vec![T::zero(); n];

        let mut accepted_vecs: Vec<Vec<T>> = Vec::new();
        let mut restart_iter = 0usize;
        let mut op_applies = 0usize;

        while restart_iter < self.params.max_restarts && accepted_vecs.len() < k_max {
            // The expansion is scale-invariant in t; normalizing keeps the
            // breakdown check meaningful when the correction comes back tiny.
            blas::normalize(&mut t);

            // w = (A - tau*I) t
            op.apply(&t, &mut w);
            op_applies += 1;
            if self.tau != T::zero() {
                blas::axpy(-self.tau, &t, &mut w);
            }

            // Oblique orthogonalization: the same coefficient strips w
            // against W and t against V, preserving the w = (A - tau)t tie.
            for (wi, vi) in w_basis.iter().zip(&v_basis) {
                let gamma = blas::dot(wi, &w);
                blas::axpy(-gamma, wi, &mut w);
                blas::axpy(-gamma, vi, &mut t);
            }

            let wnorm = blas::norm(&w);
            if wnorm <= T::eps() {
                return Err(EigError::Breakdown {
                    step: v_basis.len(),
                    beta: wnorm.to_f64().unwrap_or(0.0),
                });
            }
            let inv = wnorm.recip();
            let mut w_new = w.clone();
            blas::scal(inv, &mut w_new);
            let mut v_new = t.clone();
            blas::scal(inv, &mut v_new);
            w_basis.push(w_new);
            v_basis.push(v_new);
            let m = v_basis.len();

            // Grow H = W^H V by one row and column.
            let mut h_new = DMatrix::<f64>::zeros(m, m);
            h_new.view_mut((0, 0), (m - 1, m - 1)).copy_from(&h);
            for i in 0..m - 1 {
                let hij = blas::dot(&w_basis[i], &v_basis[m - 1]).to_f64().unwrap();
                h_new[(i, m - 1)] = hij;
                h_new[(m - 1, i)] = hij;
            }
            h_new[(m - 1, m - 1)] = blas::dot(&w_basis[m - 1], &v_basis[m - 1])
                .to_f64()
                .unwrap();
            h = h_new;

            let eig = dense::eigh_sorted(h.clone())?;

            // Lift the top Ritz pair. V holds obliquely scaled directions,
            // so the lifted vector is renormalized and the Ritz value
            // corrected by the same factor squared.
            let top: Vec<T> = (0..m)
                .map(|j| T::from_f64(eig.vectors[(j, m - 1)]).unwrap())
                .collect();
            lift(&top, &v_basis, &mut u);
            let mu = blas::normalize(&mut u);
            let mut theta = T::from_f64(eig.values[m - 1]).unwrap() / (mu * mu);
            lift(&top, &w_basis, &mut r);
            blas::scal(mu.recip(), &mut r);
            blas::axpy(-theta, &u, &mut r);

            if blas::norm(&r) < tol {
                accepted_vecs.push(u.clone());
                if accepted_vecs.len() == k_max {
                    break;
                }

                // Deflate by truncation: rebuild both subspaces from the
                // remaining Ritz pairs so the accepted direction cannot be
                // extracted again.
                let keep = m - 1;
                if keep == 0 {
                    v_basis.clear();
                    w_basis.clear();
                    h = DMatrix::zeros(0, 0);
                    blas::random_fill(&mut t, &mut rng);
                    common::orthogonalize(&accepted_vecs, &mut t);
                    continue;
                }
                truncate(&mut v_basis, &mut w_basis, &mut h, &eig, keep, 1);

                // Refresh the extraction from the new leading column.
                let mu = blas::norm(&v_basis[0]);
                u.copy_from_slice(&v_basis[0]);
                blas::scal(mu.recip(), &mut u);
                theta = T::from_f64(h[(0, 0)]).unwrap() / (mu * mu);
                r.copy_from_slice(&w_basis[0]);
                blas::scal(mu.recip(), &mut r);
                blas::axpy(-theta, &u, &mut r);
            } else if m >= m_max {
                truncate(&mut v_basis, &mut w_basis, &mut h, &eig, m_min, 0);
                restart_iter += 1;
            }

            // New search direction from the correction equation, seeded by
            // the previous direction and kept clear of accepted pairs.
            let shift = theta + self.tau;
            self.correction.solve(op, shift, &r, &mut t)?;
            common::orthogonalize(&accepted_vecs, &mut t);
            common::orthogonalize(std::slice::from_ref(&u), &mut t);
        }

        let count = accepted_vecs.len();
        let converged = count == k_max;
        let mut evals = vec![T::zero(); count];
        let mut resid = vec![T::zero(); count];
        op_applies += common::compute_evals(op, &accepted_vecs, &mut evals, &mut resid);
        // Report in the operator's eigenvalue scale.
        for e in evals.iter_mut() {
            *e += self.tau;
        }

        if let Some(path) = &self.params.vec_outfile {
            vecio::save_vectors(&accepted_vecs, path)?;
        }

        EigenOutput::from_parts(
            evals,
            &accepted_vecs,
            resid,
            Diagnostics {
                restarts: restart_iter,
                op_applications: op_applies,
                converged,
            },
        )
    }
}

/// `out = sum_j coeffs[j] * vecs[j]`.
fn lift<T: EigFloat>(coeffs: &[T], vecs: &[Vec<T>], out: &mut [T]) {
    for v in out.iter_mut() {
        *v = T::zero();
    }
    blas::block_axpy(coeffs, vecs, out);
}

/// Rebuild `V`, `W` and `H` from `keep` Ritz pairs, in descending eigenvalue
/// order, skipping the top `skip` pairs. `H` collapses to a diagonal because
/// the rebuilt directions are Ritz vectors of the old projected matrix.
fn truncate<T: EigFloat>(
    v_basis: &mut Vec<Vec<T>>,
    w_basis: &mut Vec<Vec<T>>,
    h: &mut DMatrix<f64>,
    eig: &DenseEigen,
    keep: usize,
    skip: usize,
) {
    let m = v_basis.len();
    let n = v_basis[0].len();
    let mut new_v = Vec::with_capacity(keep);
    let mut new_w = Vec::with_capacity(keep);
    let mut new_h = DMatrix::<f64>::zeros(keep, keep);

    for i in 0..keep {
        let col = m - 1 - (skip + i);
        let s: Vec<T> = (0..m)
            .map(|j| T::from_f64(eig.vectors[(j, col)]).unwrap())
            .collect();
        let mut tv = vec![T::zero(); n];
        blas::block_axpy(&s, v_basis, &mut tv);
        let mut tw = vec![T::zero(); n];
        blas::block_axpy(&s, w_basis, &mut tw);
        new_v.push(tv);
        new_w.push(tw);
        new_h[(i, i)] = eig.values[col];
    }

    *v_basis = new_v;
    *w_basis = new_w;
    *h = new_h;
}

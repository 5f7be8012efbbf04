//! Thick-Restart Lanczos (TRLM) for Hermitian operators.
//!
//! One restart cycle expands the Lanczos factorization to `nKr` vectors,
//! eigendecomposes the projected arrow matrix, scans residuals for locked and
//! converged pairs, and recombines the best `iter_keep` Ritz vectors into a
//! compressed basis that seeds the next cycle. The projected problem stays
//! tridiagonal-plus-arrow, so the dense solve cost is negligible next to the
//! operator applications.

use nalgebra::DMatrix;

use crate::basis::KrylovBasis;
use crate::blas;
use crate::common;
use crate::dense;
use crate::error::EigError;
use crate::operator::HermitianOp;
use crate::params::EigParams;
use crate::vecio;
use crate::{Diagnostics, EigFloat, EigenOutput};

/// Per-restart bookkeeping.
///
/// `num_*` counters are cumulative across restarts; `iter_*` counters are
/// relative to `num_locked` and recomputed every cycle from the residual
/// scans.
#[derive(Debug, Clone, Copy, Default)]
struct RestartState {
    num_locked: usize,
    num_converged: usize,
    num_keep: usize,
    restart_iter: usize,
    iter_locked: usize,
    iter_converged: usize,
    iter_keep: usize,
}

pub struct Trlm<T: EigFloat> {
    params: EigParams,
    /// Negate the projected spectrum so the wanted end sorts first.
    reverse: bool,
    alpha: Vec<T>,
    beta: Vec<T>,
    residua: Vec<T>,
    /// Eigenvectors of the latest arrow eigensolve, column per Ritz pair.
    ritz_mat: DMatrix<f64>,
}

impl<T: EigFloat> Trlm<T> {
    pub fn new(params: EigParams) -> Result<Self, EigError> {
        params.validate()?;
        let n_kr = params.n_kr;
        Ok(Self {
            reverse: params.search_reversed(),
            alpha: vec![T::zero(); n_kr],
            beta: vec![T::zero(); n_kr],
            residua: vec![T::zero(); n_kr],
            ritz_mat: DMatrix::zeros(0, 0),
            params,
        })
    }

    /// Run the solver against `op`, optionally starting from `guess`.
    ///
    /// A zero or absent guess is replaced by seeded noise. When a vector
    /// infile is configured the iteration is skipped entirely and the loaded
    /// set is re-evaluated against the operator.
    pub fn solve<M>(&mut self, op: &M, guess: Option<&[T]>) -> Result<EigenOutput<T>, EigError>
    where
        M: HermitianOp<T> + ?Sized,
    {
        let n = op.size();
        let n_ev = self.params.n_ev;
        let n_kr = self.params.n_kr;
        let n_conv = self.params.n_conv;

        if let Some(path) = self.params.vec_infile.clone() {
            return common::evaluate_stored_set(op, &path, n_conv, self.params.tol);
        }

        let mut basis = KrylovBasis::new(n, n_kr + 1);
        common::prepare_initial_vector(basis.vector_mut(0), guess, self.params.random_seed)?;

        let mut r = vec![T::zero(); n];
        let mut mat_norm = T::zero();
        let epsilon = T::eps();
        let tol = T::from_f64(self.params.tol).unwrap();

        let mut st = RestartState::default();
        let mut op_applies = 0usize;
        let mut converged = false;

        // Initial nEv-step factorization before the restart loop takes over.
        for j in 0..n_ev {
            op_applies += self.lanczos_step(op, &mut basis, &mut r, j, st.num_keep)?;
        }

        let mut expand_from = n_ev;
        while st.restart_iter < self.params.max_restarts && !converged {
            for j in expand_from..n_kr {
                op_applies += self.lanczos_step(op, &mut basis, &mut r, j, st.num_keep)?;
            }

            self.arrow_eigensolve(st.num_locked, st.num_keep)?;

            // The projected spectrum bounds the operator norm from below;
            // residual thresholds track its running maximum.
            for i in st.num_locked..n_kr {
                let a = self.alpha[i].abs();
                if a > mat_norm {
                    mat_norm = a;
                }
            }

            self.lock_and_converge(&mut st, mat_norm, epsilon, tol);
            self.compute_kept_ritz(&mut basis, &st);

            st.num_converged = st.num_locked + st.iter_converged;
            st.num_keep = st.num_locked + st.iter_keep;
            st.num_locked += st.iter_locked;
            st.restart_iter += 1;
            expand_from = st.num_keep;

            if st.num_converged >= n_conv {
                self.reorder(&mut basis);
                converged = true;
            }
        }

        // Report what was found even on restart exhaustion; `converged` in
        // the diagnostics tells the two outcomes apart.
        let count = if converged {
            n_conv
        } else {
            st.num_converged.min(n_conv)
        };

        let mut evals = vec![T::zero(); count];
        let mut resid = vec![T::zero(); count];
        op_applies += common::compute_evals(op, basis.leading(count), &mut evals, &mut resid);

        if converged && self.params.compute_svd {
            op_applies += self.compute_svd(op, &mut basis, &mut evals)?;
        }

        if let Some(path) = &self.params.vec_outfile {
            vecio::save_vectors(basis.leading(n_kr), path)?;
        }

        EigenOutput::from_parts(
            evals,
            basis.leading(count),
            resid,
            Diagnostics {
                restarts: st.restart_iter,
                op_applications: op_applies,
                converged,
            },
        )
    }

    /// One step of the Lanczos recursion at position `j`, producing
    /// `v_{j+1}` and the tridiagonal entries `alpha[j]`, `beta[j]`.
    fn lanczos_step<M>(
        &mut self,
        op: &M,
        basis: &mut KrylovBasis<T>,
        r: &mut [T],
        j: usize,
        num_keep: usize,
    ) -> Result<usize, EigError>
    where
        M: HermitianOp<T> + ?Sized,
    {
        let applies = common::cheby_op(op, self.params.poly.as_ref(), r, basis.vector(j))?;

        self.alpha[j] = blas::dot(basis.vector(j), r);
        blas::axpy(-self.alpha[j], basis.vector(j), r);

        // Inside the thick-restart wedge every beta column couples to r; past
        // it only the previous vector does.
        let start = if j > num_keep { j - 1 } else { 0 };
        for i in start..j {
            blas::axpy(-self.beta[i], basis.vector(i), r);
        }

        // Full re-orthogonalization against the basis built so far.
        if j > 0 {
            common::block_orthogonalize(basis.leading(j + 1), r);
        }

        self.beta[j] = blas::norm(r);
        if self.beta[j] <= epsilon_floor(self.alpha[j]) {
            return Err(EigError::Breakdown {
                step: j,
                beta: self.beta[j].to_f64().unwrap_or(0.0),
            });
        }

        let next = basis.vector_mut(j + 1);
        for v in next.iter_mut() {
            *v = T::zero();
        }
        blas::axpy(self.beta[j].recip(), r, next);
        Ok(applies)
    }

    /// Eigendecompose the projected arrow matrix over the unlocked window.
    ///
    /// The arrow head covers the kept Ritz block (dense row and column up to
    /// `arrow_pos`), the tail is the fresh tridiagonal part. Ritz values land
    /// back in `alpha`, estimated residuals in `residua`, and the rotation in
    /// `ritz_mat`.
    fn arrow_eigensolve(&mut self, num_locked: usize, num_keep: usize) -> Result<(), EigError> {
        let n_kr = self.params.n_kr;
        let dim = n_kr - num_locked;
        let arrow_pos = (num_keep.saturating_sub(num_locked) + 1).max(2);
        let sign = if self.reverse { -1.0 } else { 1.0 };

        let mut mat = DMatrix::<f64>::zeros(dim, dim);
        for i in 0..dim {
            mat[(i, i)] = sign * self.alpha[num_locked + i].to_f64().unwrap();
        }
        for i in 0..arrow_pos - 1 {
            let b = sign * self.beta[num_locked + i].to_f64().unwrap();
            mat[(i, arrow_pos - 1)] = b;
            mat[(arrow_pos - 1, i)] = b;
        }
        for i in arrow_pos - 1..dim - 1 {
            let b = sign * self.beta[num_locked + i].to_f64().unwrap();
            mat[(i, i + 1)] = b;
            mat[(i + 1, i)] = b;
        }

        let eig = dense::eigh_sorted(mat)?;
        self.ritz_mat = eig.vectors;

        let beta_last = self.beta[n_kr - 1];
        for i in 0..dim {
            self.alpha[num_locked + i] = T::from_f64(sign * eig.values[i]).unwrap();
            let tail = T::from_f64(self.ritz_mat[(dim - 1, i)]).unwrap();
            self.residua[num_locked + i] = (beta_last * tail).abs();
        }
        Ok(())
    }

    /// Scan estimated residuals for locked (machine-precision) and converged
    /// (user-tolerance) pairs, then pick how much of the subspace to keep.
    fn lock_and_converge(&self, st: &mut RestartState, mat_norm: T, epsilon: T, tol: T) {
        let n_kr = self.params.n_kr;
        let window = n_kr - st.num_locked;

        // Both scans stop at the first gap: a pair past an unconverged one is
        // not trusted even if its estimate happens to be small.
        st.iter_locked = 0;
        for i in 1..window {
            if self.residua[st.num_locked + i] < epsilon * mat_norm {
                st.iter_locked = i;
            } else {
                break;
            }
        }

        st.iter_converged = st.iter_locked;
        for i in st.iter_locked + 1..window {
            if self.residua[st.num_locked + i] < tol * mat_norm {
                st.iter_converged = i;
            } else {
                break;
            }
        }

        let slack = (n_kr - st.num_converged) / 2;
        st.iter_keep = (st.iter_converged + slack).min(window.saturating_sub(12));
    }

    /// Rotate the basis by the leading `iter_keep` columns of `ritz_mat` and
    /// re-seed the residual column, compressing `nKr` vectors down to
    /// `num_locked + iter_keep + 1`.
    fn compute_kept_ritz(&mut self, basis: &mut KrylovBasis<T>, st: &RestartState) {
        let n_kr = self.params.n_kr;
        let dim = n_kr - st.num_locked;
        let beta_last = self.beta[n_kr - 1];

        basis.ensure_scratch(st.iter_keep);
        for i in 0..st.iter_keep {
            let coeffs: Vec<T> = (0..dim)
                .map(|j| T::from_f64(self.ritz_mat[(j, i)]).unwrap())
                .collect();
            let (active, out) = basis.active_and_scratch_mut(i);
            for v in out.iter_mut() {
                *v = T::zero();
            }
            blas::block_axpy(&coeffs, &active[st.num_locked..st.num_locked + dim], out);
        }
        for i in 0..st.iter_keep {
            basis.promote_scratch(i, st.num_locked + i);
        }
        // The residual vector v_{nKr} becomes the next expansion seed.
        basis.copy_within(n_kr, st.num_locked + st.iter_keep);

        // Coupling of each kept Ritz vector to the new seed.
        for i in 0..st.iter_keep {
            let tail = T::from_f64(self.ritz_mat[(dim - 1, i)]).unwrap();
            self.beta[st.num_locked + i] = beta_last * tail;
        }
    }

    /// Sort converged pairs into the user-facing order: ascending for
    /// smallest-first targets, descending otherwise. Insertion-style swaps
    /// keep `alpha` and the basis in lockstep.
    fn reorder(&mut self, basis: &mut KrylovBasis<T>) {
        let n_kr = self.params.n_kr;
        let mut i = 1;
        while i < n_kr {
            let ordered = if self.reverse {
                self.alpha[i - 1] >= self.alpha[i]
            } else {
                self.alpha[i - 1] <= self.alpha[i]
            };
            if ordered {
                i += 1;
            } else {
                self.alpha.swap(i - 1, i);
                self.residua.swap(i - 1, i);
                basis.swap(i - 1, i);
                if i > 1 {
                    i -= 1;
                }
            }
        }
    }

    /// Recover singular pairs of the factor `M` when the operator is `M^H M`.
    ///
    /// The first `nConv/2` basis vectors are right singular vectors; applying
    /// the factor to each yields `sigma_i * u_i`, so the second half of the
    /// output block is overwritten with normalized left singular vectors and
    /// the eigenvalues are replaced by duplicated singular values.
    fn compute_svd<M>(
        &self,
        op: &M,
        basis: &mut KrylovBasis<T>,
        evals: &mut [T],
    ) -> Result<usize, EigError>
    where
        M: HermitianOp<T> + ?Sized,
    {
        let half = self.params.n_conv / 2;
        let mut sigmas = vec![T::zero(); half];
        for i in 0..half {
            let (right, left) = basis.pair_mut(i, half + i);
            op.apply_factor(right, left)?;
            sigmas[i] = blas::normalize(left);
        }
        for i in 0..half {
            evals[2 * i] = sigmas[i];
            evals[2 * i + 1] = sigmas[i];
        }
        Ok(half)
    }
}

/// Breakdown threshold for a normalization denominator.
fn epsilon_floor<T: EigFloat>(alpha: T) -> T {
    let scale = alpha.abs();
    T::eps() * if scale > T::one() { scale } else { T::one() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::DiagonalOp;
    use crate::params::{PolyAcc, Spectrum};

    fn diag_op(n: usize) -> DiagonalOp<f64> {
        DiagonalOp::new((1..=n).map(|i| i as f64).collect())
    }

    fn base_params() -> EigParams {
        let mut p = EigParams::new(10, 20, 5);
        p.tol = 1.0e-10;
        p.random_seed = 42;
        p
    }

    fn check_orthonormal(out: &EigenOutput<f64>) {
        let k = out.evals.len();
        for i in 0..k {
            for j in 0..k {
                let d: f64 = out
                    .evecs
                    .row(i)
                    .iter()
                    .zip(out.evecs.row(j).iter())
                    .map(|(a, b)| a * b)
                    .sum();
                let expect = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (d - expect).abs() < 1e-8,
                    "gram[{i}][{j}] = {d}, expected {expect}"
                );
            }
        }
    }

    #[test]
    fn smallest_eigenvalues_of_a_diagonal_operator() {
        let op = diag_op(50);
        let mut solver = Trlm::new(base_params()).unwrap();
        let out = solver.solve(&op, None).unwrap();

        assert!(out.diagnostics.converged);
        assert_eq!(out.evals.len(), 5);
        for (i, ev) in out.evals.iter().enumerate() {
            assert!(
                (ev - (i + 1) as f64).abs() < 1e-8,
                "eval[{i}] = {ev}"
            );
        }
        let mat_norm = 50.0;
        for r in out.residua.iter() {
            assert!(*r < 1e-10 * mat_norm * 10.0, "residual {r}");
        }
        check_orthonormal(&out);
        assert!(out.diagnostics.op_applications > 0);
    }

    #[test]
    fn largest_eigenvalues_come_out_descending() {
        let op = diag_op(50);
        let mut p = base_params();
        p.spectrum = Spectrum::LARGEST_REAL;
        let mut solver = Trlm::new(p).unwrap();
        let out = solver.solve(&op, None).unwrap();

        assert!(out.diagnostics.converged);
        for (i, ev) in out.evals.iter().enumerate() {
            assert!(
                (ev - (50 - i) as f64).abs() < 1e-8,
                "eval[{i}] = {ev}"
            );
        }
    }

    #[test]
    fn chebyshev_acceleration_finds_the_smallest_pairs() {
        let op = diag_op(50);
        let mut p = base_params();
        p.poly = Some(PolyAcc {
            degree: 10,
            a_min: 5.5,
            a_max: 50.5,
        });
        let mut solver = Trlm::new(p).unwrap();
        let out = solver.solve(&op, None).unwrap();

        assert!(out.diagnostics.converged);
        for (i, ev) in out.evals.iter().enumerate() {
            assert!(
                (ev - (i + 1) as f64).abs() < 1e-7,
                "eval[{i}] = {ev}"
            );
        }
        check_orthonormal(&out);
    }

    #[test]
    fn zero_guess_is_replaced_by_noise() {
        let op = diag_op(50);
        let zeros = vec![0.0f64; 50];
        let mut solver = Trlm::new(base_params()).unwrap();
        let out = solver.solve(&op, Some(&zeros)).unwrap();
        assert!(out.diagnostics.converged);
        assert!(out.evals.iter().all(|e| e.is_finite()));
    }

    #[test]
    fn wrong_guess_length_is_rejected() {
        let op = diag_op(50);
        let short = vec![1.0f64; 10];
        let mut solver = Trlm::new(base_params()).unwrap();
        assert!(matches!(
            solver.solve(&op, Some(&short)),
            Err(EigError::Config(_))
        ));
    }

    #[test]
    fn exhausted_restarts_report_a_partial_result() {
        // 400 well-spread eigenvalues cannot be pinned down to 1e-12 in a
        // single restart cycle.
        let op = diag_op(400);
        let mut p = base_params();
        p.tol = 1.0e-12;
        p.max_restarts = 1;
        let mut solver = Trlm::new(p).unwrap();
        let out = solver.solve(&op, None).unwrap();

        assert!(!out.diagnostics.converged);
        assert_eq!(out.diagnostics.restarts, 1);
        assert!(out.evals.len() <= 5);
    }

    #[test]
    fn breakdown_is_surfaced_when_the_subspace_exhausts() {
        // A 12-dimensional operator cannot support 20 Krylov directions:
        // once the basis spans the whole space the next residual vanishes.
        let op = diag_op(12);
        let mut solver = Trlm::new(base_params()).unwrap();
        assert!(matches!(
            solver.solve(&op, None),
            Err(EigError::Breakdown { .. })
        ));
    }

    #[test]
    fn singular_values_of_the_factor() {
        // A = diag(1..50) as M^H M with M = diag(sqrt(i)); the four smallest
        // eigenpairs give singular values 1 and sqrt(2), each twice.
        let op = diag_op(50);
        let mut p = base_params();
        p.n_conv = 4;
        p.compute_svd = true;
        let mut solver = Trlm::new(p).unwrap();
        let out = solver.solve(&op, None).unwrap();

        assert!(out.diagnostics.converged);
        assert!((out.evals[0] - 1.0).abs() < 1e-8);
        assert!((out.evals[1] - 1.0).abs() < 1e-8);
        assert!((out.evals[2] - 2.0f64.sqrt()).abs() < 1e-8);
        assert!((out.evals[3] - 2.0f64.sqrt()).abs() < 1e-8);
    }

    #[test]
    fn reorder_sorts_pairs_and_vectors_together() {
        let mut p = EigParams::new(10, 20, 5);
        p.random_seed = 1;
        let mut solver = Trlm::<f64>::new(p).unwrap();
        let mut basis = KrylovBasis::new(1, 21);
        for i in 0..20 {
            solver.alpha[i] = ((7 * i + 3) % 20) as f64;
            basis.vector_mut(i)[0] = solver.alpha[i];
        }
        solver.reorder(&mut basis);
        for i in 1..20 {
            assert!(solver.alpha[i - 1] <= solver.alpha[i]);
            assert_eq!(basis.vector(i)[0], solver.alpha[i]);
        }
    }

    #[test]
    fn reorder_descends_for_reversed_searches() {
        let mut p = EigParams::new(10, 20, 5);
        p.spectrum = Spectrum::LARGEST_REAL;
        let mut solver = Trlm::<f64>::new(p).unwrap();
        let mut basis = KrylovBasis::new(1, 21);
        for i in 0..20 {
            solver.alpha[i] = ((13 * i + 5) % 20) as f64;
            basis.vector_mut(i)[0] = solver.alpha[i];
        }
        solver.reorder(&mut basis);
        for i in 1..20 {
            assert!(solver.alpha[i - 1] >= solver.alpha[i]);
            assert_eq!(basis.vector(i)[0], solver.alpha[i]);
        }
    }
}

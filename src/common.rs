//! Utilities shared by every solver family: polynomial-accelerated operator
//! application, orthogonalization, Rayleigh-quotient evaluation and deflation.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::blas;
use crate::error::EigError;
use crate::operator::HermitianOp;
use crate::params::PolyAcc;
use crate::vecio;
use crate::{Diagnostics, EigFloat, EigenOutput};

/// Apply the (optionally Chebyshev-accelerated) operator: `out = T_d(A) in`.
///
/// With no acceleration this is a plain `A * in`. The polynomial maps the
/// damping window `[a_min, a_max]` onto `[-1, 1]` so eigenvalues outside it
/// are amplified relative to those inside. Returns the number of operator
/// applications performed.
pub fn cheby_op<T, M>(
    op: &M,
    poly: Option<&PolyAcc>,
    out: &mut [T],
    input: &[T],
) -> Result<usize, EigError>
where
    T: EigFloat,
    M: HermitianOp<T> + ?Sized,
{
    let poly = match poly {
        None => {
            op.apply(input, out);
            return Ok(1);
        }
        Some(p) => p,
    };

    if poly.degree == 0 {
        return Err(EigError::Config(
            "polynomial acceleration requested with zero degree".to_string(),
        ));
    }

    let two = T::from_f64(2.0).unwrap();
    let a = T::from_f64(poly.a_min).unwrap();
    let b = T::from_f64(poly.a_max).unwrap();

    let delta = (b - a) / two;
    let theta = (b + a) / two;
    let sigma1 = -delta / theta;

    // C_1(x) = x: out = d2*in + d1*(A*in)
    let d1 = sigma1 / delta;
    let d2 = T::one();
    op.apply(input, out);
    blas::axpby(d2, input, d1, out);
    if poly.degree == 1 {
        return Ok(1);
    }

    // Three-term recursion C_{m+1}(x) = 2*x*C_m(x) - C_{m-1}(x), scaled.
    let mut tmp1 = input.to_vec();
    let mut tmp2 = out.to_vec();
    let mut sigma_old = sigma1;

    let mut applies = 1;
    for _ in 2..=poly.degree {
        let sigma = (two / sigma1 - sigma_old).recip();
        let d1 = two * sigma / delta;
        let d2 = -d1 * theta;
        let d3 = -sigma * sigma_old;

        op.apply(&tmp2, out);
        applies += 1;

        // out = d1*(A*tmp2) + d2*tmp2 + d3*tmp1
        blas::scal(d1, out);
        blas::axpy(d2, &tmp2, out);
        blas::axpy(d3, &tmp1, out);

        tmp1.copy_from_slice(&tmp2);
        tmp2.copy_from_slice(out);
        sigma_old = sigma;
    }

    Ok(applies)
}

/// Prepare a starting vector: validate a supplied guess, replace a zero
/// vector by seeded noise, and normalize. A seed of 0 draws one from the
/// clock.
pub(crate) fn prepare_initial_vector<T: EigFloat>(
    v: &mut [T],
    guess: Option<&[T]>,
    random_seed: u64,
) -> Result<(), EigError> {
    if let Some(g) = guess {
        if g.len() != v.len() {
            return Err(EigError::Config(format!(
                "initial guess has length {}, operator dimension is {}",
                g.len(),
                v.len()
            )));
        }
        v.copy_from_slice(g);
    }
    if blas::norm(v) == T::zero() {
        let seed = match random_seed {
            0 => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(1),
            s => s,
        };
        blas::random_fill(v, &mut StdRng::seed_from_u64(seed));
    }
    blas::normalize(v);
    Ok(())
}

/// Skip the iteration entirely: load a stored vector set and re-evaluate it
/// against the operator. Convergence is judged from the recomputed residuals
/// with the largest loaded eigenvalue standing in for the matrix norm.
pub(crate) fn evaluate_stored_set<T, M>(
    op: &M,
    path: &Path,
    n_conv: usize,
    tol: f64,
) -> Result<EigenOutput<T>, EigError>
where
    T: EigFloat,
    M: HermitianOp<T> + ?Sized,
{
    let vectors: Vec<Vec<T>> = vecio::load_vectors(path, op.size())?;
    if vectors.len() < n_conv {
        return Err(EigError::VecIo(format!(
            "{} holds {} vectors, {} requested",
            path.display(),
            vectors.len(),
            n_conv
        )));
    }

    let mut evals = vec![T::zero(); n_conv];
    let mut resid = vec![T::zero(); n_conv];
    let op_applies = compute_evals(op, &vectors[..n_conv], &mut evals, &mut resid);

    let mat_norm = evals
        .iter()
        .map(|e| e.abs())
        .fold(T::zero(), |a, b| if b > a { b } else { a });
    let tol = T::from_f64(tol).unwrap();
    let converged = resid.iter().all(|r| *r < tol * mat_norm);

    EigenOutput::from_parts(
        evals,
        &vectors[..n_conv],
        resid,
        Diagnostics {
            restarts: 0,
            op_applications: op_applies,
            converged,
        },
    )
}

/// Remove from `r` its projection onto each vector of `vecs`, one inner
/// product and one scaled subtraction at a time.
///
/// Returns the sum of the removed coefficients, a diagnostic only.
pub fn orthogonalize<T: EigFloat>(vecs: &[Vec<T>], r: &mut [T]) -> T {
    let mut sum = T::zero();
    for v in vecs {
        let s = blas::dot(v, r);
        sum += s;
        blas::axpy(-s, v, r);
    }
    sum
}

/// Block form of [`orthogonalize`]: all inner products in one batched
/// reduction, all subtractions in one batched update. Chosen when round-trips
/// to the parallel backend dominate.
pub fn block_orthogonalize<T: EigFloat>(vecs: &[Vec<T>], r: &mut [T]) -> T {
    let mut s = blas::block_dot(vecs, r);
    let mut sum = T::zero();
    for c in s.iter_mut() {
        sum += *c;
        *c = -*c;
    }
    blas::block_axpy(&s, vecs, r);
    sum
}

/// Rayleigh-quotient evaluation of eigenvalue estimates and exact residuals.
///
/// For each vector: `lambda_i = <v_i, A v_i> / <v_i, v_i>` and
/// `residua_i = ||A v_i - lambda_i v_i||`. Returns the operator application
/// count.
pub fn compute_evals<T, M>(op: &M, vecs: &[Vec<T>], evals: &mut [T], residua: &mut [T]) -> usize
where
    T: EigFloat,
    M: HermitianOp<T> + ?Sized,
{
    debug_assert!(evals.len() <= vecs.len());
    let n = op.size();
    let mut r = vec![T::zero(); n];
    for (i, v) in vecs.iter().take(evals.len()).enumerate() {
        op.apply(v, &mut r);
        let lambda = blas::dot(v, &r) / blas::dot(v, v);
        blas::axpy(-lambda, v, &mut r);
        evals[i] = lambda;
        residua[i] = blas::norm(&r);
    }
    evals.len()
}

/// Deflate `vec` against known eigenpairs:
/// `out = sum_i V_i * lambda_i^{-1} * <V_i, vec>`.
///
/// An approximate inverse restricted to the span of the known eigenvectors,
/// used to precondition subsequent linear solves. An empty pair set yields
/// the zero vector.
pub fn deflate<T: EigFloat>(out: &mut [T], vec: &[T], evecs: &[Vec<T>], evals: &[T]) {
    debug_assert_eq!(evecs.len(), evals.len());
    for ov in out.iter_mut() {
        *ov = T::zero();
    }
    if evecs.is_empty() {
        return;
    }
    let mut s = blas::block_dot(evecs, vec);
    for (c, lambda) in s.iter_mut().zip(evals) {
        *c = *c / *lambda;
    }
    blas::block_axpy(&s, evecs, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blas::{dot, norm};
    use crate::operator::DiagonalOp;

    fn diag_op(n: usize) -> DiagonalOp<f64> {
        DiagonalOp::new((1..=n).map(|i| i as f64).collect())
    }

    #[test]
    fn no_acceleration_is_plain_apply() {
        let op = diag_op(4);
        let x = vec![1.0, 1.0, 1.0, 1.0];
        let mut y = vec![0.0; 4];
        let applies = cheby_op(&op, None, &mut y, &x).unwrap();
        assert_eq!(applies, 1);
        assert_eq!(y, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn zero_degree_is_rejected() {
        let op = diag_op(2);
        let poly = PolyAcc {
            degree: 0,
            a_min: 1.0,
            a_max: 2.0,
        };
        let x = vec![1.0, 1.0];
        let mut y = vec![0.0; 2];
        assert!(matches!(
            cheby_op(&op, Some(&poly), &mut y, &x),
            Err(EigError::Config(_))
        ));
    }

    #[test]
    fn degree_one_is_the_bare_linear_map() {
        let op = diag_op(5);
        let poly = PolyAcc {
            degree: 1,
            a_min: 2.0,
            a_max: 6.0,
        };
        let x = vec![1.0, -1.0, 2.0, 0.5, 1.0];
        let mut y = vec![0.0; 5];
        cheby_op(&op, Some(&poly), &mut y, &x).unwrap();

        let delta = (6.0 - 2.0) / 2.0;
        let theta = (6.0 + 2.0) / 2.0;
        let d1 = (-delta / theta) / delta;
        let mut expect = vec![0.0; 5];
        op.apply(&x, &mut expect);
        for (e, xv) in expect.iter_mut().zip(&x) {
            *e = d1 * *e + *xv;
        }
        assert_eq!(y, expect);
    }

    #[test]
    fn high_degree_amplifies_outside_the_window() {
        // Window covers [2, 6]; the eigenvalue 1 sits outside and must be
        // amplified relative to everything inside.
        let op = diag_op(6);
        let poly = PolyAcc {
            degree: 8,
            a_min: 2.0,
            a_max: 6.5,
        };
        let x = vec![1.0; 6];
        let mut y = vec![0.0; 6];
        let applies = cheby_op(&op, Some(&poly), &mut y, &x).unwrap();
        assert_eq!(applies, 8);
        let outside = y[0].abs();
        let inside_max = y[1..]
            .iter()
            .map(|v| v.abs())
            .fold(0.0f64, f64::max);
        assert!(
            outside > 100.0 * inside_max,
            "outside = {outside}, inside max = {inside_max}"
        );
    }

    #[test]
    fn orthogonalize_removes_projections() {
        let e0 = vec![1.0, 0.0, 0.0];
        let e1 = vec![0.0, 1.0, 0.0];
        let basis = vec![e0.clone(), e1.clone()];

        let mut r: Vec<f64> = vec![3.0, -2.0, 5.0];
        let sum = orthogonalize(&basis, &mut r);
        assert!((sum - 1.0).abs() < 1e-14);
        assert!(dot(&e0, &r).abs() < 1e-14);
        assert!(dot(&e1, &r).abs() < 1e-14);
        assert!((r[2] - 5.0).abs() < 1e-14);
    }

    #[test]
    fn block_form_matches_single_vector_form() {
        let basis = vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]];
        let mut r1: Vec<f64> = vec![0.25, -0.75, 1.0, 2.0];
        let mut r2 = r1.clone();
        let s1 = orthogonalize(&basis, &mut r1);
        let s2 = block_orthogonalize(&basis, &mut r2);
        assert!((s1 - s2).abs() < 1e-14);
        for (a, b) in r1.iter().zip(&r2) {
            assert!((a - b).abs() < 1e-14);
        }
    }

    #[test]
    fn rayleigh_quotient_on_eigenvectors() {
        let op = diag_op(4);
        let vecs: Vec<Vec<f64>> = (0..4)
            .map(|i| {
                let mut v = vec![0.0; 4];
                v[i] = 1.0;
                v
            })
            .collect();
        let mut evals = vec![0.0; 4];
        let mut residua = vec![0.0; 4];
        compute_evals(&op, &vecs, &mut evals, &mut residua);
        assert_eq!(evals, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(residua.iter().all(|r| *r < 1e-14));
    }

    #[test]
    fn deflate_with_empty_set_is_zero() {
        let mut out = vec![7.0, 7.0, 7.0];
        deflate(&mut out, &[1.0, 2.0, 3.0], &[], &[]);
        assert_eq!(out, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn deflate_inverts_on_known_span() {
        // out = V diag(1/lambda) V^T vec; for eigenvectors of diag(2, 5) the
        // action on the span is exact inversion.
        let evecs = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let evals = vec![2.0, 5.0];
        let vec = vec![4.0, 10.0];
        let mut out: Vec<f64> = vec![0.0; 2];
        deflate(&mut out, &vec, &evecs, &evals);
        assert!((out[0] - 2.0).abs() < 1e-14);
        assert!((out[1] - 2.0).abs() < 1e-14);
        assert!(norm(&out) > 0.0);
    }
}

//! Data-parallel vector kernels.
//!
//! Every reduction returns one scalar regardless of how rayon partitions the
//! work: chunk boundaries depend only on the vector length and thread count,
//! and partial sums are combined in chunk order.

use rand::rngs::StdRng;
use rand_distr::{Distribution, Uniform};
use rayon::prelude::*;

use crate::EigFloat;

/// Chunk size balancing rayon scheduling overhead against parallelism.
pub(crate) fn chunk_size(n: usize) -> usize {
    let num_threads = rayon::current_num_threads();

    let min_per_thread = 1024;
    let desired_chunks_per_thread = 4;

    let target_total_chunks = num_threads * desired_chunks_per_thread;
    let chunk = n.div_ceil(target_total_chunks.max(1));

    chunk.max(min_per_thread)
}

/// Inner product `<x, y>`.
pub fn dot<T: EigFloat>(x: &[T], y: &[T]) -> T {
    debug_assert_eq!(x.len(), y.len());
    let chunk = chunk_size(x.len());
    x.par_chunks(chunk)
        .zip(y.par_chunks(chunk))
        .map(|(xs, ys)| xs.iter().zip(ys).map(|(a, b)| *a * *b).sum::<T>())
        .sum()
}

/// Euclidean norm `||x||`.
pub fn norm<T: EigFloat>(x: &[T]) -> T {
    dot(x, x).sqrt()
}

/// `y += a * x`.
pub fn axpy<T: EigFloat>(a: T, x: &[T], y: &mut [T]) {
    debug_assert_eq!(x.len(), y.len());
    let chunk = chunk_size(x.len());
    y.par_chunks_mut(chunk)
        .zip(x.par_chunks(chunk))
        .for_each(|(ys, xs)| {
            for (yv, xv) in ys.iter_mut().zip(xs) {
                *yv += a * *xv;
            }
        });
}

/// `y = a * x + b * y`.
pub fn axpby<T: EigFloat>(a: T, x: &[T], b: T, y: &mut [T]) {
    debug_assert_eq!(x.len(), y.len());
    let chunk = chunk_size(x.len());
    y.par_chunks_mut(chunk)
        .zip(x.par_chunks(chunk))
        .for_each(|(ys, xs)| {
            for (yv, xv) in ys.iter_mut().zip(xs) {
                *yv = a * *xv + b * *yv;
            }
        });
}

/// `x *= a`.
pub fn scal<T: EigFloat>(a: T, x: &mut [T]) {
    let chunk = chunk_size(x.len());
    x.par_chunks_mut(chunk).for_each(|xs| {
        for xv in xs.iter_mut() {
            *xv *= a;
        }
    });
}

/// Batched inner products `<v_i, r>` for every vector in `vecs`.
///
/// One reduction round-trip instead of `vecs.len()` sequential ones.
pub fn block_dot<T: EigFloat>(vecs: &[Vec<T>], r: &[T]) -> Vec<T> {
    vecs.par_iter()
        .map(|v| v.iter().zip(r).map(|(a, b)| *a * *b).sum::<T>())
        .collect()
}

/// Batched update `out += sum_i coeffs[i] * vecs[i]`.
pub fn block_axpy<T: EigFloat>(coeffs: &[T], vecs: &[Vec<T>], out: &mut [T]) {
    debug_assert_eq!(coeffs.len(), vecs.len());
    let n = out.len();
    let chunk = chunk_size(n);
    out.par_chunks_mut(chunk)
        .enumerate()
        .for_each(|(ci, outs)| {
            let off = ci * chunk;
            for (c, v) in coeffs.iter().zip(vecs) {
                let vs = &v[off..off + outs.len()];
                for (ov, vv) in outs.iter_mut().zip(vs) {
                    *ov += *c * *vv;
                }
            }
        });
}

/// Fill `x` with uniform noise in (-1, 1).
pub fn random_fill<T: EigFloat>(x: &mut [T], rng: &mut StdRng) {
    let dist = Uniform::new(-1.0f64, 1.0).unwrap();
    for xv in x.iter_mut() {
        *xv = T::from_f64(dist.sample(rng)).unwrap();
    }
}

/// Normalize `x` in place, returning the prior norm.
pub fn normalize<T: EigFloat>(x: &mut [T]) -> T {
    let nrm = norm(x);
    if nrm > T::zero() {
        scal(nrm.recip(), x);
    }
    nrm
}

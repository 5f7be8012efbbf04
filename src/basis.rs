//! Index-addressed storage for the Krylov basis.
//!
//! A fixed pool of `active` vectors (`nKr + 1` for TRLM: the basis plus the
//! next-vector slot) with a scratch region appended past the active range for
//! Ritz recombination. Writes into scratch never alias reads from the active
//! range, so recombination needs no temporary clones.

use crate::EigFloat;

#[derive(Debug, Clone)]
pub struct KrylovBasis<T> {
    dim: usize,
    active: usize,
    vecs: Vec<Vec<T>>,
}

impl<T: EigFloat> KrylovBasis<T> {
    /// A pool of `active` zero vectors of length `dim`.
    pub fn new(dim: usize, active: usize) -> Self {
        Self {
            dim,
            active,
            vecs: (0..active).map(|_| vec![T::zero(); dim]).collect(),
        }
    }

    pub fn vector(&self, i: usize) -> &[T] {
        &self.vecs[i]
    }

    pub fn vector_mut(&mut self, i: usize) -> &mut [T] {
        &mut self.vecs[i]
    }

    /// The first `n` active vectors, for batched kernels.
    pub fn leading(&self, n: usize) -> &[Vec<T>] {
        &self.vecs[..n]
    }

    /// Grow the scratch region to hold `count` vectors past the active range.
    pub fn ensure_scratch(&mut self, count: usize) {
        while self.vecs.len() < self.active + count {
            self.vecs.push(vec![T::zero(); self.dim]);
        }
    }

    /// Disjoint views of the active range and scratch vector `k`.
    pub fn active_and_scratch_mut(&mut self, k: usize) -> (&[Vec<T>], &mut [T]) {
        let (active, scratch) = self.vecs.split_at_mut(self.active);
        (active, &mut scratch[k])
    }

    /// Copy scratch vector `k` into active slot `dst`.
    pub fn promote_scratch(&mut self, k: usize, dst: usize) {
        debug_assert!(dst < self.active);
        let (active, scratch) = self.vecs.split_at_mut(self.active);
        active[dst].copy_from_slice(&scratch[k]);
    }

    /// Copy active vector `src` into active slot `dst`.
    pub fn copy_within(&mut self, src: usize, dst: usize) {
        if src == dst {
            return;
        }
        let (lo, hi) = if src < dst { (src, dst) } else { (dst, src) };
        let (head, tail) = self.vecs.split_at_mut(hi);
        if src < dst {
            tail[0].copy_from_slice(&head[lo]);
        } else {
            head[lo].copy_from_slice(&tail[0]);
        }
    }

    /// Disjoint read/write views of two distinct vectors.
    pub fn pair_mut(&mut self, read: usize, write: usize) -> (&[T], &mut [T]) {
        debug_assert_ne!(read, write);
        if read < write {
            let (head, tail) = self.vecs.split_at_mut(write);
            (&head[read], &mut tail[0])
        } else {
            let (head, tail) = self.vecs.split_at_mut(read);
            (&tail[0], &mut head[write])
        }
    }

    pub fn swap(&mut self, i: usize, j: usize) {
        self.vecs.swap(i, j);
    }
}

//! Threshold kernel: pairwise correlation over a local/peer column pair
//!
//! This is the arithmetic heart of the crate (§4.3), the direct Rust
//! transliteration of the upstream `BTools.do_thresh` loop: for every
//! (local column, peer column) pair, sweep every pair of 3-D points inside
//! those two columns, estimate variance/covariance/correlation from the
//! ensemble axis, and keep the pair if `|ρ| >= τ`.
//!
//! The output buffer follows the "grow, never shrink mid-build" discipline
//! the teacher crate used for its streamed proof buffers: callers reuse one
//! [`TripleBuffer`] across every peer in the build loop, and it only ever
//! doubles its capacity, never reallocates smaller.

use crate::index::{ijk_to_flat, ColIdx, RowIdx};
use crate::slab::PaddedSlabView;

/// One retained `(covariance, row, column)` record.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Triple {
    pub b: f64,
    pub i: RowIdx,
    pub j: ColIdx,
}

/// Growable columnar store for retained triples. Capacity only ever
/// increases (doubling), matching the source's "reallocate, never discard"
/// buffer policy (§4.3).
#[derive(Debug, Default)]
pub struct TripleBuffer {
    b: Vec<f64>,
    i: Vec<RowIdx>,
    j: Vec<ColIdx>,
}

impl TripleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            b: Vec::with_capacity(cap),
            i: Vec::with_capacity(cap),
            j: Vec::with_capacity(cap),
        }
    }

    /// Ensure room for `additional` more triples, doubling current capacity
    /// if that is not already enough.
    pub fn reserve_doubling(&mut self, additional: usize) {
        let needed = self.b.len() + additional;
        if self.b.capacity() < needed {
            let grown = (self.b.capacity() * 2).max(needed);
            self.b.reserve(grown - self.b.len());
            self.i.reserve(grown - self.i.len());
            self.j.reserve(grown - self.j.len());
        }
    }

    #[inline]
    pub fn push(&mut self, t: Triple) {
        self.b.push(t.b);
        self.i.push(t.i);
        self.j.push(t.j);
    }

    pub fn len(&self) -> usize {
        self.b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.b.is_empty()
    }

    /// Parallel columnar slices, in emission order.
    pub fn columns(&self) -> (&[f64], &[RowIdx], &[ColIdx]) {
        (&self.b, &self.i, &self.j)
    }

    /// Consume into owned parallel vectors.
    pub fn into_columns(self) -> (Vec<f64>, Vec<RowIdx>, Vec<ColIdx>) {
        (self.b, self.i, self.j)
    }

    pub fn iter(&self) -> impl Iterator<Item = Triple> + '_ {
        (0..self.b.len()).map(move |n| Triple {
            b: self.b[n],
            i: self.i[n],
            j: self.j[n],
        })
    }
}

/// Stateless pairwise correlation kernel. Holds only the grid shape needed
/// to turn local (slice-point, column) pairs into global linear indices;
/// all numeric work is pure per-call.
pub struct ThresholdKernel {
    nx: usize,
    ny: usize,
    threshold: f64,
}

impl ThresholdKernel {
    pub fn new(nx: usize, ny: usize, threshold: f64) -> Self {
        Self { nx, ny, threshold }
    }

    /// Run the kernel for this rank's local slab against one peer's
    /// (possibly padded) slab, appending retained triples to `out`.
    ///
    /// `ib_local`/`ib_peer` are the owning ranks' starting x-columns (the
    /// `range(...).ib` each side computed independently); `n_slice = Nz*Ny`
    /// must match on both sides.
    pub fn accumulate(
        &self,
        local: &PaddedSlabView<'_>,
        peer: &PaddedSlabView<'_>,
        ib_local: usize,
        ib_peer: usize,
        out: &mut TripleBuffer,
    ) {
        debug_assert_eq!(local.e(), peer.e());
        debug_assert_eq!(local.n_slice(), peer.n_slice());
        let e = local.e() as f64;
        let n_slice = local.n_slice();

        out.reserve_doubling(local.n_local() * peer.n_local() * n_slice);

        for ui in 0..local.n_local() {
            for vi in 0..peer.n_local() {
                for p in 0..n_slice {
                    let var_p = mean_square(local, p, ui);
                    for q in 0..n_slice {
                        let var_q = mean_square(peer, q, vi);
                        let denom = var_p * var_q;
                        if denom == 0.0 {
                            continue;
                        }
                        let covar = covariance(local, peer, p, ui, q, vi);
                        let rho = covar.abs() / denom.sqrt();
                        if rho >= self.threshold {
                            let (j_local, k_local) = (p % self.ny, p / self.ny);
                            let (j_peer, k_peer) = (q % self.ny, q / self.ny);
                            let row = ijk_to_flat(ib_local + ui, j_local, k_local, self.nx, self.ny);
                            let col = ijk_to_flat(ib_peer + vi, j_peer, k_peer, self.nx, self.ny);
                            out.push(Triple {
                                b: covar,
                                i: RowIdx(row),
                                j: ColIdx(col),
                            });
                        }
                    }
                }
            }
        }
    }
}

#[inline]
fn mean_square(slab: &PaddedSlabView<'_>, p: usize, u: usize) -> f64 {
    let mut acc = 0.0;
    for m in 0..slab.e() {
        let x = slab.at(m, p, u);
        acc += x * x;
    }
    acc / slab.e() as f64
}

#[inline]
fn covariance(a: &PaddedSlabView<'_>, b: &PaddedSlabView<'_>, p: usize, up: usize, q: usize, uq: usize) -> f64 {
    let mut acc = 0.0;
    for m in 0..a.e() {
        acc += a.at(m, p, up) * b.at(m, q, uq);
    }
    acc / a.e() as f64
}

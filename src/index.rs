//! Index algebra: 1-D block decomposition and flat/(i,j,k) conversions
//!
//! Two pieces of arithmetic are load-bearing across the whole crate and must
//! be bit-identical at every call site:
//!
//! - [`range`]: splits a length `L` into `P` contiguous, evenly-sized pieces.
//!   Every rank computes `range` for every *other* rank when interpreting the
//!   all-gathered receive buffer, so a mismatch between two call sites
//!   silently scrambles the layout rather than panicking.
//! - [`flat_to_ijk`] / [`ijk_to_flat`]: the fixed `g = i + j*Nx + k*Nx*Ny`
//!   convention. Changing this reshuffles every recorded index downstream.
//!
//! Three newtypes (`Rank`, `RowIdx`, `ColIdx`) wrap plain `usize`s so the
//! threshold kernel and the reducer cannot accidentally swap a row for a
//! column index at a type level.

use crate::error::BmatrixError;

/// A 0-based MPI rank.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rank(pub usize);

impl Rank {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// A global linear row index into the B-matrix (`I[n]` in the spec).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowIdx(pub usize);

impl RowIdx {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// A global linear column index into the B-matrix (`J[n]` in the spec).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColIdx(pub usize);

impl ColIdx {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// Inclusive, zero-based local bounds `[ib, ie]` returned by [`range`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Bounds {
    pub ib: usize,
    pub ie: usize,
}

impl Bounds {
    /// Number of elements covered, `ie - ib + 1`.
    #[inline]
    pub fn len(&self) -> usize {
        self.ie - self.ib + 1
    }
}

/// Split `[0, l)` into `p` contiguous, evenly-sized pieces and return the
/// inclusive bounds owned by rank `r`.
///
/// Let `q = L div P`, `s = L mod P`. Then `ib = r*q + min(r, s)` and
/// `ie = ib + q - 1 + (1 if r < s else 0)`. Consecutive pieces abut: rank
/// `r`'s `ie + 1 == range(l, p, r + 1).ib` for every `r < p - 1`.
///
/// # Errors
/// Returns [`BmatrixError::Argument`] if `p == 0`, `l == 0`, or `r >= p`.
pub fn range(l: usize, p: usize, r: usize) -> Result<Bounds, BmatrixError> {
    if p == 0 {
        return Err(BmatrixError::Argument("rank count must be positive".into()));
    }
    if l == 0 {
        return Err(BmatrixError::Argument("length must be positive".into()));
    }
    if r >= p {
        return Err(BmatrixError::Argument(format!(
            "rank {r} out of range for {p} ranks"
        )));
    }
    let q = l / p;
    let s = l % p;
    let ib = r * q + r.min(s);
    let ie = ib + q - 1 + if r < s { 1 } else { 0 };
    Ok(Bounds { ib, ie })
}

/// The x-extent owned by rank `r` out of `p` ranks splitting a grid of width
/// `nx`, along with the per-rank max used to size the padded receive buffer.
pub fn nx_max(nx: usize, p: usize) -> Result<usize, BmatrixError> {
    let mut m = 0usize;
    for r in 0..p {
        m = m.max(range(nx, p, r)?.len());
    }
    Ok(m)
}

/// Decompose a global linear index `g = i + j*nx + k*nx*ny` into `(i, j, k)`.
///
/// # Errors
/// Returns [`BmatrixError::Argument`] if `nx == 0` or `ny == 0`.
pub fn flat_to_ijk(g: usize, nx: usize, ny: usize) -> Result<(usize, usize, usize), BmatrixError> {
    if nx == 0 || ny == 0 {
        return Err(BmatrixError::Argument("nx and ny must be positive".into()));
    }
    let i = g % nx;
    let j = (g / nx) % ny;
    let k = g / (nx * ny);
    Ok((i, j, k))
}

/// Inverse of [`flat_to_ijk`]: compose `(i, j, k)` into `g = i + j*nx + k*nx*ny`.
pub fn ijk_to_flat(i: usize, j: usize, k: usize, nx: usize, ny: usize) -> usize {
    i + j * nx + k * nx * ny
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_partitions_contiguously() {
        for &(l, p) in &[(10usize, 3usize), (100, 7), (1, 1), (8, 8), (9, 4)] {
            let first = range(l, p, 0).unwrap();
            assert_eq!(first.ib, 0, "P1: first piece starts at 0");
            let last = range(l, p, p - 1).unwrap();
            assert_eq!(last.ie, l - 1, "P1: last piece ends at L-1");

            let mut total = 0;
            for r in 0..p {
                let b = range(l, p, r).unwrap();
                if r > 0 {
                    let prev = range(l, p, r - 1).unwrap();
                    assert_eq!(prev.ie + 1, b.ib, "pieces must abut");
                }
                total += b.len();
            }
            assert_eq!(total, l);
        }
    }

    #[test]
    fn range_rejects_degenerate_input() {
        assert!(range(10, 0, 0).is_err());
        assert!(range(0, 3, 0).is_err());
        assert!(range(10, 3, 3).is_err());
    }

    #[test]
    fn ijk_round_trips() {
        let (nx, ny, nz) = (5usize, 7usize, 3usize);
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let g = ijk_to_flat(i, j, k, nx, ny);
                    let (i2, j2, k2) = flat_to_ijk(g, nx, ny).unwrap();
                    assert_eq!((i, j, k), (i2, j2, k2), "P2: round trip at g={g}");
                }
            }
        }
    }

    #[test]
    fn nx_max_matches_largest_piece() {
        let m = nx_max(10, 3).unwrap();
        assert_eq!(m, range(10, 3, 0).unwrap().len().max(
            (0..3).map(|r| range(10, 3, r).unwrap().len()).max().unwrap()
        ));
    }
}

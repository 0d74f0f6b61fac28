//! Rank-local dense slab storage
//!
//! A [`Slab`] holds one rank's contiguous x-columns of the (decimated,
//! preprocessed) ensemble field, densely packed as `(E, Nz*Ny, n_local)` with
//! ensemble as the outermost axis (§3). This is the same shape discipline the
//! teacher crate used for its `BlockWs` per-block workspace: one flat `Vec`
//! reused across the lifetime of the slab, with the shape carried alongside
//! it rather than re-derived.

use crate::error::BmatrixError;

/// A dense `(E, Nz*Ny, n_local)` block of ensemble samples.
#[derive(Clone, Debug)]
pub struct Slab {
    /// Ensemble size.
    pub e: usize,
    /// `Nz * Ny`, the number of vertical/meridional points per column.
    pub n_slice: usize,
    /// Number of local x-columns this rank owns (`ie - ib + 1`).
    pub n_local: usize,
    /// Flat storage, length `e * n_slice * n_local`.
    pub data: Vec<f64>,
}

impl Slab {
    /// Allocate a zero-filled slab of the given shape.
    pub fn zeros(e: usize, n_slice: usize, n_local: usize) -> Self {
        Self {
            e,
            n_slice,
            n_local,
            data: vec![0.0; e * n_slice * n_local],
        }
    }

    /// Build a slab from flat data, validating the shape matches.
    pub fn from_vec(
        e: usize,
        n_slice: usize,
        n_local: usize,
        data: Vec<f64>,
    ) -> Result<Self, BmatrixError> {
        if data.len() != e * n_slice * n_local {
            return Err(BmatrixError::Resource(format!(
                "slab data length {} does not match shape ({e}, {n_slice}, {n_local})",
                data.len()
            )));
        }
        Ok(Self {
            e,
            n_slice,
            n_local,
            data,
        })
    }

    /// Value of ensemble member `m` at slice point `p` (`p < n_slice`) in
    /// local column `u` (`u < n_local`).
    #[inline]
    pub fn at(&self, m: usize, p: usize, u: usize) -> f64 {
        self.data[(m * self.n_slice + p) * self.n_local + u]
    }

    /// Number of f64 samples this slab occupies.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flatten this slab into a buffer zero-padded so every rank contributes
    /// exactly `e * n_slice * n_local_max` samples to the all-gather, per the
    /// receive-buffer contract in §3/§4.2.
    pub fn pad_to(&self, n_local_max: usize) -> Vec<f64> {
        if self.n_local == n_local_max {
            return self.data.clone();
        }
        let mut out = vec![0.0; self.e * self.n_slice * n_local_max];
        for m in 0..self.e {
            for p in 0..self.n_slice {
                let src_base = (m * self.n_slice + p) * self.n_local;
                let dst_base = (m * self.n_slice + p) * n_local_max;
                out[dst_base..dst_base + self.n_local]
                    .copy_from_slice(&self.data[src_base..src_base + self.n_local]);
            }
        }
        out
    }

    /// Reinterpret a padded, flat buffer (as produced by an all-gather) as a
    /// [`Slab`] view with only the first `n_local` columns of each row valid;
    /// the rest is padding that must never be read (§3).
    pub fn view_padded(
        data: &[f64],
        e: usize,
        n_slice: usize,
        n_local_max: usize,
        n_local: usize,
    ) -> PaddedSlabView<'_> {
        PaddedSlabView {
            data,
            e,
            n_slice,
            n_local_max,
            n_local,
        }
    }
}

/// A read-only view over a padded slab living inside a larger receive buffer,
/// exposing only the `n_local` valid columns.
pub struct PaddedSlabView<'a> {
    data: &'a [f64],
    e: usize,
    n_slice: usize,
    n_local_max: usize,
    n_local: usize,
}

impl<'a> PaddedSlabView<'a> {
    #[inline]
    pub fn at(&self, m: usize, p: usize, u: usize) -> f64 {
        debug_assert!(u < self.n_local, "read into padding region");
        self.data[(m * self.n_slice + p) * self.n_local_max + u]
    }

    pub fn e(&self) -> usize {
        self.e
    }

    pub fn n_slice(&self) -> usize {
        self.n_slice
    }

    pub fn n_local(&self) -> usize {
        self.n_local
    }
}

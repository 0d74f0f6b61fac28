//! Grid/ensemble preprocessing modes and the slab-loading external contract
//!
//! This module is the Rust counterpart of the upstream Python driver's
//! `BTools.getSlabData`: it opens the five-dimensional ensemble container,
//! picks time slice 0, applies one of three mean-handling modes, decimates
//! the two trailing spatial axes, and hands each rank only the x-columns it
//! owns (via [`crate::index::range`]).
//!
//! Per the spec (§6/§9), only [`MeanMode::Anomaly`] (mode 2, subtract the
//! ensemble mean from each member) is numerically compatible with the
//! threshold kernel's zero-mean variance formula; [`SlabLoader`] implementors
//! still support modes 1 and 3 for parity with the original tool, but
//! [`crate::config::Config`] refuses them unless explicitly overridden.

use crate::error::BmatrixError;
use crate::index::{range, Rank};
use crate::slab::Slab;

/// The three preprocessing modes the original tool exposed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MeanMode {
    /// Mode 1: replace with the ensemble mean of a single z-plane (rank drops
    /// to 2-D). Not compatible with the kernel's zero-mean variance formula.
    Mean,
    /// Mode 2: subtract the ensemble mean from each member (anomaly
    /// covariance). The only mode the kernel is numerically correct for.
    Anomaly,
    /// Mode 3: raw samples, no mean handling at all.
    Raw,
}

impl MeanMode {
    /// Parse the integer mode spec used by the CLI (`1`, `2`, or `3`).
    pub fn from_code(code: u32) -> Result<Self, BmatrixError> {
        match code {
            1 => Ok(MeanMode::Mean),
            2 => Ok(MeanMode::Anomaly),
            3 => Ok(MeanMode::Raw),
            other => Err(BmatrixError::Argument(format!(
                "mean mode must be 1, 2, or 3 (got {other})"
            ))),
        }
    }

    /// Whether this mode is compatible with the kernel's `mean(x^2)`
    /// zero-mean variance formula.
    pub fn is_anomaly_compatible(self) -> bool {
        matches!(self, MeanMode::Anomaly)
    }
}

/// Effective grid dimensions after decimation, `(Nz, Ny, Nx)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    pub nz: usize,
    pub ny: usize,
    pub nx: usize,
}

impl Grid {
    /// Total node count `G = Nx * Ny * Nz`.
    pub fn g(&self) -> usize {
        self.nx * self.ny * self.nz
    }
}

/// What a [`SlabLoader`] hands back to the orchestrator: this rank's local
/// slab, the effective (decimated) grid, and the ensemble size.
pub struct LoadedSlab {
    pub slab: Slab,
    pub grid: Grid,
    pub e: usize,
}

/// External contract: load one rank's local x-slab of the preprocessed
/// ensemble field. Implementations own the on-disk format; the rest of this
/// crate only depends on this trait.
pub trait SlabLoader {
    /// Load the slab owned by `rank` out of `size` ranks, after applying
    /// `mode` and striding the two trailing spatial axes by `decimation`.
    ///
    /// # Errors
    /// Returns [`BmatrixError::Input`] if the variable is missing or does not
    /// have rank 5, or if `mode` is not supported by this loader.
    fn load(
        &self,
        rank: Rank,
        size: usize,
        mode: MeanMode,
        decimation: usize,
    ) -> Result<LoadedSlab, BmatrixError>;
}

/// Default [`SlabLoader`] backed by a NetCDF classic-model container, the
/// direct counterpart of the upstream `netCDF4.Dataset` reader.
pub struct NetcdfSlabLoader {
    path: std::path::PathBuf,
    varname: String,
}

impl NetcdfSlabLoader {
    pub fn new(path: impl Into<std::path::PathBuf>, varname: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            varname: varname.into(),
        }
    }
}

impl SlabLoader for NetcdfSlabLoader {
    fn load(
        &self,
        rank: Rank,
        size: usize,
        mode: MeanMode,
        decimation: usize,
    ) -> Result<LoadedSlab, BmatrixError> {
        if decimation == 0 {
            return Err(BmatrixError::Argument(
                "decimation factor must be >= 1".into(),
            ));
        }

        let file = netcdf::open(&self.path).map_err(|e| {
            BmatrixError::Input(format!(
                "could not open ensemble file {:?}: {e}",
                self.path
            ))
        })?;
        let var = file.variable(&self.varname).ok_or_else(|| {
            BmatrixError::Input(format!(
                "variable {:?} not found in {:?}",
                self.varname, self.path
            ))
        })?;
        let dims = var.dimensions();
        if dims.len() != 5 {
            return Err(BmatrixError::Input(format!(
                "ensemble should have five dimensions, got {}",
                dims.len()
            )));
        }
        let nens = dims[0].len();
        let nz_full = dims[2].len();
        let ny_full = dims[3].len();
        let nx_full = dims[4].len();

        // Read time slice 0, all ensemble members, all spatial points.
        let raw = var
            .get_values::<f64, _>((.., 0, .., .., ..))
            .map_err(|e| BmatrixError::Input(format!("failed to read {:?}: {e}", self.varname)))?;
        // raw is shaped (nens, nz_full, ny_full, nx_full) in row-major order.

        let nz = match mode {
            MeanMode::Mean => 1,
            _ => nz_full,
        };
        let ny = (ny_full + decimation - 1) / decimation;
        let nx_dec = (nx_full + decimation - 1) / decimation;

        // Apply the mean mode over the full (undecimated-x) field first, then
        // decimate y/x and slice this rank's x-columns, matching the order
        // the upstream reader applies them in.
        let processed = apply_mean_mode(&raw, nens, nz_full, ny_full, nx_full, mode, nz)?;

        let bounds = range(nx_dec, size, rank.as_usize())?;
        let n_local = bounds.len();

        let mut slab = Slab::zeros(nens, nz * ny, n_local);
        for m in 0..nens {
            for k in 0..nz {
                for j in 0..ny {
                    let jy = j * decimation;
                    for (u, ix) in (bounds.ib..=bounds.ie).enumerate() {
                        let xfull = ix * decimation;
                        let src = ((m * nz + k) * ny_full + jy) * nx_full + xfull;
                        let p = k * ny + j;
                        slab.data[(m * (nz * ny) + p) * n_local + u] = processed[src];
                    }
                }
            }
        }

        Ok(LoadedSlab {
            slab,
            grid: Grid { nz, ny, nx: nx_dec },
            e: nens,
        })
    }
}

/// Apply the selected mean mode to a flat `(nens, nz_full, ny_full, nx_full)`
/// field, returning a flat `(nens, nz_out, ny_full, nx_full)` field (`nz_out`
/// is 1 for [`MeanMode::Mean`], `nz` otherwise).
fn apply_mean_mode(
    raw: &[f64],
    nens: usize,
    nz_full: usize,
    ny_full: usize,
    nx_full: usize,
    mode: MeanMode,
    nz_out: usize,
) -> Result<Vec<f64>, BmatrixError> {
    let plane = ny_full * nx_full;
    match mode {
        MeanMode::Mean => {
            // Ensemble mean of a single z-plane (z = 1, matching the upstream
            // tool's `N[e, 0, 1, :, :]`).
            if nz_full < 2 {
                return Err(BmatrixError::Input(
                    "mode 1 requires at least two z-planes".into(),
                ));
            }
            let mut out = vec![0.0; plane];
            for e in 0..nens {
                let base = (e * nz_full + 1) * plane;
                for i in 0..plane {
                    out[i] += raw[base + i];
                }
            }
            for v in out.iter_mut() {
                *v /= nens as f64;
            }
            Ok(out)
        }
        MeanMode::Anomaly => {
            let mut out = raw[..nens * nz_out * plane].to_vec();
            let mut mean = vec![0.0; nz_out * plane];
            for e in 0..nens {
                let base = e * nz_out * plane;
                for i in 0..nz_out * plane {
                    mean[i] += out[base + i];
                }
            }
            for v in mean.iter_mut() {
                *v /= nens as f64;
            }
            for e in 0..nens {
                let base = e * nz_out * plane;
                for i in 0..nz_out * plane {
                    out[base + i] -= mean[i];
                }
            }
            Ok(out)
        }
        MeanMode::Raw => Ok(raw[..nens * nz_out * plane].to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_codes_round_trip() {
        assert_eq!(MeanMode::from_code(1).unwrap(), MeanMode::Mean);
        assert_eq!(MeanMode::from_code(2).unwrap(), MeanMode::Anomaly);
        assert_eq!(MeanMode::from_code(3).unwrap(), MeanMode::Raw);
        assert!(MeanMode::from_code(4).is_err());
    }

    #[test]
    fn only_anomaly_is_kernel_compatible() {
        assert!(!MeanMode::Mean.is_anomaly_compatible());
        assert!(MeanMode::Anomaly.is_anomaly_compatible());
        assert!(!MeanMode::Raw.is_anomaly_compatible());
    }

    #[test]
    fn anomaly_mode_subtracts_ensemble_mean() {
        let nens = 2;
        let nz = 1;
        let ny = 1;
        let nx = 2;
        // member 0: [1, 3], member 1: [3, 5] -> mean [2, 4]
        let raw = vec![1.0, 3.0, 3.0, 5.0];
        let out = apply_mean_mode(&raw, nens, nz, ny, nx, MeanMode::Anomaly, nz).unwrap();
        assert_eq!(out, vec![-1.0, -1.0, 1.0, 1.0]);
    }
}

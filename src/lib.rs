//! Crate root: public surface, core aliases, and cross-cutting invariants
//!
//! This module is the single canonical entry-point for downstream users of
//! the library. It centralizes the scalar type alias, the small index
//! newtypes, the crate-wide error type, and re-exports the submodules that
//! implement the distributed B-matrix build described in `SPEC_FULL.md`.
//!
//! ## Invariants
//!
//! - **Grid convention.** The global linear index of a grid point is always
//!   `g = i + j*Nx + k*Nx*Ny`. Every module that touches a global index goes
//!   through [`index::flat_to_ijk`] / [`index::ijk_to_flat`] so the
//!   convention cannot drift between the kernel and the reducer.
//! - **No global state.** The communicator/rank/size triple lives in a
//!   [`collective::Collective`] handle that is constructor-injected into each
//!   component; nothing in this crate reads ambient global state beyond the
//!   one `std::env::args()` parse in the `bmatrix` binary's `main`.
//! - **Fatal errors.** Every error in this crate is fatal to the run — see
//!   [`error::BmatrixError`] — and the batch driver is expected to abort the
//!   whole communicator rather than attempt recovery.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

/// Index algebra: 1-D block decomposition and flat/(i,j,k) conversions.
pub mod index;
/// Crate-wide error type and the five fatal error categories.
pub mod error;
/// Collective-communication abstraction (MPI-backed and in-process).
pub mod collective;
/// Grid/ensemble preprocessing modes and the slab-loading external contract.
pub mod ensemble;
/// Rank-local dense slab storage.
pub mod slab;
/// Pairwise threshold kernel: variance/covariance/correlation and retention.
pub mod kernel;
/// All-gather of per-rank slabs into a padded receive buffer.
pub mod exchange;
/// Iterates the kernel over all peers and accumulates retained triples.
pub mod build;
/// Per-row ribbon-width reduction and summary statistics.
pub mod reduce;
/// Shard-writing external contract (NetCDF default implementation).
pub mod writer;
/// Run summary and width-vector text output.
pub mod summary;
/// CLI flag parsing and validated run configuration.
pub mod config;
/// Composition root wiring loader -> exchange -> kernel -> reduce -> summary.
pub mod orchestrator;

/// Scalar type used for all ensemble samples, covariances, and correlations.
pub type F = f64;

/// Re-exported for convenience; see [`index`] for the full index algebra.
pub use crate::index::{ColIdx, Rank, RowIdx};

/// Re-exported so downstream code can write `paribbon::Result<T>`.
pub use crate::error::{BmatrixError, Result};

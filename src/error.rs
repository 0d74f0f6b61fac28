//! Crate-wide error type
//!
//! All errors in this crate are fatal to the run (see `SPEC_FULL.md` §7): the
//! driver's job is not to recover but to produce one rank-prefixed diagnostic
//! line and abort the whole communicator. `BmatrixError` groups the five
//! error categories the spec names so call sites can match by category
//! (`is_collective`, `is_sanity`, ...) instead of enumerating every variant,
//! the same classify-after-the-fact style the teacher crate used for
//! `is_conflict`/`is_timeout`.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BmatrixError>;

/// Unified error type for all `paribbon` operations.
#[derive(Debug, Error)]
pub enum BmatrixError {
    /// (a) Argument errors: unparseable flag or a value out of its valid range.
    #[error("argument error: {0}")]
    Argument(String),

    /// (b) Input errors: missing file, wrong variable rank, unsupported mean mode.
    #[error("input error: {0}")]
    Input(String),

    /// (c) Numeric sanity failure: reduced row-max >= G, or row-min < 0 at a
    /// row that also has a valid max.
    #[error("sanity check failed: {0}")]
    Sanity(String),

    /// (d) Resource errors: allocation/capacity failure, or an index that does
    /// not fit the on-disk representation.
    #[error("resource error: {0}")]
    Resource(String),

    /// (e) Collective errors: transport failure or a send/recv size mismatch.
    #[error("collective error: {0}")]
    Collective(String),

    /// I/O failure underneath an input or output operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by the `netcdf` crate while reading or writing a
    /// container.
    #[error("netcdf error: {0}")]
    Netcdf(String),
}

impl BmatrixError {
    /// True for errors in the collective-communication category.
    pub fn is_collective(&self) -> bool {
        matches!(self, BmatrixError::Collective(_))
    }

    /// True for errors in the numeric-sanity category.
    pub fn is_sanity(&self) -> bool {
        matches!(self, BmatrixError::Sanity(_))
    }

    /// True for errors in the argument-parsing category.
    pub fn is_argument(&self) -> bool {
        matches!(self, BmatrixError::Argument(_))
    }
}

impl From<netcdf::Error> for BmatrixError {
    fn from(e: netcdf::Error) -> Self {
        BmatrixError::Netcdf(e.to_string())
    }
}

//! Shard writer: per-rank (B, I, J) container (§4.6)
//!
//! The external contract the spec names; the default implementation mirrors
//! the upstream `BTools.writeResults`: one NetCDF classic-model file per
//! rank named `{prefix}.{rank}.nc`, an unlimited `nResults` dimension, and
//! three variables `B` (double), `I` (int), `J` (int).

use crate::error::BmatrixError;
use crate::index::{ColIdx, RowIdx};

/// External contract: persist one rank's retained triples.
pub trait ShardWriter {
    /// Write `b[n], i[n], j[n]` for `n` in `0..b.len()` to this rank's shard.
    ///
    /// # Errors
    /// Returns [`BmatrixError::Resource`] if a row/column index does not fit
    /// the on-disk `int` representation, or an I/O/NetCDF error on write
    /// failure.
    fn write(&self, rank: usize, b: &[f64], i: &[RowIdx], j: &[ColIdx]) -> Result<(), BmatrixError>;
}

/// Default [`ShardWriter`] backed by a NetCDF classic-model container.
pub struct NetcdfShardWriter {
    prefix: String,
}

impl NetcdfShardWriter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl ShardWriter for NetcdfShardWriter {
    fn write(&self, rank: usize, b: &[f64], i: &[RowIdx], j: &[ColIdx]) -> Result<(), BmatrixError> {
        debug_assert_eq!(b.len(), i.len());
        debug_assert_eq!(b.len(), j.len());

        let i32_i: Vec<i32> = i
            .iter()
            .map(|v| to_i32(v.as_usize()))
            .collect::<Result<_, _>>()?;
        let i32_j: Vec<i32> = j
            .iter()
            .map(|v| to_i32(v.as_usize()))
            .collect::<Result<_, _>>()?;

        let path = format!("{}.{}.nc", self.prefix, rank);
        let mut file = netcdf::create(&path)
            .map_err(|e| BmatrixError::Input(format!("could not create shard {path:?}: {e}")))?;
        file.add_unlimited_dimension("nResults")?;
        file.add_variable::<f64>("B", &["nResults"])?
            .put_values(b, ..)?;
        file.add_variable::<i32>("I", &["nResults"])?
            .put_values(&i32_i, ..)?;
        file.add_variable::<i32>("J", &["nResults"])?
            .put_values(&i32_j, ..)?;
        Ok(())
    }
}

fn to_i32(v: usize) -> Result<i32, BmatrixError> {
    i32::try_from(v).map_err(|_| {
        BmatrixError::Resource(format!(
            "index {v} does not fit the shard's 32-bit integer representation"
        ))
    })
}

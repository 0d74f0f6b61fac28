//! Slab exchange: one all-gather, bracketed by barriers (§4.2)
//!
//! Every rank contributes its local slab, zero-padded to the cluster-wide
//! `Nx_max`, and gets back every other rank's contribution in the same
//! padded shape. The pre/post barriers exist purely to localise a mis-sized
//! contribution to the round it happened in, rather than letting a stale
//! buffer silently corrupt the next collective.

use crate::collective::Collective;
use crate::error::BmatrixError;
use crate::slab::{PaddedSlabView, Slab};

/// Receive buffer produced by one slab exchange round: every rank's slab,
/// padded to `n_local_max`, addressable as a [`PaddedSlabView`] by rank.
pub struct ReceiveBuffer {
    data: Vec<f64>,
    e: usize,
    n_slice: usize,
    n_local_max: usize,
    size: usize,
}

impl ReceiveBuffer {
    /// View of the slab contributed by `rank`, with only its `n_local`
    /// columns valid.
    pub fn slab_view(&self, rank: usize, n_local: usize) -> PaddedSlabView<'_> {
        let stride = self.e * self.n_slice * self.n_local_max;
        let start = rank * stride;
        Slab::view_padded(
            &self.data[start..start + stride],
            self.e,
            self.n_slice,
            self.n_local_max,
            n_local,
        )
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Run the one required all-gather for this rank's local slab, bracketed by
/// barriers per §4.2, and return the per-rank receive buffer.
pub fn exchange_slabs(
    collective: &dyn Collective,
    local: &Slab,
    n_local_max: usize,
) -> Result<ReceiveBuffer, BmatrixError> {
    let send = local.pad_to(n_local_max);
    let mut recv = vec![0.0; send.len() * collective.size()];

    collective.barrier();
    collective.all_gather_into_f64(&send, &mut recv)?;
    collective.barrier();

    Ok(ReceiveBuffer {
        data: recv,
        e: local.e,
        n_slice: local.n_slice,
        n_local_max,
        size: collective.size(),
    })
}

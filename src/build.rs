//! Build driver: runs the kernel over every peer in rank order (§4.4)
//!
//! Peers are visited `0..P` in fixed order so every rank's collective
//! progress (should a future collective be added inside the loop) lines up
//! identically, the same ordering discipline the teacher crate's phase
//! scheduler used for its round-robin prover/verifier exchange.

use crate::exchange::ReceiveBuffer;
use crate::index::range;
use crate::kernel::{ThresholdKernel, TripleBuffer};
use crate::slab::Slab;

/// Iterate the kernel over every peer's slab in the receive buffer,
/// accumulating all retained triples into one growing buffer.
pub struct BuildDriver<'a> {
    kernel: &'a ThresholdKernel,
    nx: usize,
    size: usize,
}

impl<'a> BuildDriver<'a> {
    pub fn new(kernel: &'a ThresholdKernel, nx: usize, size: usize) -> Self {
        Self { kernel, nx, size }
    }

    /// Run the local slab against every peer slot `0..P` of `recv`, in order.
    pub fn run(&self, local: &Slab, ib_local: usize, recv: &ReceiveBuffer) -> TripleBuffer {
        let mut out = TripleBuffer::new();
        let local_padded = local.pad_to(local.n_local);
        let local_view = Slab::view_padded(
            &local_padded,
            local.e,
            local.n_slice,
            local.n_local,
            local.n_local,
        );
        for r in 0..self.size {
            let bounds = range(self.nx, self.size, r).expect("peer rank in range");
            let peer_view = recv.slab_view(r, bounds.len());
            self.kernel
                .accumulate(&local_view, &peer_view, ib_local, bounds.ib, &mut out);
        }
        out
    }
}

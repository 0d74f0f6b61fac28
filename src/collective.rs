//! Collective-communication abstraction
//!
//! The spec names exactly seven collective points (§5): the pre/post-gather
//! barriers, the all-gather, the per-row MIN/MAX all-reduces, the global
//! count SUM all-reduce, the wall-clock MAX all-reduce, and a final barrier.
//! [`Collective`] is the one seam through which every rank-aware component in
//! this crate talks to the cluster; nothing else may block on peers.
//!
//! Two implementations satisfy it:
//! - [`MpiCollective`] wraps a real MPI world communicator via the `mpi`
//!   crate, for production batch jobs launched under `mpirun`/`srun`.
//! - [`LocalCollective`] emulates `P` ranks as `P` OS threads inside one
//!   process, using `std::sync::Barrier` the same way the spec describes the
//!   real collectives: every round is a write, a barrier, a read, and a
//!   second barrier so the next round cannot start early. It exists so the
//!   distributed logic (including the P-invariance property P7) can be unit
//!   tested without an MPI job launcher.

use crate::error::BmatrixError;
use crate::index::Rank;
use std::sync::{Arc, Barrier, Mutex};

/// The seven collective operations the spec requires, plus rank/size queries
/// and a fatal abort. Implementations must guarantee that the *observable*
/// result of a correct program does not depend on which implementation is in
/// use (P7): same `P`, same inputs, same emitted triples and width vector.
pub trait Collective {
    /// This process's 0-based rank.
    fn rank(&self) -> Rank;
    /// Total number of ranks `P`.
    fn size(&self) -> usize;

    /// Synchronise all ranks.
    fn barrier(&self);

    /// All-gather `send` (identical length on every rank) into `recv`, which
    /// must be exactly `size() * send.len()` long; slot `r` of `recv` holds
    /// rank `r`'s contribution.
    fn all_gather_into_f64(&self, send: &[f64], recv: &mut [f64]) -> Result<(), BmatrixError>;

    /// Element-wise MIN all-reduce, in place.
    fn all_reduce_min_i64(&self, local: &mut [i64]) -> Result<(), BmatrixError>;

    /// Element-wise MAX all-reduce, in place.
    fn all_reduce_max_i64(&self, local: &mut [i64]) -> Result<(), BmatrixError>;

    /// SUM all-reduce of a single scalar (used for the global retained count).
    fn all_reduce_sum_u64(&self, local: u64) -> u64;

    /// MAX all-reduce of a single scalar (used for wall-clock seconds).
    fn all_reduce_max_f64(&self, local: f64) -> f64;

    /// Fatal: print nothing itself (callers already logged a diagnostic),
    /// just tear down the whole communicator with a non-zero exit code.
    fn abort(&self, code: i32) -> !;
}

// ============================================================================
// MPI-backed implementation
// ============================================================================

/// Production [`Collective`] backed by a real MPI world communicator.
pub struct MpiCollective {
    world: mpi::topology::SimpleCommunicator,
}

impl MpiCollective {
    /// Wrap the world communicator obtained from `mpi::initialize()`.
    ///
    /// `mpi::initialize()` must be called exactly once per process, before
    /// this constructor; the returned `Universe` must outlive this value.
    pub fn new(universe: &mpi::environment::Universe) -> Self {
        Self {
            world: universe.world(),
        }
    }
}

impl Collective for MpiCollective {
    fn rank(&self) -> Rank {
        use mpi::topology::Communicator;
        Rank(self.world.rank() as usize)
    }

    fn size(&self) -> usize {
        use mpi::topology::Communicator;
        self.world.size() as usize
    }

    fn barrier(&self) {
        use mpi::topology::Communicator;
        self.world.barrier();
    }

    fn all_gather_into_f64(&self, send: &[f64], recv: &mut [f64]) -> Result<(), BmatrixError> {
        use mpi::topology::Communicator;
        if recv.len() != send.len() * self.size() {
            return Err(BmatrixError::Collective(format!(
                "all-gather size mismatch: recv.len()={} expected {}",
                recv.len(),
                send.len() * self.size()
            )));
        }
        self.world.all_gather_into(send, recv);
        Ok(())
    }

    fn all_reduce_min_i64(&self, local: &mut [i64]) -> Result<(), BmatrixError> {
        use mpi::collective::SystemOperation;
        use mpi::topology::Communicator;
        let send = local.to_vec();
        self.world
            .all_reduce_into(&send[..], local, SystemOperation::min());
        Ok(())
    }

    fn all_reduce_max_i64(&self, local: &mut [i64]) -> Result<(), BmatrixError> {
        use mpi::collective::SystemOperation;
        use mpi::topology::Communicator;
        let send = local.to_vec();
        self.world
            .all_reduce_into(&send[..], local, SystemOperation::max());
        Ok(())
    }

    fn all_reduce_sum_u64(&self, local: u64) -> u64 {
        use mpi::collective::SystemOperation;
        use mpi::topology::Communicator;
        let mut out = 0u64;
        self.world
            .all_reduce_into(&local, &mut out, SystemOperation::sum());
        out
    }

    fn all_reduce_max_f64(&self, local: f64) -> f64 {
        use mpi::collective::SystemOperation;
        use mpi::topology::Communicator;
        let mut out = 0.0f64;
        self.world
            .all_reduce_into(&local, &mut out, SystemOperation::max());
        out
    }

    fn abort(&self, code: i32) -> ! {
        use mpi::topology::Communicator;
        self.world.abort(code);
        unreachable!("Communicator::abort never returns")
    }
}

// ============================================================================
// In-process thread-based implementation, for tests
// ============================================================================

struct LocalShared {
    size: usize,
    round_barrier: Barrier,
    gather_mailbox: Mutex<Vec<Vec<f64>>>,
    reduce_i64_mailbox: Mutex<Vec<Vec<i64>>>,
    scalar_u64_mailbox: Mutex<Vec<u64>>,
    scalar_f64_mailbox: Mutex<Vec<f64>>,
}

/// `P`-rank-in-one-process [`Collective`], for driving the orchestrator from
/// unit tests. Construct one handle per simulated rank with [`local_ranks`]
/// and run each on its own OS thread, exactly as `P` real MPI processes
/// would each run the same binary.
pub struct LocalCollective {
    rank: Rank,
    shared: Arc<LocalShared>,
}

/// Build `size` [`LocalCollective`] handles, one per simulated rank, sharing
/// the mailboxes and barrier a real all-gather/all-reduce would need.
pub fn local_ranks(size: usize) -> Vec<LocalCollective> {
    let shared = Arc::new(LocalShared {
        size,
        round_barrier: Barrier::new(size),
        gather_mailbox: Mutex::new(vec![Vec::new(); size]),
        reduce_i64_mailbox: Mutex::new(vec![Vec::new(); size]),
        scalar_u64_mailbox: Mutex::new(vec![0; size]),
        scalar_f64_mailbox: Mutex::new(vec![0.0; size]),
    });
    (0..size)
        .map(|r| LocalCollective {
            rank: Rank(r),
            shared: shared.clone(),
        })
        .collect()
}

impl Collective for LocalCollective {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) {
        self.shared.round_barrier.wait();
    }

    fn all_gather_into_f64(&self, send: &[f64], recv: &mut [f64]) -> Result<(), BmatrixError> {
        if recv.len() != send.len() * self.size() {
            return Err(BmatrixError::Collective(format!(
                "all-gather size mismatch: recv.len()={} expected {}",
                recv.len(),
                send.len() * self.size()
            )));
        }
        {
            let mut mailbox = self.shared.gather_mailbox.lock().unwrap();
            mailbox[self.rank.as_usize()] = send.to_vec();
        }
        self.shared.round_barrier.wait();
        {
            let mailbox = self.shared.gather_mailbox.lock().unwrap();
            for (r, slab) in mailbox.iter().enumerate() {
                recv[r * send.len()..(r + 1) * send.len()].copy_from_slice(slab);
            }
        }
        self.shared.round_barrier.wait();
        Ok(())
    }

    fn all_reduce_min_i64(&self, local: &mut [i64]) -> Result<(), BmatrixError> {
        {
            let mut mailbox = self.shared.reduce_i64_mailbox.lock().unwrap();
            mailbox[self.rank.as_usize()] = local.to_vec();
        }
        self.shared.round_barrier.wait();
        {
            let mailbox = self.shared.reduce_i64_mailbox.lock().unwrap();
            for v in local.iter_mut() {
                *v = i64::MAX;
            }
            for contribution in mailbox.iter() {
                for (v, c) in local.iter_mut().zip(contribution.iter()) {
                    *v = (*v).min(*c);
                }
            }
        }
        self.shared.round_barrier.wait();
        Ok(())
    }

    fn all_reduce_max_i64(&self, local: &mut [i64]) -> Result<(), BmatrixError> {
        {
            let mut mailbox = self.shared.reduce_i64_mailbox.lock().unwrap();
            mailbox[self.rank.as_usize()] = local.to_vec();
        }
        self.shared.round_barrier.wait();
        {
            let mailbox = self.shared.reduce_i64_mailbox.lock().unwrap();
            for v in local.iter_mut() {
                *v = i64::MIN;
            }
            for contribution in mailbox.iter() {
                for (v, c) in local.iter_mut().zip(contribution.iter()) {
                    *v = (*v).max(*c);
                }
            }
        }
        self.shared.round_barrier.wait();
        Ok(())
    }

    fn all_reduce_sum_u64(&self, local: u64) -> u64 {
        {
            let mut mailbox = self.shared.scalar_u64_mailbox.lock().unwrap();
            mailbox[self.rank.as_usize()] = local;
        }
        self.shared.round_barrier.wait();
        let sum = self.shared.scalar_u64_mailbox.lock().unwrap().iter().sum();
        self.shared.round_barrier.wait();
        sum
    }

    fn all_reduce_max_f64(&self, local: f64) -> f64 {
        {
            let mut mailbox = self.shared.scalar_f64_mailbox.lock().unwrap();
            mailbox[self.rank.as_usize()] = local;
        }
        self.shared.round_barrier.wait();
        let max = self
            .shared
            .scalar_f64_mailbox
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .fold(f64::MIN, f64::max);
        self.shared.round_barrier.wait();
        max
    }

    fn abort(&self, code: i32) -> ! {
        std::process::exit(code);
    }
}

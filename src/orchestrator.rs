//! Orchestrator: composes every component into one run (§2/§9)
//!
//! Constructor-injected with a [`Collective`] and [`Config`], exactly the
//! "no global state" discipline the spec calls for in §9 — the communicator,
//! rank, and size all arrive through this struct rather than being read from
//! ambient process state. This mirrors the teacher crate's composition-root
//! pattern: one struct wires the leaf components together and `run()` drives
//! the whole pipeline end to end.

use crate::build::BuildDriver;
use crate::collective::Collective;
use crate::config::Config;
use crate::ensemble::SlabLoader;
use crate::error::BmatrixError;
use crate::index::nx_max;
use crate::kernel::ThresholdKernel;
use crate::reduce::{reduce_ribbon, sort_by_row};
use crate::summary::{write_summary, write_width_vector, RunSummary};
use crate::writer::ShardWriter;
use tracing::info;

/// Composes the Slab Loader, Slab Exchange, Threshold Kernel, Build Driver,
/// Shard Writer, and Ribbon Reducer into one end-to-end run.
pub struct Orchestrator<'a> {
    collective: &'a dyn Collective,
    config: &'a Config,
    loader: &'a dyn SlabLoader,
    writer: &'a dyn ShardWriter,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        collective: &'a dyn Collective,
        config: &'a Config,
        loader: &'a dyn SlabLoader,
        writer: &'a dyn ShardWriter,
    ) -> Self {
        Self {
            collective,
            config,
            loader,
            writer,
        }
    }

    /// Run the whole pipeline for this rank, writing a shard, a width
    /// vector, and a summary. Returns the retained-triple count this rank
    /// wrote, for diagnostics.
    pub fn run(&self, started: std::time::Instant) -> Result<u64, BmatrixError> {
        let rank = self.collective.rank();
        let size = self.collective.size();

        let loaded = self.loader.load(
            rank,
            size,
            self.config.mean_mode,
            self.config.dfact,
        )?;
        info!(rank = rank.as_usize(), nx = loaded.grid.nx, "slab loaded");

        let n_local_max = nx_max(loaded.grid.nx, size)?;
        let recv = crate::exchange::exchange_slabs(self.collective, &loaded.slab, n_local_max)?;

        let ib_local = crate::index::range(loaded.grid.nx, size, rank.as_usize())?.ib;
        let kernel = ThresholdKernel::new(loaded.grid.nx, loaded.grid.ny, self.config.thresh);
        let driver = BuildDriver::new(&kernel, loaded.grid.nx, size);
        let triples = driver.run(&loaded.slab, ib_local, &recv);

        let local_count = triples.len() as u64;
        let global_count = self.collective.all_reduce_sum_u64(local_count);

        // The ribbon reduction's sanity gate must pass before anything is
        // persisted (SPEC_FULL.md §7: no partial results on sanity failure),
        // so the shard write waits until reduce_ribbon returns Ok.
        let (sorted_i, sorted_j, _order) = sort_by_row(&triples);
        let g = loaded.grid.g();
        let ribbon = reduce_ribbon(self.collective, &sorted_i, &sorted_j, g)?;

        let (b, i, j) = triples.columns();
        self.writer.write(rank.as_usize(), b, i, j)?;

        if rank.as_usize() == 0 {
            write_width_vector(&self.config.opref, self.config.thresh, self.config.dfact, &ribbon.width)?;
        }

        let elapsed = started.elapsed().as_secs_f64();
        let wall_clock = self.collective.all_reduce_max_f64(elapsed);

        if rank.as_usize() == 0 {
            write_summary(&RunSummary {
                infile: self.config.infile.clone(),
                varname: self.config.varname.clone(),
                dfact: self.config.dfact,
                thresh: self.config.thresh,
                retained_count: global_count,
                opref: self.config.opref.clone(),
                g,
                stats: ribbon.stats,
                wall_clock_seconds: wall_clock,
            })?;
        }

        self.collective.barrier();
        Ok(local_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collective::{local_ranks, LocalCollective};
    use crate::ensemble::{Grid, LoadedSlab, MeanMode};
    use crate::index::{range, ColIdx, Rank, RowIdx};
    use crate::slab::Slab;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Instant;
    use tempfile::tempdir;

    /// Fake [`SlabLoader`] handing back a fixed, already-decimated field,
    /// partitioned by [`range`] exactly the way the real loader would be.
    struct FixedField {
        e: usize,
        grid: Grid,
        /// Flat `(e, n_slice, nx)` row-major field, `n_slice = grid.nz * grid.ny`.
        field: Vec<f64>,
    }

    impl SlabLoader for FixedField {
        fn load(
            &self,
            rank: Rank,
            size: usize,
            _mode: MeanMode,
            _decimation: usize,
        ) -> Result<LoadedSlab, BmatrixError> {
            let n_slice = self.grid.nz * self.grid.ny;
            let bounds = range(self.grid.nx, size, rank.as_usize())?;
            let n_local = bounds.len();
            let mut data = vec![0.0; self.e * n_slice * n_local];
            for m in 0..self.e {
                for p in 0..n_slice {
                    for (u, ix) in (bounds.ib..=bounds.ie).enumerate() {
                        data[(m * n_slice + p) * n_local + u] =
                            self.field[(m * n_slice + p) * self.grid.nx + ix];
                    }
                }
            }
            Ok(LoadedSlab {
                slab: Slab::from_vec(self.e, n_slice, n_local, data)?,
                grid: self.grid,
                e: self.e,
            })
        }
    }

    /// Fake [`ShardWriter`] that collects every rank's triples in memory
    /// instead of touching disk.
    #[derive(Default)]
    struct CollectingWriter {
        shards: Mutex<HashMap<usize, Vec<(f64, usize, usize)>>>,
    }

    impl ShardWriter for CollectingWriter {
        fn write(&self, rank: usize, b: &[f64], i: &[RowIdx], j: &[ColIdx]) -> Result<(), BmatrixError> {
            let rows: Vec<(f64, usize, usize)> = b
                .iter()
                .zip(i.iter())
                .zip(j.iter())
                .map(|((&b, &i), &j)| (b, i.as_usize(), j.as_usize()))
                .collect();
            self.shards.lock().unwrap().insert(rank, rows);
            Ok(())
        }
    }

    fn constant_field(e: usize, grid: Grid, value: f64) -> FixedField {
        let n_slice = grid.nz * grid.ny;
        FixedField {
            e,
            grid,
            field: vec![value; e * n_slice * grid.nx],
        }
    }

    /// Kronecker design: member `m` is a one-hot vector at position `m`, so
    /// the resulting covariance matrix is the identity (scenario 4).
    fn identity_covariance_field(g: usize) -> FixedField {
        let grid = Grid { nz: 1, ny: 1, nx: g };
        let mut field = vec![0.0; g * g];
        for m in 0..g {
            field[m * g + m] = 1.0;
        }
        FixedField { e: g, grid, field }
    }

    /// Run the full orchestrator pipeline at `size` simulated ranks via
    /// `LocalCollective`, returning every rank's collected shard rows and
    /// the width vector rank 0 wrote to `{opref}.width.{thresh}.1.txt`.
    fn run_at(
        size: usize,
        field: Arc<FixedField>,
        thresh: f64,
        opref: String,
    ) -> (HashMap<usize, Vec<(f64, usize, usize)>>, Vec<i64>) {
        let ranks = local_ranks(size);
        let writer = Arc::new(CollectingWriter::default());
        let config = Arc::new(Config {
            infile: "fixed".into(),
            varname: "T".into(),
            thresh,
            dfact: 1,
            opref: opref.clone(),
            mean_mode: MeanMode::Anomaly,
        });

        let handles: Vec<_> = ranks
            .into_iter()
            .map(|c: LocalCollective| {
                let field = field.clone();
                let writer = writer.clone();
                let config = config.clone();
                thread::spawn(move || {
                    let orchestrator = Orchestrator::new(&c, &config, &*field, &*writer);
                    orchestrator.run(Instant::now()).unwrap()
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let shards = Arc::try_unwrap(writer)
            .unwrap_or_else(|_| panic!("writer still shared after all ranks joined"))
            .shards
            .into_inner()
            .unwrap();
        let width_path = format!("{opref}.width.{thresh}.1.txt");
        let width: Vec<i64> = std::fs::read_to_string(&width_path)
            .unwrap()
            .lines()
            .map(|l| l.parse().unwrap())
            .collect();
        (shards, width)
    }

    #[test]
    fn scenario1_constant_field_retains_full_union() {
        let dir = tempdir().unwrap();
        let opref = dir.path().join("Bmatrix").to_str().unwrap().to_string();
        let grid = Grid { nz: 2, ny: 2, nx: 2 };
        let g = grid.g();
        let field = Arc::new(constant_field(2, grid, 3.0));

        let (shards, width) = run_at(1, field, 0.5, opref);
        let pairs: HashSet<(usize, usize)> = shards.values().flatten().map(|&(_, i, j)| (i, j)).collect();
        assert_eq!(pairs.len(), g * g, "union covers every pair, both halves and the diagonal");
        assert!(shards.values().flatten().all(|&(b, _, _)| b == 9.0));
        assert!(width.iter().all(|&w| w == (g as i64) - 1), "every row's ribbon spans the full width");
    }

    #[test]
    fn scenario2_anti_correlated_points_yield_negative_covariance() {
        let dir = tempdir().unwrap();
        let opref = dir.path().join("Bmatrix").to_str().unwrap().to_string();
        let grid = Grid { nz: 1, ny: 1, nx: 2 };
        // point 0's series across the two members is [+1, -1]; point 1's is
        // the negation, [-1, +1] -> cross-covariance -1, self-variance +1.
        let field = Arc::new(FixedField {
            e: 2,
            grid,
            field: vec![1.0, -1.0, -1.0, 1.0],
        });

        let (shards, _width) = run_at(1, field, 0.9, opref);
        let rows: Vec<(f64, usize, usize)> = shards.values().flatten().cloned().collect();
        assert_eq!(rows.len(), grid.nx * grid.nx, "rho = 1 for every pair of these two points");
        for (b, i, j) in rows {
            let expected = if i == j { 1.0 } else { -1.0 };
            assert_eq!(b, expected, "diagonal is variance (+1), cross term is covariance (-1)");
        }
    }

    #[test]
    fn scenario4_two_rank_split_identity_covariance_yields_diagonal_only() {
        let g = 4;
        let dir = tempdir().unwrap();
        let opref = dir.path().join("Bmatrix").to_str().unwrap().to_string();
        let field = Arc::new(identity_covariance_field(g));

        let (shards, _width) = run_at(2, field, 0.5, opref);
        let pairs: HashSet<(usize, usize)> = shards.values().flatten().map(|&(_, i, j)| (i, j)).collect();
        assert_eq!(pairs.len(), g, "only the diagonal survives an identity covariance input");
        assert!(pairs.iter().all(|&(i, j)| i == j));
    }

    #[test]
    fn r1_rerun_is_bit_identical() {
        let grid = Grid { nz: 1, ny: 1, nx: 4 };

        let dir_a = tempdir().unwrap();
        let opref_a = dir_a.path().join("Bmatrix").to_str().unwrap().to_string();
        let (_shards_a, width_a) = run_at(2, Arc::new(constant_field(2, grid, 3.0)), 0.5, opref_a);

        let dir_b = tempdir().unwrap();
        let opref_b = dir_b.path().join("Bmatrix").to_str().unwrap().to_string();
        let (_shards_b, width_b) = run_at(2, Arc::new(constant_field(2, grid, 3.0)), 0.5, opref_b);

        assert_eq!(width_a, width_b, "R1: identical inputs produce a bit-identical width vector");
    }

    #[test]
    fn r2_shard_union_matches_single_rank_baseline() {
        let grid = Grid { nz: 1, ny: 1, nx: 4 };

        let dir1 = tempdir().unwrap();
        let opref1 = dir1.path().join("Bmatrix").to_str().unwrap().to_string();
        let (shards1, _w1) = run_at(1, Arc::new(constant_field(2, grid, 3.0)), 0.5, opref1);
        let baseline: HashSet<(usize, usize)> =
            shards1.values().flatten().map(|&(_, i, j)| (i, j)).collect();

        let dir2 = tempdir().unwrap();
        let opref2 = dir2.path().join("Bmatrix").to_str().unwrap().to_string();
        let (shards2, _w2) = run_at(2, Arc::new(constant_field(2, grid, 3.0)), 0.5, opref2);
        let union: HashSet<(usize, usize)> = shards2.values().flatten().map(|&(_, i, j)| (i, j)).collect();

        assert_eq!(baseline, union, "R2: shard union across ranks equals the single-rank baseline");
    }

    #[test]
    fn p7_result_is_independent_of_rank_count() {
        let grid = Grid { nz: 1, ny: 1, nx: 8 };
        let g = grid.g();

        let mut baseline: Option<(HashSet<(usize, usize)>, Vec<i64>)> = None;
        for &size in &[1usize, 2, 4] {
            let dir = tempdir().unwrap();
            let opref = dir.path().join("Bmatrix").to_str().unwrap().to_string();
            let (shards, width) = run_at(size, Arc::new(constant_field(2, grid, 3.0)), 0.5, opref);
            let pairs: HashSet<(usize, usize)> =
                shards.values().flatten().map(|&(_, i, j)| (i, j)).collect();
            assert_eq!(pairs.len(), g * g);

            match &baseline {
                None => baseline = Some((pairs, width)),
                Some((base_pairs, base_width)) => {
                    assert_eq!(&pairs, base_pairs, "P7: emitted pairs independent of P");
                    assert_eq!(&width, base_width, "P7: width statistic independent of P");
                }
            }
        }
    }
}

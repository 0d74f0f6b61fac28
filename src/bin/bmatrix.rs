//! `bmatrix`: SPMD driver binary
//!
//! One process per rank under `mpirun`/`srun`. Parses the CLI, initialises
//! tracing, builds the real [`MpiCollective`], and hands everything to the
//! [`Orchestrator`]. Any error is fatal: log one rank-prefixed diagnostic
//! line to stderr and abort the whole communicator (§7), never partial
//! output.

use paribbon::collective::{Collective, MpiCollective};
use paribbon::config::Config;
use paribbon::ensemble::NetcdfSlabLoader;
use paribbon::orchestrator::Orchestrator;
use paribbon::writer::NetcdfShardWriter;
use std::time::Instant;
use tracing::error;

fn main() {
    let started = Instant::now();
    let universe = mpi::initialize().expect("MPI failed to initialise");
    let collective = MpiCollective::new(&universe);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match Config::parse(&args) {
        Ok(cfg) => cfg,
        Err(e) => fatal(&collective, &e),
    };

    let loader = NetcdfSlabLoader::new(&config.infile, &config.varname);
    let writer = NetcdfShardWriter::new(&config.opref);
    let orchestrator = Orchestrator::new(&collective, &config, &loader, &writer);

    match orchestrator.run(started) {
        Ok(count) => {
            tracing::info!(rank = collective.rank().as_usize(), count, "run complete");
        }
        Err(e) => fatal(&collective, &e),
    }
}

fn fatal(collective: &MpiCollective, e: &paribbon::BmatrixError) -> ! {
    error!(rank = collective.rank().as_usize(), error = %e, "fatal");
    eprintln!("[rank {}] fatal: {e}", collective.rank().as_usize());
    collective.abort(1)
}

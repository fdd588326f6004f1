use std::{sync::Arc, thread};

use anyhow::{bail, Result};
use clap::Parser;
use dynarr::{ContextOptions, Pool, RegionContext};
use parking_lot::Mutex;
use tracing::{error, info};

use cli::Cli;
use workload::{Stats, Worker};

mod cli;
mod logging;
mod panic;
mod workload;

// The type id all nodes of the run are accounted under.
const POOL_TYPE_ID: u32 = 1;

fn main() -> Result<()> {
    logging::init();

    let cli = Cli::parse();
    let seed = cli.seed.unwrap_or_else(rand::random);
    let params = cli.workload_params;
    info!(
        seed,
        workers = params.workers,
        arrays = params.arrays,
        ops = params.ops,
        "starting"
    );

    let mut options = ContextOptions::new();
    if let Some(page_limit) = cli.page_limit {
        options.page_limit(page_limit);
    }
    let ctx = Arc::new(RegionContext::new(options));
    let pool = Pool::with_mutex(Arc::new(Mutex::new(())), POOL_TYPE_ID, ctx.clone());

    let outcome = thread::scope(|s| -> Result<Stats> {
        let mut handles = Vec::with_capacity(params.workers);
        for id in 0..params.workers {
            let worker = Worker::new(id, &pool, params.clone(), seed.wrapping_add(id as u64));
            let handle = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn_scoped(s, move || worker.run())?;
            handles.push(handle);
        }

        let mut total = Stats::default();
        let mut failure = None;
        for (id, handle) in handles.into_iter().enumerate() {
            let result = handle
                .join()
                .unwrap_or_else(|payload| Err(panic::worker_panicked(id, payload)));
            match result {
                Ok(stats) => total.merge(&stats),
                Err(e) => {
                    error!(worker = id, "{:#}", e);
                    failure.get_or_insert(e);
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(total),
        }
    });

    let info = pool.info();
    info!(
        ?info,
        free_nodes = pool.free_nodes(),
        regions = ctx.regions(),
        "pool after run"
    );

    let stats = match outcome {
        Ok(stats) => stats,
        Err(e) => bail!("run with seed {} failed: {:#}", seed, e),
    };
    if info.inuse_nodes != 0 {
        bail!(
            "run with seed {} leaked {} nodes",
            seed,
            info.inuse_nodes
        );
    }

    info!(
        sets = stats.sets,
        gets = stats.gets,
        trims = stats.trims,
        truncates = stats.truncates,
        releases = stats.releases,
        shrink_steps = stats.shrink_steps,
        out_of_memory = stats.out_of_memory,
        "finished"
    );
    Ok(())
}

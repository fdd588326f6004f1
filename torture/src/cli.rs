use clap::{Args, Parser};

#[derive(Parser, Debug)]
#[command(about = "Randomized stress run of many arrays sharing one node pool")]
pub struct Cli {
    /// The 8-byte seed to use for the random number generators of the workers.
    ///
    /// If not provided, a random seed will be generated.
    #[arg(long)]
    pub seed: Option<u64>,

    /// The maximum number of pages the memory context hands out.
    ///
    /// Running out makes writes fail, which exercises the out-of-memory paths. Unlimited if not
    /// provided.
    #[arg(long)]
    pub page_limit: Option<u32>,

    #[clap(flatten)]
    pub workload_params: WorkloadParams,
}

#[derive(Clone, Debug, Args)]
pub struct WorkloadParams {
    /// The number of worker threads, all allocating from the same pool.
    #[clap(default_value = "4")]
    #[arg(long = "workers", short = 'w')]
    pub workers: usize,

    /// The number of arrays owned by each worker.
    #[clap(default_value = "8")]
    #[arg(long = "arrays", short = 'a')]
    pub arrays: usize,

    /// The number of operations executed by each worker.
    #[clap(default_value = "100000")]
    #[arg(long = "ops", short = 'n')]
    pub ops: usize,

    /// The number of shrink steps a worker runs before yielding and checking the array.
    #[clap(default_value = "64")]
    #[clap(value_parser=clap::value_parser!(u32).range(1..))]
    #[arg(long = "step-budget", short = 's')]
    pub step_budget: u32,

    /// The highest position written to.
    #[clap(default_value = "1048576")]
    #[clap(value_parser=clap::value_parser!(u32).range(0..=dynarr::MAX_POS as i64))]
    #[arg(long = "max-pos", short = 'p')]
    pub max_pos: u32,
}

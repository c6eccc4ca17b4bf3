#![doc = include_str!("../README.md")]

mod aggregate;
mod benchmark;
mod counter;
mod error;
mod pool;
mod rank;
mod report;
mod result;
mod sampler;
mod worker_pool;
mod workload;

pub use aggregate::{upper_median, LaunchAggregator};
pub use benchmark::{
    ConcurrentBenchmark, FailurePolicy, FinalRanking, LaunchHook, LaunchReport, RunSummary,
    WorkloadFailure, DEFAULT_COOLDOWN,
};
pub use counter::{count_connections, ConnectionCounter, ProcNetTcp};
pub use error::{BenchError, BenchResult};
pub use pool::ResourcePool;
pub use rank::{rank, sort_by_order, MetricRanks, RankedResult};
pub use report::{rank_line, ReportFormat, Reporter};
pub use result::{AggregatedResult, Measured, Metric, SampleResult};
pub use sampler::{QuiesceHook, Sampler, DEFAULT_TARGET_PORT};
pub use worker_pool::{available_parallelism, Batch, Invocation, WorkerPool};
pub use workload::{Workload, WorkloadEntry, WorkloadFuture};

/// Errors that can occur while configuring or running a benchmark.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// A workload with the same (case-insensitive) name is already registered.
    #[error("Workload '{0}' is already registered")]
    DuplicateWorkload(String),

    /// The number of invocations per sampling pass must be at least one.
    #[error("Target count must be greater than 0")]
    ZeroTargetCount,

    /// The number of launches must be at least one.
    #[error("Launch count must be greater than 0")]
    ZeroLaunchCount,

    /// The worker pool needs at least one worker.
    #[error("Parallelism must be greater than 0")]
    ZeroParallelism,

    /// `run` was called before any workload was registered.
    #[error("No workloads registered")]
    NoWorkloads,

    /// One invocation of a workload returned an error.
    #[error("Workload '{name}' failed: {source:#}")]
    WorkloadFailed {
        /// Name of the failed workload.
        name: String,
        /// The error returned by the invocation.
        source: anyhow::Error,
    },

    /// A worker thread panicked while running a workload.
    #[error("Worker {worker} panicked while running workload '{name}'")]
    WorkerPanicked {
        /// Name of the workload being sampled.
        name: String,
        /// Index of the worker that panicked.
        worker: usize,
    },

    /// The operating system refused to start a worker thread.
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// Writing the report failed.
    #[error("Failed to write report: {0}")]
    Report(#[from] std::io::Error),
}

impl BenchError {
    /// Returns `true` for errors detected before any workload runs.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateWorkload(_)
                | Self::ZeroTargetCount
                | Self::ZeroLaunchCount
                | Self::ZeroParallelism
                | Self::NoWorkloads
        )
    }
}

/// Result type used across the crate.
pub type BenchResult<T = ()> = Result<T, BenchError>;

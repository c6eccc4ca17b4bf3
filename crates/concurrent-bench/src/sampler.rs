//! Executes one workload under parallel load and measures it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use tracing::{debug, info, warn};

use crate::{
    BenchError, BenchResult, ConnectionCounter, ProcNetTcp, SampleResult, WorkerPool, Workload,
};

/// Remote port whose connections are counted by default.
pub const DEFAULT_TARGET_PORT: u16 = 80;

/// A best-effort hook run before every sampling pass to settle the process,
/// e.g. to flush allocator caches.
pub type QuiesceHook = Box<dyn Fn() + Send + Sync>;

fn default_counter() -> Arc<dyn ConnectionCounter> {
    Arc::new(ProcNetTcp::default())
}

/// Produces one [`SampleResult`] per call to [`Sampler::sample`].
#[derive(Builder)]
pub struct Sampler {
    /// Workers executing the invocations.
    pool: WorkerPool,
    /// Source of the ambient connection counter.
    #[builder(default = default_counter())]
    counter: Arc<dyn ConnectionCounter>,
    /// Remote port the counter is queried for.
    #[builder(default = DEFAULT_TARGET_PORT)]
    target_port: u16,
    /// Optional settle step before the first snapshot.
    quiesce: Option<QuiesceHook>,
}

impl Sampler {
    /// Degree of parallelism used for every sampling pass.
    pub fn parallelism(&self) -> usize {
        self.pool.parallelism()
    }

    /// Remote port the connection counter is queried for.
    pub fn target_port(&self) -> u16 {
        self.target_port
    }

    /// Runs `workload` exactly `target_count` times under parallel load.
    ///
    /// The phases always run in this order: quiesce, first counter snapshot,
    /// parallel execution (timed as a whole and per invocation), second
    /// counter snapshot. The total excludes worker thread startup. Any
    /// failing invocation aborts the pass.
    pub fn sample(
        &self,
        target_count: usize,
        name: &str,
        workload: &Workload,
    ) -> BenchResult<SampleResult> {
        if target_count == 0 {
            return Err(BenchError::ZeroTargetCount);
        }

        if let Some(quiesce) = &self.quiesce {
            quiesce();
        }

        let before = self.snapshot();
        let batch = self.pool.run(name, target_count, workload)?;
        let after = self.snapshot();

        let tcp = match (before, after) {
            (Some(before), Some(after)) => after.saturating_sub(before) as u64,
            _ => 0,
        };

        let timings: Vec<Duration> = batch.invocations.iter().map(|i| i.elapsed).collect();
        let threads = batch.invocations.iter().map(|i| i.worker).collect();
        // A successful batch of a positive count always has invocations.
        let result = SampleResult::from_timings(name, &timings, batch.elapsed, tcp, threads)
            .ok_or(BenchError::ZeroTargetCount)?;

        info!(
            workload = name,
            invocations = timings.len(),
            total_ms = result.total,
            avg_ms = result.avg,
            tcp,
            "Sampling pass finished"
        );
        Ok(result)
    }

    fn snapshot(&self) -> Option<usize> {
        match self.counter.active_connections(self.target_port) {
            Ok(count) => {
                debug!(port = self.target_port, count, "Connection counter snapshot");
                Some(count)
            }
            Err(err) => {
                warn!(
                    port = self.target_port,
                    error = format!("{err:#}"),
                    "Connection counter unavailable, the connection delta is reported as 0"
                );
                None
            }
        }
    }
}

impl fmt::Debug for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sampler")
            .field("pool", &self.pool)
            .field("target_port", &self.target_port)
            .field("quiesce", &self.quiesce.is_some())
            .finish_non_exhaustive()
    }
}

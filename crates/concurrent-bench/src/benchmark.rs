//! The workload registry and the launch driver.

use std::io::Write;
use std::thread;
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    rank, sort_by_order, AggregatedResult, BenchError, BenchResult, LaunchAggregator,
    RankedResult, Reporter, SampleResult, Sampler, Workload, WorkloadEntry,
};

/// Pause between two workloads of a launch.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(500);

/// Caller state reset, run synchronously before every launch.
pub type LaunchHook = Box<dyn FnMut() + Send>;

/// What the driver does when a sampling pass fails.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Report the failure and keep sampling the remaining workloads.
    #[default]
    Continue,
    /// Stop the run and return the failure.
    Abort,
}

/// A workload whose sampling pass failed during a launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadFailure {
    /// Name of the failed workload.
    pub name: String,
    /// The rendered error of the failed pass.
    pub error: String,
}

/// Everything computed for one launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchReport {
    /// Results in registration order.
    pub results: Vec<SampleResult>,
    /// Ranked results, best composite order first.
    pub ranked: Vec<RankedResult<SampleResult>>,
    /// Workloads that produced no result in this launch.
    pub failures: Vec<WorkloadFailure>,
}

/// Outcome of [`ConcurrentBenchmark::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub launches: Vec<LaunchReport>,
    /// Cross-launch ranking, present only when more than one launch ran.
    pub aggregated: Option<Vec<RankedResult<AggregatedResult>>>,
}

impl RunSummary {
    /// The final leaderboard: the aggregated ranking when there is one,
    /// otherwise the ranking of the single launch.
    pub fn final_ranking(&self) -> FinalRanking<'_> {
        match &self.aggregated {
            Some(aggregated) => FinalRanking::Aggregated(aggregated),
            None => FinalRanking::Launch(
                self.launches
                    .last()
                    .map(|launch| launch.ranked.as_slice())
                    .unwrap_or_default(),
            ),
        }
    }
}

/// Borrowed view of the final leaderboard of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FinalRanking<'a> {
    Launch(&'a [RankedResult<SampleResult>]),
    Aggregated(&'a [RankedResult<AggregatedResult>]),
}

/// Compares named workloads under identical parallel load.
///
/// Workloads run one after another. Each one is sampled by the [`Sampler`]
/// with full parallelism among its own invocations.
#[derive(Builder)]
pub struct ConcurrentBenchmark<W> {
    sampler: Sampler,
    reporter: Reporter<W>,
    #[builder(default = DEFAULT_COOLDOWN)]
    cooldown: Duration,
    #[builder(default)]
    on_failure: FailurePolicy,
    #[builder(skip)]
    workloads: Vec<WorkloadEntry>,
    #[builder(skip)]
    hooks: Vec<LaunchHook>,
}

impl<W: Write> ConcurrentBenchmark<W> {
    /// Adds a workload. Names must be unique ignoring case.
    pub fn register(&mut self, name: impl Into<String>, workload: Workload) -> BenchResult {
        let name = name.into();
        let key = name.to_lowercase();
        if self.workloads.iter().any(|w| w.name.to_lowercase() == key) {
            return Err(BenchError::DuplicateWorkload(name));
        }

        self.workloads.push(WorkloadEntry { name, workload });
        Ok(())
    }

    /// Adds a hook run before every launch, after the hooks added earlier.
    pub fn before_each_launch(&mut self, hook: impl FnMut() + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Registered workloads in registration order.
    pub fn workloads(&self) -> &[WorkloadEntry] {
        &self.workloads
    }

    /// Consumes the driver and returns the report sink.
    pub fn into_reporter(self) -> Reporter<W> {
        self.reporter
    }

    /// Runs `launch_count` launches of `target_count` invocations per workload.
    ///
    /// Counts and the registry are validated before anything runs.
    pub fn run(&mut self, launch_count: usize, target_count: usize) -> BenchResult<RunSummary> {
        if launch_count == 0 {
            return Err(BenchError::ZeroLaunchCount);
        }
        if target_count == 0 {
            return Err(BenchError::ZeroTargetCount);
        }
        if self.workloads.is_empty() {
            return Err(BenchError::NoWorkloads);
        }

        info!(
            launch_count,
            target_count,
            workloads = self.workloads.len(),
            parallelism = self.sampler.parallelism(),
            "Starting benchmark"
        );

        let mut aggregator = LaunchAggregator::new();
        let mut launches = Vec::with_capacity(launch_count);

        for launch in 0..launch_count {
            let report = self.launch(launch, target_count)?;
            aggregator.record(report.results.clone());
            launches.push(report);
        }

        let aggregated = match aggregator.summary() {
            Some(summary) => {
                let ranked = sort_by_order(rank(&summary));
                self.reporter.run_summary(&ranked)?;
                Some(ranked)
            }
            None => None,
        };

        Ok(RunSummary {
            launches,
            aggregated,
        })
    }

    fn launch(&mut self, launch: usize, target_count: usize) -> BenchResult<LaunchReport> {
        for hook in &mut self.hooks {
            hook();
        }

        info!(launch, "Launch started");
        self.reporter.launch_started()?;

        let mut results = Vec::with_capacity(self.workloads.len());
        let mut failures = Vec::new();

        for (index, entry) in self.workloads.iter().enumerate() {
            if index > 0 && !self.cooldown.is_zero() {
                thread::sleep(self.cooldown);
            }

            self.reporter.workload_started(&entry.name)?;
            match self.sampler.sample(target_count, &entry.name, &entry.workload) {
                Ok(result) => {
                    self.reporter.workload_finished(&result)?;
                    results.push(result);
                }
                Err(err) => {
                    error!(
                        launch,
                        workload = %entry.name,
                        error = err.to_string(),
                        "Sampling pass failed"
                    );
                    self.reporter.workload_failed(&entry.name, &err)?;
                    if self.on_failure == FailurePolicy::Abort {
                        return Err(err);
                    }
                    failures.push(WorkloadFailure {
                        name: entry.name.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        let ranked = sort_by_order(rank(&results));
        self.reporter.launch_summary(&ranked)?;
        info!(
            launch,
            sampled = results.len(),
            failed = failures.len(),
            "Launch finished"
        );

        Ok(LaunchReport {
            results,
            ranked,
            failures,
        })
    }
}

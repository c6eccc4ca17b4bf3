//! Ranks HTTP client acquisition strategies under parallel load.
//!
//! Every strategy requests the same URL `target_count` times per launch on a
//! fixed pool of worker threads. The report goes to stdout, logs to stderr.

mod cli;
mod logging;
mod strategies;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use concurrent_bench::{ConcurrentBenchmark, Reporter, RunSummary, Sampler, WorkerPool};
use tokio::runtime::Handle;
use tracing::info;

use crate::cli::Args;
use crate::strategies::ClientStrategies;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::initialize_logging()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("bench-runtime")
        .build()
        .context("Failed to start the async runtime")?;

    let summary = run(&args, runtime.handle())?;

    if let Some(path) = &args.json {
        write_summary(path, &summary)?;
        info!(path = %path.display(), "Run summary written");
    }
    Ok(())
}

fn run(args: &Args, runtime: &Handle) -> anyhow::Result<RunSummary> {
    let sampler = Sampler::builder()
        .pool(WorkerPool::new(args.parallelism(), runtime.clone())?)
        .target_port(args.target_port())
        .build();
    let mut benchmark = ConcurrentBenchmark::builder()
        .sampler(sampler)
        .reporter(Reporter::stdout(args.format.into()))
        .cooldown(args.cooldown)
        .on_failure(args.on_failure.into())
        .build();

    let strategies = Arc::new(ClientStrategies::new(
        args.url.clone(),
        args.request_timeout,
    ));
    let reset = Arc::clone(&strategies);
    benchmark.before_each_launch(move || reset.reset());

    for strategy in args.strategies() {
        benchmark.register(strategy.to_string(), strategies.workload(strategy))?;
    }

    info!(
        url = %args.url,
        launch_count = args.launch_count,
        target_count = args.target_count(),
        parallelism = args.parallelism(),
        target_port = args.target_port(),
        "Comparing HTTP client strategies"
    );
    Ok(benchmark.run(args.launch_count, args.target_count())?)
}

fn write_summary(path: &Path, summary: &RunSummary) -> anyhow::Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, summary)
        .with_context(|| format!("Failed to serialize the run summary to {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

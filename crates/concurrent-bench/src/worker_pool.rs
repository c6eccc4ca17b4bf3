//! Fixed-size pool of OS threads executing workload invocations.

use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::runtime::Handle;
use tracing::debug;

use crate::{BenchError, BenchResult, Workload};

/// One completed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    /// Time between starting and finishing the invocation.
    pub elapsed: Duration,
    /// Index of the worker that ran it, in `0..parallelism`.
    pub worker: usize,
}

/// All invocations of one [`WorkerPool::run`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Completed invocations, grouped by worker.
    pub invocations: Vec<Invocation>,
    /// Wall clock time from releasing the started workers until the last one
    /// finished. Thread startup is not included.
    pub elapsed: Duration,
}

/// Runs a workload a fixed number of times on `parallelism` dedicated threads.
///
/// Invocation indices are range-partitioned up front: worker `k` runs indices
/// `k`, `k + parallelism`, `k + 2 * parallelism`, and so on. Every worker
/// therefore takes part as soon as there are at least `parallelism`
/// invocations, independently of how fast individual invocations complete.
///
/// Each worker drives its current invocation to completion with
/// [`Handle::block_on`], so tasks spawned by the workload (connection drivers,
/// timers) run on the shared runtime while the worker waits.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    parallelism: usize,
    runtime: Handle,
}

enum WorkerError {
    Failed(anyhow::Error),
    Panicked,
}

/// Holds the workers back until every worker thread has been spawned.
#[derive(Default)]
struct StartGate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl StartGate {
    fn open(&self) {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.opened.notify_all();
    }

    fn wait(&self) {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        let _open = self
            .opened
            .wait_while(open, |open| !*open)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

impl WorkerPool {
    /// Creates a pool with an explicit degree of parallelism.
    pub fn new(parallelism: usize, runtime: Handle) -> BenchResult<Self> {
        if parallelism == 0 {
            return Err(BenchError::ZeroParallelism);
        }
        Ok(Self {
            parallelism,
            runtime,
        })
    }

    /// Creates a pool sized to the available hardware parallelism.
    pub fn with_available_parallelism(runtime: Handle) -> Self {
        Self {
            parallelism: available_parallelism(),
            runtime,
        }
    }

    /// The number of worker threads.
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Runs `workload` exactly `count` times and blocks until every invocation
    /// finished.
    ///
    /// Workers start invoking only once all of them have been spawned, and the
    /// batch is timed from that moment on. The first failing or panicking
    /// invocation stops the remaining workers from starting new invocations,
    /// and its error is returned instead of the partial timings.
    pub fn run(&self, name: &str, count: usize, workload: &Workload) -> BenchResult<Batch> {
        let workers = self.parallelism.min(count);
        if workers == 0 {
            return Ok(Batch {
                invocations: Vec::new(),
                elapsed: Duration::ZERO,
            });
        }
        let abort = AtomicBool::new(false);
        let gate = StartGate::default();

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            let mut spawn_error = None;

            for worker in 0..workers {
                let abort = &abort;
                let gate = &gate;
                let runtime = &self.runtime;
                let spawned = thread::Builder::new()
                    .name(format!("bench-worker-{worker}"))
                    .spawn_scoped(scope, move || {
                        gate.wait();
                        run_partition(runtime, workload, worker, workers, count, abort)
                    });

                match spawned {
                    Ok(handle) => handles.push((worker, handle)),
                    Err(err) => {
                        abort.store(true, Ordering::Relaxed);
                        spawn_error = Some(BenchError::Spawn(err));
                        break;
                    }
                }
            }

            let started = Instant::now();
            gate.open();

            let mut invocations = Vec::with_capacity(count);
            let mut first_error = spawn_error;

            for (worker, handle) in handles {
                let outcome = handle.join().unwrap_or(Err(WorkerError::Panicked));
                match outcome {
                    Ok(done) => {
                        debug!(
                            workload = name,
                            worker,
                            invocations = done.len(),
                            "Worker finished"
                        );
                        invocations.extend(done);
                    }
                    Err(err) if first_error.is_none() => {
                        first_error = Some(match err {
                            WorkerError::Failed(source) => BenchError::WorkloadFailed {
                                name: name.to_owned(),
                                source,
                            },
                            WorkerError::Panicked => BenchError::WorkerPanicked {
                                name: name.to_owned(),
                                worker,
                            },
                        });
                    }
                    Err(_) => {}
                }
            }

            let elapsed = started.elapsed();

            match first_error {
                Some(err) => Err(err),
                None => Ok(Batch {
                    invocations,
                    elapsed,
                }),
            }
        })
    }
}

fn run_partition(
    runtime: &Handle,
    workload: &Workload,
    worker: usize,
    stride: usize,
    count: usize,
    abort: &AtomicBool,
) -> Result<Vec<Invocation>, WorkerError> {
    let mut done = Vec::with_capacity(count / stride + 1);

    for _ in (worker..count).step_by(stride) {
        if abort.load(Ordering::Relaxed) {
            break;
        }

        let started = Instant::now();
        // Creating the future runs the synchronous part of the workload.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| workload.invoke()))
            .and_then(|future| runtime.block_on(AssertUnwindSafe(future).catch_unwind()));
        let elapsed = started.elapsed();

        let error = match outcome {
            Ok(Ok(())) => {
                done.push(Invocation { elapsed, worker });
                continue;
            }
            Ok(Err(err)) => WorkerError::Failed(err),
            Err(_panic) => WorkerError::Panicked,
        };
        abort.store(true, Ordering::Relaxed);
        return Err(error);
    }

    Ok(done)
}

/// Number of processing units available to the process, at least 1.
pub fn available_parallelism() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use anyhow::bail;

    use super::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .build()
            .unwrap()
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let rt = runtime();
        let err = WorkerPool::new(0, rt.handle().clone()).unwrap_err();
        assert!(matches!(err, BenchError::ZeroParallelism));
    }

    #[test]
    fn runs_exactly_count_invocations() {
        let rt = runtime();
        let pool = WorkerPool::new(3, rt.handle().clone()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let workload = Workload::new(move || {
            let calls = Arc::clone(&counted);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let invocations = pool.run("count", 10, &workload).unwrap().invocations;
        assert_eq!(invocations.len(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 10);

        // 10 invocations over 3 workers: 4 + 3 + 3.
        let mut per_worker = [0usize; 3];
        for invocation in &invocations {
            per_worker[invocation.worker] += 1;
        }
        assert_eq!(per_worker, [4, 3, 3]);
    }

    #[test]
    fn every_worker_participates() {
        let rt = runtime();
        let pool = WorkerPool::new(4, rt.handle().clone()).unwrap();
        let workload = Workload::new(|| async { Ok(()) });

        let invocations = pool.run("noop", 100, &workload).unwrap().invocations;
        let workers: HashSet<_> = invocations.iter().map(|i| i.worker).collect();
        assert_eq!(workers, HashSet::from([0, 1, 2, 3]));
    }

    #[test]
    fn invocations_run_on_distinct_threads() {
        let rt = runtime();
        let pool = WorkerPool::new(4, rt.handle().clone()).unwrap();
        let names = Arc::new(std::sync::Mutex::new(HashSet::new()));
        let seen = Arc::clone(&names);
        let workload = Workload::new(move || {
            // Captured before the future is polled: this is the worker thread.
            let name = thread::current().name().map(str::to_owned);
            seen.lock().unwrap().insert(name);
            async { Ok(()) }
        });

        pool.run("threads", 8, &workload).unwrap();
        assert_eq!(names.lock().unwrap().len(), 4);
    }

    #[test]
    fn fewer_invocations_than_workers_uses_fewer_workers() {
        let rt = runtime();
        let pool = WorkerPool::new(8, rt.handle().clone()).unwrap();
        let workload = Workload::new(|| async { Ok(()) });

        let batch = pool.run("small", 2, &workload).unwrap();
        assert_eq!(batch.invocations.len(), 2);
    }

    #[test]
    fn invocations_suspend_without_blocking_each_other() {
        let rt = runtime();
        let pool = WorkerPool::new(4, rt.handle().clone()).unwrap();
        let workload = Workload::new(|| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        });

        let started = Instant::now();
        let batch = pool.run("sleep", 4, &workload).unwrap();
        assert_eq!(batch.invocations.len(), 4);
        assert!(batch
            .invocations
            .iter()
            .all(|i| i.elapsed >= Duration::from_millis(50)));
        // Run one after another this would take at least 200ms.
        assert!(started.elapsed() < Duration::from_millis(190));
    }

    #[test]
    fn batch_time_covers_every_invocation() {
        let rt = runtime();
        let pool = WorkerPool::new(3, rt.handle().clone()).unwrap();
        let workload = Workload::new(|| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(())
        });

        let started = Instant::now();
        let batch = pool.run("timed", 9, &workload).unwrap();
        let outer = started.elapsed();

        let longest = batch.invocations.iter().map(|i| i.elapsed).max().unwrap();
        assert!(batch.elapsed >= longest);
        // Three sequential invocations per worker.
        assert!(batch.elapsed >= Duration::from_millis(15));
        assert!(batch.elapsed <= outer);
    }

    #[test]
    fn first_failure_aborts_the_batch() {
        let rt = runtime();
        let pool = WorkerPool::new(2, rt.handle().clone()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let workload = Workload::new(move || {
            let call = counted.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 3 {
                    bail!("connection refused");
                }
                Ok(())
            }
        });

        let err = pool.run("flaky", 1_000, &workload).unwrap_err();
        match err {
            BenchError::WorkloadFailed { name, source } => {
                assert_eq!(name, "flaky");
                assert_eq!(source.to_string(), "connection refused");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(calls.load(Ordering::SeqCst) < 1_000);
    }

    #[test]
    fn panics_are_reported_as_errors() {
        let rt = runtime();
        let pool = WorkerPool::new(2, rt.handle().clone()).unwrap();
        async fn explode() -> anyhow::Result<()> {
            panic!("boom")
        }
        let workload = Workload::new(explode);

        let err = pool.run("panicky", 4, &workload).unwrap_err();
        assert!(matches!(err, BenchError::WorkerPanicked { ref name, .. } if name == "panicky"));
    }

    #[test]
    fn panics_before_the_future_is_created_abort_the_batch() {
        let rt = runtime();
        let pool = WorkerPool::new(2, rt.handle().clone()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let workload = Workload::new(move || {
            if counted.fetch_add(1, Ordering::SeqCst) == 3 {
                panic!("closure panicked");
            }
            async {
                tokio::time::sleep(Duration::from_millis(1)).await;
                Ok(())
            }
        });

        let err = pool.run("sync", 1_000, &workload).unwrap_err();
        assert!(matches!(err, BenchError::WorkerPanicked { ref name, .. } if name == "sync"));
        let calls = calls.load(Ordering::SeqCst);
        assert!(calls < 100, "{calls} invocations ran after the panic");
    }
}

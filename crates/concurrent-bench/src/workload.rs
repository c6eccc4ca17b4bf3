use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

/// The future produced by one invocation of a workload.
pub type WorkloadFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A zero-argument asynchronous operation executed for its side effects.
///
/// Workloads are opaque to the benchmark: only their duration and whether they
/// fail matter.
#[derive(Clone)]
pub struct Workload(Arc<dyn Fn() -> WorkloadFuture + Send + Sync>);

impl Workload {
    /// Wraps an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self(Arc::new(move || f().boxed()))
    }

    /// Starts one invocation.
    pub fn invoke(&self) -> WorkloadFuture {
        (self.0)()
    }
}

impl fmt::Debug for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Workload(..)")
    }
}

/// A workload registered under a name.
#[derive(Debug, Clone)]
pub struct WorkloadEntry {
    pub(crate) name: String,
    pub(crate) workload: Workload,
}

impl WorkloadEntry {
    /// The name the workload was registered with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The registered operation.
    pub fn workload(&self) -> &Workload {
        &self.workload
    }
}

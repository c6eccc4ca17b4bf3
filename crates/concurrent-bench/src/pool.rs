//! A reuse cache for values that are expensive to construct.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Factory<T> = dyn Fn() -> anyhow::Result<T> + Send + Sync;

/// Thread-safe pool of reusable instances.
///
/// [`ResourcePool::acquire`] hands out a previously released instance when one
/// is queued and falls back to the factory otherwise. There is no capacity
/// bound and no eviction: every released instance stays queued until it is
/// acquired again. Cloning the pool yields another handle to the same queue.
pub struct ResourcePool<T> {
    idle: Arc<Mutex<VecDeque<T>>>,
    factory: Arc<Factory<T>>,
    created: Arc<AtomicUsize>,
}

impl<T> ResourcePool<T> {
    /// Creates an empty pool which builds new instances with `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self {
            idle: Arc::new(Mutex::new(VecDeque::new())),
            factory: Arc::new(factory),
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Takes the oldest queued instance, or constructs a new one.
    pub fn acquire(&self) -> anyhow::Result<T> {
        if let Some(instance) = self.queue().pop_front() {
            return Ok(instance);
        }

        let instance = (self.factory)()?;
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(instance)
    }

    /// Returns an instance to the pool.
    pub fn release(&self, instance: T) {
        self.queue().push_back(instance);
    }

    /// Number of instances the factory has produced so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Number of instances currently waiting to be reused.
    pub fn idle(&self) -> usize {
        self.queue().len()
    }

    // The queue holds plain values, so a panic in another thread cannot leave
    // it in a state that is unsafe to keep using.
    fn queue(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Clone for ResourcePool<T> {
    fn clone(&self) -> Self {
        Self {
            idle: Arc::clone(&self.idle),
            factory: Arc::clone(&self.factory),
            created: Arc::clone(&self.created),
        }
    }
}

impl<T> fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("idle", &self.idle())
            .field("created", &self.created())
            .finish()
    }
}

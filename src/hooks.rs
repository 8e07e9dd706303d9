// Injected collaborator seams: backpressure accounting and continuation
// dispatch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Outstanding-byte accounting used for backpressure.
///
/// The channel calls [`add`](FlowControl::add) before appended bytes become
/// visible to the consumer and [`subtract`](FlowControl::subtract) only
/// after the chain head has advanced past consumed bytes, so the count never
/// under-reports what is actually buffered.
pub trait FlowControl: Send + Sync {
    fn add(&self, count: usize);
    fn subtract(&self, count: usize);
}

/// Simple atomic gauge implementation of [`FlowControl`].
pub struct FlowMeter {
    level: AtomicUsize,
}

impl FlowMeter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            level: AtomicUsize::new(0),
        })
    }

    /// Current outstanding byte count.
    pub fn level(&self) -> usize {
        self.level.load(Ordering::Acquire)
    }
}

impl FlowControl for FlowMeter {
    fn add(&self, count: usize) {
        self.level.fetch_add(count, Ordering::AcqRel);
    }

    fn subtract(&self, count: usize) {
        debug_assert!(self.level.load(Ordering::Acquire) >= count);
        self.level.fetch_sub(count, Ordering::AcqRel);
    }
}

/// Runs a waiting consumer's continuation.
///
/// Contract: when invoked from a producer path the task must not run
/// synchronously on the caller's stack, so producer latency stays bounded.
/// Which thread eventually runs it is scheduler-defined.
pub trait Scheduler: Send + Sync {
    fn run(&self, task: Box<dyn FnOnce() + Send>);
}

/// Scheduler that runs each task on a fresh thread. Fine for demos and
/// thread-per-connection servers.
pub struct ThreadScheduler;

impl ThreadScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl Scheduler for ThreadScheduler {
    fn run(&self, task: Box<dyn FnOnce() + Send>) {
        thread::spawn(task);
    }
}

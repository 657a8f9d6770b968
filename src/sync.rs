//! CPU-GPU completion fences.
//!
//! A ring segment may not be rewritten while the device could still be
//! reading it. [`FenceSynchronizer`] wraps the backend's fence primitives
//! with the wait policy used across the crate: a bounded number of
//! non-blocking polls with escalating backoff, then exactly one
//! unconditional blocking wait as the correctness backstop. The escalation
//! is logged so a driver that never signals is visible instead of a silent
//! stall.
//!
//! Releasing a fence is dropping its handle; [`release`] exists so call
//! sites read as an explicit lifecycle.
//!
//! [`release`]: FenceSynchronizer::release

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::{GpuBackend, GpuFence};

/// Non-blocking fence state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The device has completed the tracked work.
    Signaled,
    /// The tracked work is still in flight.
    Pending,
}

/// How a [`FenceSynchronizer::wait`] call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The fence was already signaled on entry; no waiting happened.
    AlreadySignaled,
    /// The fence signaled during the polling phase.
    Signaled,
    /// Polling exhausted its budget; the unconditional blocking wait ran.
    Escalated,
}

/// Poll-then-block fence wait policy.
#[derive(Clone)]
pub struct FenceSynchronizer {
    backend: Arc<dyn GpuBackend>,
    budget: Duration,
    max_polls: u32,
}

impl FenceSynchronizer {
    /// Default total polling time before escalating to a blocking wait.
    pub const DEFAULT_BUDGET: Duration = Duration::from_millis(4);

    /// Default maximum number of polls before escalating.
    pub const DEFAULT_MAX_POLLS: u32 = 64;

    /// Polls that spin-yield before the backoff starts sleeping.
    const SPIN_POLLS: u32 = 8;

    /// Create a synchronizer with the default wait policy.
    pub fn new(backend: Arc<dyn GpuBackend>) -> Self {
        Self {
            backend,
            budget: Self::DEFAULT_BUDGET,
            max_polls: Self::DEFAULT_MAX_POLLS,
        }
    }

    /// Set the total polling budget.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Set the maximum number of polls.
    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }

    /// Create a completion marker for all device work submitted so far.
    pub fn record(&self) -> GpuFence {
        self.backend.create_fence(false)
    }

    /// Check a fence without blocking.
    pub fn poll(&self, fence: &GpuFence) -> FenceStatus {
        if self.backend.is_fence_signaled(fence) {
            FenceStatus::Signaled
        } else {
            FenceStatus::Pending
        }
    }

    /// Wait until the fence signals.
    ///
    /// Polls up to `max_polls` times within the budget, yielding first and
    /// then sleeping with doubling backoff. If the fence still has not
    /// signaled, performs one unconditional blocking wait.
    pub fn wait(&self, fence: &GpuFence) -> WaitOutcome {
        if self.backend.is_fence_signaled(fence) {
            return WaitOutcome::AlreadySignaled;
        }

        let start = Instant::now();
        let mut backoff = Duration::from_micros(100);
        for poll in 0..self.max_polls {
            if start.elapsed() >= self.budget {
                break;
            }
            if poll < Self::SPIN_POLLS {
                std::thread::yield_now();
            } else {
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(Duration::from_millis(2));
            }
            if self.backend.is_fence_signaled(fence) {
                return WaitOutcome::Signaled;
            }
        }

        log::warn!(
            "fence still pending after {} polls over {:?}; blocking until the device signals",
            self.max_polls,
            start.elapsed()
        );
        self.backend.wait_fence(fence);
        WaitOutcome::Escalated
    }

    /// Destroy a completion marker.
    pub fn release(&self, fence: GpuFence) {
        log::trace!("releasing fence {:?}", fence);
        drop(fence);
    }
}

impl std::fmt::Debug for FenceSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FenceSynchronizer")
            .field("budget", &self.budget)
            .field("max_polls", &self.max_polls)
            .field("backend", &self.backend.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;

    fn synchronizer(backend: &Arc<DummyBackend>) -> FenceSynchronizer {
        FenceSynchronizer::new(backend.clone() as Arc<dyn GpuBackend>)
            .with_budget(Duration::from_millis(2))
            .with_max_polls(16)
    }

    #[test]
    fn test_signaled_fence_returns_immediately() {
        let backend = Arc::new(DummyBackend::new());
        let sync = synchronizer(&backend);

        let fence = sync.record();
        assert_eq!(sync.poll(&fence), FenceStatus::Signaled);
        assert_eq!(sync.wait(&fence), WaitOutcome::AlreadySignaled);
        assert!(backend.waits().is_empty());
        sync.release(fence);
    }

    #[test]
    fn test_wait_observes_concurrent_signal() {
        let backend = Arc::new(DummyBackend::new());
        backend.set_auto_signal(false);
        let sync = synchronizer(&backend).with_budget(Duration::from_millis(100));

        let fence = sync.record();
        assert_eq!(sync.poll(&fence), FenceStatus::Pending);

        let signaler = Arc::clone(&backend);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_micros(200));
            signaler.signal_all_fences();
        });

        let outcome = sync.wait(&fence);
        handle.join().unwrap();
        assert!(matches!(
            outcome,
            WaitOutcome::Signaled | WaitOutcome::Escalated
        ));
        sync.release(fence);
    }

    #[test]
    fn test_wait_escalates_after_budget() {
        let backend = Arc::new(DummyBackend::new());
        backend.set_auto_signal(false);
        let sync = synchronizer(&backend);

        let fence = sync.record();
        assert_eq!(sync.wait(&fence), WaitOutcome::Escalated);
        assert_eq!(backend.waits(), vec![0]);
        // The backstop wait completed the fence.
        assert_eq!(sync.poll(&fence), FenceStatus::Signaled);
        sync.release(fence);
    }
}

//! `WaitStrategy` (spec.md §4.2, §9): two operations, `wait_for_millis`
//! and `success`, so the scheduler stays decoupled from the backoff
//! policy. `ExponentialBackoffWaitStrategy`'s bookkeeping mirrors the
//! teacher's `CircuitBreaker` consecutive-failure counter.

use std::sync::atomic::{AtomicU32, Ordering};

pub trait WaitStrategy: Send + Sync {
    /// Delay, in milliseconds, before the next scheduler tick.
    fn wait_for_millis(&self) -> u64;

    /// Called only on ticks that advanced at least one process
    /// (spec.md §4.2 step 3, §9: "the scheduler must call `success` only
    /// on productive ticks to keep backoff meaningful").
    fn success(&self);
}

/// Fixed delay between ticks, regardless of outcome.
#[derive(Debug, Clone, Copy)]
pub struct ConstantWaitStrategy {
    millis: u64,
}

impl ConstantWaitStrategy {
    pub fn new(millis: u64) -> Self {
        Self { millis }
    }
}

impl WaitStrategy for ConstantWaitStrategy {
    fn wait_for_millis(&self) -> u64 {
        self.millis
    }

    fn success(&self) {}
}

/// Backs off geometrically on idle ticks, resets on productive ticks.
#[derive(Debug)]
pub struct ExponentialBackoffWaitStrategy {
    base_millis: u64,
    max_millis: u64,
    consecutive_idle_ticks: AtomicU32,
}

impl ExponentialBackoffWaitStrategy {
    pub fn new(base_millis: u64, max_millis: u64) -> Self {
        Self {
            base_millis,
            max_millis,
            consecutive_idle_ticks: AtomicU32::new(0),
        }
    }
}

impl Default for ExponentialBackoffWaitStrategy {
    fn default() -> Self {
        Self::new(100, 5_000)
    }
}

impl WaitStrategy for ExponentialBackoffWaitStrategy {
    fn wait_for_millis(&self) -> u64 {
        let idle_ticks = self.consecutive_idle_ticks.fetch_add(1, Ordering::Relaxed);
        let delay = self.base_millis.saturating_mul(1u64 << idle_ticks.min(16));
        delay.min(self.max_millis)
    }

    fn success(&self) {
        self.consecutive_idle_ticks.store(0, Ordering::Relaxed);
    }
}

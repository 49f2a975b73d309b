//! Deferred-work scheduling seam.
//!
//! # Responsibility
//! - Arm one-shot timers that run an async task after a delay.
//! - Allow cancellation of any timer that has not fired yet.
//!
//! # Invariants
//! - A cancelled timer never runs its task.
//! - `cancel` on a fired or unknown token is a no-op returning `false`.

mod manual;
mod tokio_scheduler;

pub use manual::ManualScheduler;
pub use tokio_scheduler::TokioScheduler;

use futures::future::BoxFuture;
use std::time::Duration;

/// Work executed when a timer fires.
pub type TimerTask = BoxFuture<'static, ()>;

/// Handle used to cancel one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

impl TimerToken {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

pub trait Scheduler: Send + Sync {
    /// Arms a timer running `task` once `delay` has elapsed.
    fn after(&self, delay: Duration, task: TimerTask) -> TimerToken;

    /// Cancels a pending timer. Returns whether the timer was still pending.
    fn cancel(&self, token: TimerToken) -> bool;
}

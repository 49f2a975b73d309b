//! Wall-clock seam.
//!
//! Stores and queues never read the system time directly, so tests can run
//! against the virtual clock of [`crate::scheduler::ManualScheduler`].

use chrono::{DateTime, Duration, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the host system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Returns a timestamp strictly later than `previous`.
///
/// Clocks with coarse resolution (or a paused virtual clock) can return the
/// same instant twice; entity `updated_at` must still move forward.
pub fn advance_past(now: DateTime<Utc>, previous: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}

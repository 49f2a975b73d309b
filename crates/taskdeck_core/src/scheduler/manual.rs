//! Virtual-clock scheduler for deterministic tests and replays.

use super::{Scheduler, TimerTask, TimerToken};
use crate::clock::Clock;
use crate::lock_recover;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Mutex;
use std::time::Duration;

struct PendingTimer {
    token: TimerToken,
    due: DateTime<Utc>,
    task: TimerTask,
}

struct ManualState {
    now: DateTime<Utc>,
    next_token: u64,
    pending: Vec<PendingTimer>,
}

/// Scheduler whose time only moves when [`ManualScheduler::advance`] is awaited.
///
/// Doubles as the [`Clock`] so timestamps and timers agree.
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: start,
                next_token: 1,
                pending: Vec::new(),
            }),
        }
    }

    pub fn pending_count(&self) -> usize {
        lock_recover(&self.state).pending.len()
    }

    /// Moves virtual time forward, running every timer that comes due.
    ///
    /// Timers fire in due order (ties in arming order); timers armed by a
    /// firing task are honored when they fall inside the same window.
    pub async fn advance(&self, by: Duration) {
        let target = {
            let state = lock_recover(&self.state);
            offset(state.now, by)
        };

        loop {
            let next = {
                let mut state = lock_recover(&self.state);
                let position = state
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.due <= target)
                    .min_by_key(|(_, timer)| (timer.due, timer.token))
                    .map(|(position, _)| position);
                match position {
                    Some(position) => {
                        let timer = state.pending.remove(position);
                        state.now = timer.due;
                        Some(timer.task)
                    }
                    None => None,
                }
            };

            match next {
                Some(task) => task.await,
                None => break,
            }
        }

        let mut state = lock_recover(&self.state);
        if state.now < target {
            state.now = target;
        }
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        let start = Utc
            .timestamp_millis_opt(1_700_000_000_000)
            .single()
            .unwrap_or_else(Utc::now);
        Self::new(start)
    }
}

impl Clock for ManualScheduler {
    fn now(&self) -> DateTime<Utc> {
        lock_recover(&self.state).now
    }
}

impl Scheduler for ManualScheduler {
    fn after(&self, delay: Duration, task: TimerTask) -> TimerToken {
        let mut state = lock_recover(&self.state);
        let token = TimerToken::new(state.next_token);
        state.next_token += 1;
        let due = offset(state.now, delay);
        state.pending.push(PendingTimer { token, due, task });
        token
    }

    fn cancel(&self, token: TimerToken) -> bool {
        let mut state = lock_recover(&self.state);
        let before = state.pending.len();
        state.pending.retain(|timer| timer.token != token);
        state.pending.len() != before
    }
}

fn offset(from: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|delta| from.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

//! Timer scheduler backed by tokio tasks.

use super::{Scheduler, TimerTask, TimerToken};
use crate::lock_recover;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// Production scheduler: every timer is a spawned `sleep` + task.
pub struct TokioScheduler {
    runtime: Handle,
    next_token: AtomicU64,
    pending: Arc<Mutex<HashMap<TimerToken, AbortHandle>>>,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            next_token: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Binds to the runtime of the calling context, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    pub fn pending_count(&self) -> usize {
        lock_recover(&self.pending).len()
    }
}

impl Scheduler for TokioScheduler {
    fn after(&self, delay: Duration, task: TimerTask) -> TimerToken {
        let token = TimerToken::new(self.next_token.fetch_add(1, Ordering::Relaxed));
        let pending = Arc::clone(&self.pending);

        // Registration happens under the lock so a zero-delay task cannot
        // deregister itself before it is recorded.
        let mut guard = lock_recover(&self.pending);
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if lock_recover(&pending).remove(&token).is_none() {
                return;
            }
            task.await;
        });
        guard.insert(token, handle.abort_handle());
        token
    }

    fn cancel(&self, token: TimerToken) -> bool {
        match lock_recover(&self.pending).remove(&token) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

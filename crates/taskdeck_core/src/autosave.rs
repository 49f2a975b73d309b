//! Per-key debounced save scheduling.
//!
//! # Responsibility
//! - Coalesce rapid edits to one key into a single delayed save.
//! - Report `Saving`, `Saved` and `Error` transitions to key listeners.
//!
//! # Invariants
//! - At most one timer is pending per key; rescheduling replaces it.
//! - The save closure runs at fire time, so it observes the latest state.
//! - A cleared or superseded timer never runs its save.

use crate::clock::Clock;
use crate::error::StoreError;
use crate::lock_recover;
use crate::scheduler::{Scheduler, TimerToken};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use log::{debug, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// Deferred save body, built once per armed timer.
pub type SaveTask = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), StoreError>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoSaveEvent {
    Saving,
    Saved,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Idle,
    Pending,
    Saving,
    Saved,
    Error,
}

/// Payload delivered to auto-save listeners.
#[derive(Debug, Clone)]
pub struct AutoSaveNotice {
    pub key: String,
    pub event: AutoSaveEvent,
    pub error: Option<StoreError>,
}

pub type AutoSaveListener = Arc<dyn Fn(&AutoSaveNotice) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct PendingSave {
    token: TimerToken,
    generation: u64,
    save: SaveTask,
}

struct ListenerEntry {
    id: ListenerId,
    key: String,
    event: AutoSaveEvent,
    callback: AutoSaveListener,
}

#[derive(Default)]
struct AutoSaveState {
    pending: HashMap<String, PendingSave>,
    status: HashMap<String, SaveStatus>,
    last_saved: HashMap<String, DateTime<Utc>>,
    listeners: Vec<ListenerEntry>,
    next_generation: u64,
    next_listener: u64,
}

struct AutoSaveInner {
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    default_delay: Duration,
    state: Mutex<AutoSaveState>,
}

/// Debounce scheduler handle; clones share the same timers.
#[derive(Clone)]
pub struct AutoSaveScheduler {
    inner: Arc<AutoSaveInner>,
}

/// Non-owning [`AutoSaveScheduler`] handle held by armed timers and hooks.
#[derive(Clone)]
pub struct WeakAutoSaveScheduler {
    inner: Weak<AutoSaveInner>,
}

impl WeakAutoSaveScheduler {
    pub fn upgrade(&self) -> Option<AutoSaveScheduler> {
        self.inner
            .upgrade()
            .map(|inner| AutoSaveScheduler { inner })
    }
}

impl AutoSaveScheduler {
    pub fn new(scheduler: Arc<dyn Scheduler>, clock: Arc<dyn Clock>, default_delay: Duration) -> Self {
        Self {
            inner: Arc::new(AutoSaveInner {
                scheduler,
                clock,
                default_delay,
                state: Mutex::new(AutoSaveState::default()),
            }),
        }
    }

    /// Handle that does not keep the timers alive.
    pub fn downgrade(&self) -> WeakAutoSaveScheduler {
        WeakAutoSaveScheduler {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn default_delay(&self) -> Duration {
        self.inner.default_delay
    }

    /// Arms a save for `key` after `delay`, replacing any pending one.
    pub fn schedule<F, Fut>(&self, key: impl Into<String>, save: F, delay: Duration)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        let key = key.into();
        let save: SaveTask = Box::new(move || Box::pin(save()));

        let mut state = lock_recover(&self.inner.state);
        if let Some(previous) = state.pending.remove(&key) {
            self.inner.scheduler.cancel(previous.token);
        }
        state.next_generation += 1;
        let generation = state.next_generation;

        let handle = self.downgrade();
        let timer_key = key.clone();
        let token = self.inner.scheduler.after(
            delay,
            Box::pin(async move {
                if let Some(autosave) = handle.upgrade() {
                    autosave.fire(&timer_key, Some(generation)).await;
                }
            }),
        );
        state.pending.insert(
            key.clone(),
            PendingSave {
                token,
                generation,
                save,
            },
        );
        state.status.insert(key.clone(), SaveStatus::Pending);
        debug!(
            "event=autosave_schedule module=autosave status=pending key={} delay_ms={}",
            key,
            delay.as_millis()
        );
    }

    /// Same as [`schedule`](Self::schedule) with the configured delay.
    pub fn schedule_default<F, Fut>(&self, key: impl Into<String>, save: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        self.schedule(key, save, self.inner.default_delay);
    }

    /// Cancels the pending save for `key` without running it.
    pub fn clear(&self, key: &str) -> bool {
        let mut state = lock_recover(&self.inner.state);
        match state.pending.remove(key) {
            Some(pending) => {
                self.inner.scheduler.cancel(pending.token);
                state.status.insert(key.to_string(), SaveStatus::Idle);
                true
            }
            None => false,
        }
    }

    /// Cancels every pending save.
    pub fn clear_all(&self) {
        let mut state = lock_recover(&self.inner.state);
        let drained: Vec<(String, PendingSave)> = state.pending.drain().collect();
        let cancelled = drained.len();
        for (key, pending) in drained {
            self.inner.scheduler.cancel(pending.token);
            state.status.insert(key, SaveStatus::Idle);
        }
        debug!(
            "event=autosave_clear_all module=autosave status=ok cancelled={}",
            cancelled
        );
    }

    /// Runs the pending save for `key` now. Returns `false` if none was pending.
    pub async fn flush(&self, key: &str) -> bool {
        self.fire(key, None).await
    }

    pub fn is_pending(&self, key: &str) -> bool {
        lock_recover(&self.inner.state).pending.contains_key(key)
    }

    pub fn pending_keys(&self) -> Vec<String> {
        lock_recover(&self.inner.state).pending.keys().cloned().collect()
    }

    pub fn status(&self, key: &str) -> SaveStatus {
        lock_recover(&self.inner.state)
            .status
            .get(key)
            .copied()
            .unwrap_or_default()
    }

    pub fn last_saved_at(&self, key: &str) -> Option<DateTime<Utc>> {
        lock_recover(&self.inner.state).last_saved.get(key).copied()
    }

    pub fn on(
        &self,
        key: impl Into<String>,
        event: AutoSaveEvent,
        listener: impl Fn(&AutoSaveNotice) + Send + Sync + 'static,
    ) -> ListenerId {
        let mut state = lock_recover(&self.inner.state);
        state.next_listener += 1;
        let id = ListenerId(state.next_listener);
        state.listeners.push(ListenerEntry {
            id,
            key: key.into(),
            event,
            callback: Arc::new(listener),
        });
        id
    }

    pub fn off(&self, id: ListenerId) -> bool {
        let mut state = lock_recover(&self.inner.state);
        let before = state.listeners.len();
        state.listeners.retain(|entry| entry.id != id);
        state.listeners.len() != before
    }

    /// Cancels every timer and forgets save history. Listeners stay.
    pub fn reset(&self) {
        self.clear_all();
        let mut state = lock_recover(&self.inner.state);
        state.status.clear();
        state.last_saved.clear();
    }

    /// Takes the pending save for `key` and runs it.
    ///
    /// With `Some(generation)` only that exact timer may fire; a superseded
    /// timer that raced its cancellation becomes a no-op.
    async fn fire(&self, key: &str, generation: Option<u64>) -> bool {
        let save = {
            let mut state = lock_recover(&self.inner.state);
            let current = state.pending.get(key).map(|pending| pending.generation);
            match (current, generation) {
                (None, _) => return false,
                (Some(current), Some(expected)) if current != expected => return false,
                _ => {}
            }
            let Some(pending) = state.pending.remove(key) else {
                return false;
            };
            if generation.is_none() {
                self.inner.scheduler.cancel(pending.token);
            }
            state.status.insert(key.to_string(), SaveStatus::Saving);
            pending.save
        };

        self.emit(key, AutoSaveEvent::Saving, None);
        let result = save().await;

        let superseded = self.is_pending(key);
        match result {
            Ok(()) => {
                {
                    let mut state = lock_recover(&self.inner.state);
                    if !superseded {
                        state.status.insert(key.to_string(), SaveStatus::Saved);
                    }
                    state.last_saved.insert(key.to_string(), self.inner.clock.now());
                }
                debug!(
                    "event=autosave_fire module=autosave status=saved key={}",
                    key
                );
                self.emit(key, AutoSaveEvent::Saved, None);
            }
            Err(err) => {
                if !superseded {
                    lock_recover(&self.inner.state)
                        .status
                        .insert(key.to_string(), SaveStatus::Error);
                }
                warn!(
                    "event=autosave_fire module=autosave status=error key={} error_code={}",
                    key,
                    err.code()
                );
                self.emit(key, AutoSaveEvent::Error, Some(err));
            }
        }
        true
    }

    fn emit(&self, key: &str, event: AutoSaveEvent, error: Option<StoreError>) {
        let callbacks: Vec<AutoSaveListener> = lock_recover(&self.inner.state)
            .listeners
            .iter()
            .filter(|entry| entry.key == key && entry.event == event)
            .map(|entry| Arc::clone(&entry.callback))
            .collect();
        if callbacks.is_empty() {
            return;
        }
        let notice = AutoSaveNotice {
            key: key.to_string(),
            event,
            error,
        };
        for callback in callbacks {
            callback(&notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AutoSaveEvent, AutoSaveScheduler, SaveStatus};
    use crate::error::StoreError;
    use crate::scheduler::ManualScheduler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn autosave() -> (Arc<ManualScheduler>, AutoSaveScheduler) {
        let manual = Arc::new(ManualScheduler::default());
        let autosave = AutoSaveScheduler::new(manual.clone(), manual.clone(), Duration::from_millis(1_000));
        (manual, autosave)
    }

    #[tokio::test]
    async fn clear_prevents_fire() {
        let (manual, autosave) = autosave();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        autosave.schedule_default("form-1", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(autosave.is_pending("form-1"));
        assert!(autosave.clear("form-1"));
        manual.advance(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(autosave.status("form-1"), SaveStatus::Idle);
        assert_eq!(manual.pending_count(), 0);
    }

    #[tokio::test]
    async fn listeners_see_saving_then_error() {
        let (manual, autosave) = autosave();
        let events = Arc::new(Mutex::new(Vec::new()));
        for event in [AutoSaveEvent::Saving, AutoSaveEvent::Saved, AutoSaveEvent::Error] {
            let events = Arc::clone(&events);
            autosave.on("k", event, move |notice| {
                events.lock().unwrap().push(notice.event);
            });
        }
        autosave.schedule_default("k", || async { Err(StoreError::operation("offline")) });
        manual.advance(Duration::from_millis(1_000)).await;

        assert_eq!(
            *events.lock().unwrap(),
            vec![AutoSaveEvent::Saving, AutoSaveEvent::Error]
        );
        assert_eq!(autosave.status("k"), SaveStatus::Error);
        assert!(autosave.last_saved_at("k").is_none());
    }

    #[tokio::test]
    async fn flush_runs_pending_save_immediately() {
        let (manual, autosave) = autosave();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        autosave.schedule_default("k", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(autosave.flush("k").await);
        let flushed_at = crate::clock::Clock::now(manual.as_ref());
        assert!(!autosave.flush("k").await);
        manual.advance(Duration::from_secs(2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(autosave.status("k"), SaveStatus::Saved);
        assert_eq!(autosave.last_saved_at("k"), Some(flushed_at));
    }

    #[tokio::test]
    async fn removed_listener_is_silent() {
        let (manual, autosave) = autosave();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = autosave.on("k", AutoSaveEvent::Saved, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(autosave.off(id));
        autosave.schedule_default("k", || async { Ok(()) });
        manual.advance(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn armed_timer_does_not_keep_the_scheduler_alive() {
        let (manual, autosave) = autosave();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        autosave.schedule_default("k", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let weak = autosave.downgrade();
        drop(autosave);
        assert!(weak.upgrade().is_none());

        manual.advance(Duration::from_secs(2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(manual.pending_count(), 0);
    }
}

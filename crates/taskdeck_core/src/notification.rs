//! Capacity-bounded, expiring queue of user-facing messages.
//!
//! # Responsibility
//! - Keep notifications newest-first with read/unread tracking.
//! - Hide non-persistent entries when their expiry timer fires.
//!
//! # Invariants
//! - `unread_count` always equals the number of unread entries.
//! - The queue never holds more than `max_notifications` entries.
//! - Every removed entry has its expiry timer cancelled.

use crate::clock::Clock;
use crate::lock_recover;
use crate::scheduler::{Scheduler, TimerToken};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    Info,
    Reminder,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Reminder => "reminder",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub is_visible: bool,
    pub is_persistent: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub dismissed_at: Option<DateTime<Utc>>,
}

/// Input to [`NotificationQueue::show`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Overrides the queue's default display duration.
    pub duration: Option<Duration>,
    pub is_persistent: bool,
}

impl NotificationRequest {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            duration: None,
            is_persistent: false,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn persistent(mut self) -> Self {
        self.is_persistent = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    pub max_notifications: usize,
    pub default_duration: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_notifications: 5,
            default_duration: Duration::from_millis(5_000),
        }
    }
}

#[derive(Default)]
struct QueueState {
    items: Vec<Notification>,
    unread: usize,
    timers: HashMap<String, TimerToken>,
}

impl QueueState {
    fn recount(&mut self) {
        self.unread = self.items.iter().filter(|item| !item.is_read).count();
    }

    /// Drops timers whose notification no longer exists.
    fn release_timers(&mut self, scheduler: &dyn Scheduler) {
        let items = &self.items;
        self.timers.retain(|id, token| {
            let alive = items.iter().any(|item| &item.id == id);
            if !alive {
                scheduler.cancel(*token);
            }
            alive
        });
    }
}

struct QueueInner {
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    settings: QueueSettings,
    state: Mutex<QueueState>,
}

#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<QueueInner>,
}

impl NotificationQueue {
    pub fn new(scheduler: Arc<dyn Scheduler>, clock: Arc<dyn Clock>, settings: QueueSettings) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                scheduler,
                clock,
                settings,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    pub fn settings(&self) -> QueueSettings {
        self.inner.settings
    }

    /// Prepends a notification, evicting the oldest entries past capacity.
    pub fn show(&self, request: NotificationRequest) -> Notification {
        let now = self.inner.clock.now();
        let duration = request.duration.unwrap_or(self.inner.settings.default_duration);
        let expires_at = if request.is_persistent {
            None
        } else {
            chrono::Duration::from_std(duration)
                .ok()
                .and_then(|delta| now.checked_add_signed(delta))
        };
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            kind: request.kind,
            title: request.title,
            message: request.message,
            is_read: false,
            is_visible: true,
            is_persistent: request.is_persistent,
            created_at: now,
            expires_at,
            dismissed_at: None,
        };

        let mut state = lock_recover(&self.inner.state);
        state.items.insert(0, notification.clone());
        state.unread += 1;

        let capacity = self.inner.settings.max_notifications;
        if state.items.len() > capacity {
            let evicted: Vec<Notification> = state.items.split_off(capacity);
            for item in &evicted {
                if !item.is_read {
                    state.unread = state.unread.saturating_sub(1);
                }
                if let Some(token) = state.timers.remove(&item.id) {
                    self.inner.scheduler.cancel(token);
                }
            }
            debug!(
                "event=notification_evict module=notification status=ok evicted={}",
                evicted.len()
            );
        }

        let kept = state.items.iter().any(|item| item.id == notification.id);
        if !notification.is_persistent && kept {
            let queue: Weak<QueueInner> = Arc::downgrade(&self.inner);
            let id = notification.id.clone();
            let token = self.inner.scheduler.after(
                duration,
                Box::pin(async move {
                    if let Some(inner) = queue.upgrade() {
                        NotificationQueue { inner }.expire(&id);
                    }
                }),
            );
            state.timers.insert(notification.id.clone(), token);
        }

        debug!(
            "event=notification_show module=notification status=ok kind={} persistent={}",
            notification.kind.as_str(),
            notification.is_persistent
        );
        notification
    }

    pub fn success(&self, title: impl Into<String>, message: impl Into<String>) -> Notification {
        self.show(NotificationRequest::new(NotificationKind::Success, title, message))
    }

    pub fn error(&self, title: impl Into<String>, message: impl Into<String>) -> Notification {
        self.show(NotificationRequest::new(NotificationKind::Error, title, message))
    }

    pub fn warning(&self, title: impl Into<String>, message: impl Into<String>) -> Notification {
        self.show(NotificationRequest::new(NotificationKind::Warning, title, message))
    }

    pub fn info(&self, title: impl Into<String>, message: impl Into<String>) -> Notification {
        self.show(NotificationRequest::new(NotificationKind::Info, title, message))
    }

    pub fn reminder(&self, title: impl Into<String>, message: impl Into<String>) -> Notification {
        self.show(NotificationRequest::new(NotificationKind::Reminder, title, message))
    }

    /// Dismisses `id`: invisible, stamped and read. Returns whether it changed.
    pub fn hide(&self, id: &str) -> bool {
        let now = self.inner.clock.now();
        let mut state = lock_recover(&self.inner.state);
        if let Some(token) = state.timers.remove(id) {
            self.inner.scheduler.cancel(token);
        }
        self.dismiss(&mut state, id, now)
    }

    pub fn mark_as_read(&self, id: &str) -> bool {
        let mut guard = lock_recover(&self.inner.state);
        let state = &mut *guard;
        let Some(item) = state.items.iter_mut().find(|item| item.id == id) else {
            return false;
        };
        if item.is_read {
            return false;
        }
        item.is_read = true;
        state.unread = state.unread.saturating_sub(1);
        true
    }

    pub fn mark_all_as_read(&self) {
        let mut state = lock_recover(&self.inner.state);
        for item in &mut state.items {
            item.is_read = true;
        }
        state.recount();
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut state = lock_recover(&self.inner.state);
        let before = state.items.len();
        state.items.retain(|item| item.id != id);
        let removed = state.items.len() != before;
        state.release_timers(self.inner.scheduler.as_ref());
        state.recount();
        removed
    }

    pub fn clear_all(&self) {
        let mut state = lock_recover(&self.inner.state);
        state.items.clear();
        state.release_timers(self.inner.scheduler.as_ref());
        state.recount();
    }

    /// Removes every entry of `kind`; returns how many were removed.
    pub fn clear_by_type(&self, kind: NotificationKind) -> usize {
        self.remove_where(|item| item.kind == kind)
    }

    /// Removes entries created strictly before `cutoff`.
    pub fn clear_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        self.remove_where(|item| item.created_at < cutoff)
    }

    /// Every entry, newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        lock_recover(&self.inner.state).items.clone()
    }

    pub fn visible(&self) -> Vec<Notification> {
        lock_recover(&self.inner.state)
            .items
            .iter()
            .filter(|item| item.is_visible)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        lock_recover(&self.inner.state)
            .items
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    pub fn unread_count(&self) -> usize {
        lock_recover(&self.inner.state).unread
    }

    pub fn len(&self) -> usize {
        lock_recover(&self.inner.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expire(&self, id: &str) {
        let now = self.inner.clock.now();
        let mut state = lock_recover(&self.inner.state);
        state.timers.remove(id);
        if self.dismiss(&mut state, id, now) {
            debug!("event=notification_expire module=notification status=ok id={}", id);
        }
    }

    fn dismiss(&self, state: &mut QueueState, id: &str, now: DateTime<Utc>) -> bool {
        let Some(item) = state.items.iter_mut().find(|item| item.id == id) else {
            return false;
        };
        if !item.is_visible {
            return false;
        }
        item.is_visible = false;
        item.dismissed_at = Some(now);
        if !item.is_read {
            item.is_read = true;
            state.unread = state.unread.saturating_sub(1);
        }
        true
    }

    fn remove_where(&self, predicate: impl Fn(&Notification) -> bool) -> usize {
        let mut state = lock_recover(&self.inner.state);
        let before = state.items.len();
        state.items.retain(|item| !predicate(item));
        let removed = before - state.items.len();
        state.release_timers(self.inner.scheduler.as_ref());
        state.recount();
        removed
    }
}

//! Core domain logic for TaskDeck.
//! Reactive entity stores, retry middleware, auto-save and notifications.

pub mod autosave;
pub mod backend;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod model;
pub mod notification;
pub mod persistence;
pub mod scheduler;
pub mod settings;
pub mod store;
pub mod workspace;

pub use autosave::{AutoSaveEvent, AutoSaveNotice, AutoSaveScheduler, SaveStatus};
pub use backend::{EntityBackend, MemoryBackend, SqliteBackend};
pub use clock::{Clock, SystemClock};
pub use config::{ConfigError, TaskDeckConfig};
pub use error::{ErrorRecord, StoreError, StoreResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use middleware::{RetryMiddleware, RetryPolicy};
pub use model::entity::{Entity, EntityId, Patch};
pub use model::form::{FormDraft, FormPatch, FormRecord};
pub use model::label::{Label, LabelDraft, LabelPatch};
pub use model::list::{TaskList, TaskListDraft, TaskListPatch};
pub use model::task::{Priority, Task, TaskDraft, TaskPatch, TaskStatus};
pub use notification::{Notification, NotificationKind, NotificationQueue, NotificationRequest};
pub use persistence::{KeyValueStorage, MemoryStorage, SqliteStorage, StorageError};
pub use scheduler::{ManualScheduler, Scheduler, TokioScheduler};
pub use settings::{Environment, Theme, ThemeMode};
pub use store::{
    BatchResult, EntityStore, FilterState, SortDirection, SortField, SortState, StoreState,
};
pub use workspace::{Workspace, WorkspaceServices};

use std::sync::{Mutex, MutexGuard};

/// Locks `mutex`, recovering the guard if a previous holder panicked.
///
/// Every guarded value here is replaced wholesale, so a poisoned lock still
/// holds a consistent value.
pub(crate) fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

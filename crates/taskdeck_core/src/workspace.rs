//! Composition of every store, the auto-saver and the notification queue.
//!
//! # Responsibility
//! - Build one store per entity kind, each behind its own retry middleware.
//! - Route field edits through debounced auto-save.
//! - Provide the session teardown used on logout.
//!
//! # Invariants
//! - Only view preferences and the theme reach key/value storage.
//! - `reset_to_defaults` leaves no pending auto-save timer behind.
//! - An entity leaving its store, by any path, takes its draft and pending
//!   auto-save with it.

use crate::autosave::AutoSaveScheduler;
use crate::backend::{EntityBackend, MemoryBackend};
use crate::clock::Clock;
use crate::config::{ConfigError, TaskDeckConfig};
use crate::error::{ErrorRecord, StoreError, StoreResult};
use crate::lock_recover;
use crate::middleware::{ErrorCallback, RetryMiddleware};
use crate::model::entity::{Entity, EntityId, Patch};
use crate::model::form::{FormPatch, FormRecord};
use crate::model::label::Label;
use crate::model::list::TaskList;
use crate::model::task::{Task, TaskPatch};
use crate::notification::NotificationQueue;
use crate::persistence::{KeyValueStorage, MemoryStorage};
use crate::scheduler::Scheduler;
use crate::settings::{Environment, FixedEnvironment, ThemeSettings};
use crate::store::{EntityStore, PreferenceSlot, StoreDeps};
use log::info;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// External collaborators a workspace is assembled from.
pub struct WorkspaceServices {
    pub tasks: Arc<dyn EntityBackend<Task>>,
    pub lists: Arc<dyn EntityBackend<TaskList>>,
    pub labels: Arc<dyn EntityBackend<Label>>,
    pub forms: Arc<dyn EntityBackend<FormRecord>>,
    /// Medium for view preferences and theme; `None` keeps them in memory only.
    pub storage: Option<Arc<dyn KeyValueStorage>>,
    pub scheduler: Arc<dyn Scheduler>,
    pub clock: Arc<dyn Clock>,
    pub environment: Arc<dyn Environment>,
}

impl WorkspaceServices {
    /// In-memory backends and storage.
    pub fn in_memory(scheduler: Arc<dyn Scheduler>, clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks: Arc::new(MemoryBackend::<Task>::new()),
            lists: Arc::new(MemoryBackend::<TaskList>::new()),
            labels: Arc::new(MemoryBackend::<Label>::new()),
            forms: Arc::new(MemoryBackend::<FormRecord>::new()),
            storage: Some(Arc::new(MemoryStorage::new())),
            scheduler,
            clock,
            environment: Arc::new(FixedEnvironment::default()),
        }
    }

    /// One backend serving every entity kind.
    pub fn shared<B>(
        backend: Arc<B>,
        storage: Option<Arc<dyn KeyValueStorage>>,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        B: EntityBackend<Task>
            + EntityBackend<TaskList>
            + EntityBackend<Label>
            + EntityBackend<FormRecord>
            + 'static,
    {
        Self {
            tasks: backend.clone(),
            lists: backend.clone(),
            labels: backend.clone(),
            forms: backend,
            storage,
            scheduler,
            clock,
            environment: Arc::new(FixedEnvironment::default()),
        }
    }

    pub fn with_environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = environment;
        self
    }
}

/// Pending field edits per entity id, merged until auto-save applies them.
struct DraftBook<P: Patch> {
    drafts: Arc<Mutex<HashMap<EntityId, P>>>,
}

impl<P: Patch> Clone for DraftBook<P> {
    fn clone(&self) -> Self {
        Self {
            drafts: Arc::clone(&self.drafts),
        }
    }
}

impl<P: Patch> DraftBook<P> {
    fn new() -> Self {
        Self {
            drafts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn stage(&self, id: &str, patch: P) {
        lock_recover(&self.drafts)
            .entry(id.to_string())
            .or_default()
            .merge(patch);
    }

    fn take(&self, id: &str) -> Option<P> {
        lock_recover(&self.drafts).remove(id)
    }

    fn peek(&self, id: &str) -> Option<P> {
        lock_recover(&self.drafts).get(id).cloned()
    }

    fn clear(&self) {
        lock_recover(&self.drafts).clear();
    }
}

/// Everything the UI layer talks to for one signed-in session.
pub struct Workspace {
    config: TaskDeckConfig,
    tasks: EntityStore<Task>,
    lists: EntityStore<TaskList>,
    labels: EntityStore<Label>,
    forms: EntityStore<FormRecord>,
    autosave: AutoSaveScheduler,
    notifications: NotificationQueue,
    settings: ThemeSettings,
    task_drafts: DraftBook<TaskPatch>,
    form_drafts: DraftBook<FormPatch>,
}

impl Workspace {
    /// # Errors
    /// - `ConfigError::Invalid` when `config` fails validation.
    pub fn new(config: TaskDeckConfig, services: WorkspaceServices) -> Result<Self, ConfigError> {
        config.validate()?;

        let notifications = NotificationQueue::new(
            services.scheduler.clone(),
            services.clock.clone(),
            config.queue_settings(),
        );
        let autosave = AutoSaveScheduler::new(
            services.scheduler.clone(),
            services.clock.clone(),
            config.autosave_delay(),
        );
        let storage = services
            .storage
            .clone()
            .filter(|_| config.persistence.enabled);

        let assembly = StoreAssembly {
            config: &config,
            clock: &services.clock,
            storage: storage.as_ref(),
            notifications: &notifications,
        };
        let tasks = assembly.build("tasks", services.tasks.clone());
        let lists = assembly.build("lists", services.lists.clone());
        let labels = assembly.build("labels", services.labels.clone());
        let forms = assembly.build("forms", services.forms.clone());

        let task_drafts = DraftBook::new();
        let form_drafts = DraftBook::new();
        drop_edits_on_removal(&tasks, &autosave, &task_drafts);
        drop_edits_on_removal(&forms, &autosave, &form_drafts);

        let settings = ThemeSettings::new(
            storage.map(|storage| (storage, config.storage_key("settings.theme"))),
            services.environment.clone(),
        );

        info!(
            "event=workspace_init module=workspace status=ok persistence={} autosave_ms={}",
            config.persistence.enabled, config.autosave.delay_ms
        );

        Ok(Self {
            config,
            tasks,
            lists,
            labels,
            forms,
            autosave,
            notifications,
            settings,
            task_drafts,
            form_drafts,
        })
    }

    pub fn config(&self) -> &TaskDeckConfig {
        &self.config
    }

    pub fn tasks(&self) -> &EntityStore<Task> {
        &self.tasks
    }

    pub fn lists(&self) -> &EntityStore<TaskList> {
        &self.lists
    }

    pub fn labels(&self) -> &EntityStore<Label> {
        &self.labels
    }

    pub fn forms(&self) -> &EntityStore<FormRecord> {
        &self.forms
    }

    pub fn autosave(&self) -> &AutoSaveScheduler {
        &self.autosave
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    pub fn settings(&self) -> &ThemeSettings {
        &self.settings
    }

    /// Fetches every kind from the backend; returns counts as
    /// `(tasks, lists, labels, forms)`.
    pub async fn load_all(&self) -> StoreResult<(usize, usize, usize, usize)> {
        futures::try_join!(
            self.tasks.fetch_all(),
            self.lists.fetch_all(),
            self.labels.fetch_all(),
            self.forms.fetch_all()
        )
    }

    /// Stages a task edit and (re)arms its auto-save.
    ///
    /// # Errors
    /// - `NotFound` when the task is not cached; nothing is staged.
    pub fn edit_task(&self, id: &str, patch: TaskPatch) -> StoreResult<()> {
        schedule_edit(&self.autosave, &self.tasks, &self.task_drafts, id, patch)
    }

    pub fn edit_form(&self, id: &str, patch: FormPatch) -> StoreResult<()> {
        schedule_edit(&self.autosave, &self.forms, &self.form_drafts, id, patch)
    }

    /// Accumulated, not yet saved edits for task `id`.
    pub fn task_draft(&self, id: &str) -> Option<TaskPatch> {
        self.task_drafts.peek(id)
    }

    pub fn form_draft(&self, id: &str) -> Option<FormPatch> {
        self.form_drafts.peek(id)
    }

    /// Runs every pending auto-save now.
    pub async fn flush_edits(&self) -> usize {
        let mut flushed = 0;
        for key in self.autosave.pending_keys() {
            if self.autosave.flush(&key).await {
                flushed += 1;
            }
        }
        flushed
    }

    /// Deletes a task; its pending edits are dropped with it.
    pub async fn delete_task(&self, id: &str) -> StoreResult<bool> {
        self.tasks.delete(id).await
    }

    pub async fn delete_form(&self, id: &str) -> StoreResult<bool> {
        self.forms.delete(id).await
    }

    /// Session teardown: caches, selections, filters, drafts, timers,
    /// notifications and the theme return to defaults.
    pub fn reset_to_defaults(&self) {
        self.autosave.reset();
        self.task_drafts.clear();
        self.form_drafts.clear();
        self.tasks.reset();
        self.lists.reset();
        self.labels.reset();
        self.forms.reset();
        self.notifications.clear_all();
        self.settings.reset();
        info!("event=workspace_reset module=workspace status=ok");
    }
}

struct StoreAssembly<'a> {
    config: &'a TaskDeckConfig,
    clock: &'a Arc<dyn Clock>,
    storage: Option<&'a Arc<dyn KeyValueStorage>>,
    notifications: &'a NotificationQueue,
}

impl StoreAssembly<'_> {
    fn build<E: Entity>(&self, name: &str, backend: Arc<dyn EntityBackend<E>>) -> EntityStore<E> {
        let mut middleware = RetryMiddleware::new(name, self.config.retry.clone(), self.clock.clone())
            .with_error_logging(self.config.middleware.log_errors);
        if self.config.middleware.notify_on_error {
            let notifications = self.notifications.clone();
            let callback: ErrorCallback = Arc::new(move |record: &ErrorRecord| {
                notifications.error(
                    format!("Could not {} {}", record.action, record.store),
                    record.message.clone(),
                );
            });
            middleware = middleware.with_error_callback(callback);
        }

        let preferences = self.storage.map(|storage| {
            PreferenceSlot::new(
                Arc::clone(storage),
                self.config.storage_key(&format!("{name}.view")),
            )
        });

        EntityStore::new(StoreDeps {
            user_id: self.config.user_id.clone(),
            backend,
            middleware,
            clock: self.clock.clone(),
            preferences,
        })
    }
}

fn edit_key<E: Entity>(id: &str) -> String {
    format!("{}:{}", E::KIND, id)
}

/// Cancels the auto-save and forgets the draft of every id `store` drops.
fn drop_edits_on_removal<E: Entity>(
    store: &EntityStore<E>,
    autosave: &AutoSaveScheduler,
    drafts: &DraftBook<E::Patch>,
) {
    let autosave = autosave.downgrade();
    let drafts = drafts.clone();
    store.on_removed(move |id| {
        if let Some(autosave) = autosave.upgrade() {
            autosave.clear(&edit_key::<E>(id));
        }
        drafts.take(id);
    });
}

fn schedule_edit<E: Entity>(
    autosave: &AutoSaveScheduler,
    store: &EntityStore<E>,
    drafts: &DraftBook<E::Patch>,
    id: &str,
    patch: E::Patch,
) -> StoreResult<()> {
    if !store.contains(id) {
        return Err(StoreError::not_found(E::KIND, id));
    }
    drafts.stage(id, patch);

    let store = store.clone();
    let drafts = drafts.clone();
    let id = id.to_string();
    autosave.schedule_default(edit_key::<E>(&id), move || async move {
        let Some(patch) = drafts.take(&id) else {
            return Ok(());
        };
        if patch.is_empty() {
            return Ok(());
        }
        store.update(&id, patch).await.map(|_| ())
    });
    Ok(())
}

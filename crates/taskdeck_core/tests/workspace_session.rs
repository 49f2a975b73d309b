use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskdeck_core::settings::FixedEnvironment;
use taskdeck_core::{
    EntityBackend, FilterState, FormDraft, FormPatch, ManualScheduler, MemoryBackend,
    NotificationKind, SaveStatus, SortDirection, SortField, SortState, SqliteBackend, SqliteStorage,
    StoreError, StoreResult, Task, TaskDeckConfig, TaskDraft, TaskPatch, TaskStatus, Theme,
    ThemeMode, Workspace, WorkspaceServices,
};

/// Task backend counting updates; optionally failing every call.
struct CountingBackend {
    rows: MemoryBackend<Task>,
    updates: AtomicU32,
    offline: bool,
}

impl CountingBackend {
    fn new(offline: bool) -> Self {
        Self {
            rows: MemoryBackend::new(),
            updates: AtomicU32::new(0),
            offline,
        }
    }

    fn check(&self) -> StoreResult<()> {
        if self.offline {
            return Err(StoreError::operation("network down"));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityBackend<Task> for CountingBackend {
    async fn insert(&self, user_id: &str, entity: &Task) -> StoreResult<Task> {
        self.check()?;
        self.rows.insert(user_id, entity).await
    }

    async fn update(&self, user_id: &str, entity: &Task) -> StoreResult<Task> {
        self.check()?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.rows.update(user_id, entity).await
    }

    async fn delete(&self, user_id: &str, id: &str) -> StoreResult<()> {
        self.check()?;
        self.rows.delete(user_id, id).await
    }

    async fn list(&self, user_id: &str) -> StoreResult<Vec<Task>> {
        self.check()?;
        self.rows.list(user_id).await
    }
}

fn workspace_with(
    config: TaskDeckConfig,
    tasks: Arc<CountingBackend>,
) -> (Arc<ManualScheduler>, Workspace) {
    let manual = Arc::new(ManualScheduler::default());
    let mut services = WorkspaceServices::in_memory(manual.clone(), manual.clone());
    services.tasks = tasks;
    let workspace = Workspace::new(config, services).unwrap();
    (manual, workspace)
}

#[tokio::test]
async fn five_field_edits_save_once_with_the_final_value() {
    let backend = Arc::new(CountingBackend::new(false));
    let (manual, workspace) = workspace_with(TaskDeckConfig::default(), backend.clone());
    let task = workspace.tasks().create(TaskDraft::new("v0")).await.unwrap();

    for n in 1..=5 {
        workspace
            .edit_task(&task.id, TaskPatch::name(format!("v{n}")))
            .unwrap();
        manual.advance(Duration::from_millis(100)).await;
    }
    assert_eq!(backend.updates.load(Ordering::SeqCst), 0);
    assert_eq!(
        workspace.task_draft(&task.id).and_then(|draft| draft.name),
        Some("v5".to_string())
    );

    manual.advance(Duration::from_millis(1_000)).await;
    assert_eq!(backend.updates.load(Ordering::SeqCst), 1);
    assert_eq!(workspace.tasks().get(&task.id).unwrap().name, "v5");
    assert!(workspace.task_draft(&task.id).is_none());
}

#[tokio::test]
async fn edits_to_different_fields_accumulate_into_one_patch() {
    let backend = Arc::new(CountingBackend::new(false));
    let (_manual, workspace) = workspace_with(TaskDeckConfig::default(), backend.clone());
    let task = workspace.tasks().create(TaskDraft::new("plan")).await.unwrap();

    workspace
        .edit_task(&task.id, TaskPatch::name("plan trip"))
        .unwrap();
    workspace
        .edit_task(&task.id, TaskPatch::status(TaskStatus::InProgress))
        .unwrap();
    assert_eq!(workspace.flush_edits().await, 1);

    let saved = workspace.tasks().get(&task.id).unwrap();
    assert_eq!(saved.name, "plan trip");
    assert_eq!(saved.status, TaskStatus::InProgress);
    assert_eq!(backend.updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn editing_an_unknown_entity_is_not_found() {
    let backend = Arc::new(CountingBackend::new(false));
    let (manual, workspace) = workspace_with(TaskDeckConfig::default(), backend);
    let err = workspace
        .edit_task("ghost", TaskPatch::name("x"))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
    assert_eq!(manual.pending_count(), 0);
}

#[tokio::test]
async fn form_edits_merge_fields() {
    let backend = Arc::new(CountingBackend::new(false));
    let (manual, workspace) = workspace_with(TaskDeckConfig::default(), backend);
    let form = workspace
        .forms()
        .create(FormDraft::new("profile").with_field("city", json!("Oslo")))
        .await
        .unwrap();

    workspace
        .edit_form(&form.id, FormPatch::field("city", json!("Bergen")))
        .unwrap();
    workspace
        .edit_form(&form.id, FormPatch::field("zip", json!("5003")))
        .unwrap();
    manual.advance(Duration::from_millis(1_000)).await;

    let saved = workspace.forms().get(&form.id).unwrap();
    assert_eq!(saved.field("city"), Some(&json!("Bergen")));
    assert_eq!(saved.field("zip"), Some(&json!("5003")));
}

#[tokio::test(start_paused = true)]
async fn exhausted_calls_post_an_error_notification() {
    let backend = Arc::new(CountingBackend::new(true));
    let config = TaskDeckConfig::default().with_retry(taskdeck_core::RetryPolicy {
        max_attempts: 2,
        base_delay_ms: 10,
        max_delay_ms: None,
    });
    let (_manual, workspace) = workspace_with(config, backend);

    let err = workspace
        .tasks()
        .create(TaskDraft::new("offline"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::RetryExhausted { attempts: 2, .. }));
    assert!(workspace.tasks().snapshot().is_empty());

    let notifications = workspace.notifications().notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::Error);
    assert_eq!(notifications[0].title, "Could not create tasks");
    assert_eq!(workspace.notifications().unread_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn error_notifications_can_be_disabled() {
    let backend = Arc::new(CountingBackend::new(true));
    let mut config = TaskDeckConfig::default().with_retry(taskdeck_core::RetryPolicy::no_retry());
    config.middleware.notify_on_error = false;
    let (_manual, workspace) = workspace_with(config, backend);

    workspace
        .tasks()
        .create(TaskDraft::new("offline"))
        .await
        .unwrap_err();
    assert!(workspace.notifications().is_empty());
}

#[tokio::test]
async fn reset_to_defaults_clears_session_state_and_timers() {
    let backend = Arc::new(CountingBackend::new(false));
    let (manual, workspace) = workspace_with(TaskDeckConfig::default(), backend.clone());
    let task = workspace.tasks().create(TaskDraft::new("a")).await.unwrap();
    workspace.tasks().select(&task.id);
    workspace.tasks().set_filter(FilterState {
        query: "a".to_string(),
        ..FilterState::default()
    });
    workspace
        .edit_task(&task.id, TaskPatch::name("never saved"))
        .unwrap();
    workspace.notifications().info("Hello", "");
    workspace.settings().set_mode(ThemeMode::Dark);
    assert_eq!(manual.pending_count(), 2);

    workspace.reset_to_defaults();

    let snapshot = workspace.tasks().snapshot();
    assert!(snapshot.is_empty());
    assert!(snapshot.selected_ids().is_empty());
    assert!(!snapshot.filter().is_active());
    assert!(workspace.task_draft(&task.id).is_none());
    assert!(workspace.notifications().is_empty());
    assert!(!workspace.autosave().is_pending(&format!("task:{}", task.id)));
    assert_eq!(workspace.settings().mode(), ThemeMode::Auto);
    assert_eq!(manual.pending_count(), 0);

    manual.advance(Duration::from_secs(5)).await;
    assert_eq!(backend.updates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn deleting_a_task_cancels_its_pending_save() {
    let backend = Arc::new(CountingBackend::new(false));
    let (manual, workspace) = workspace_with(TaskDeckConfig::default(), backend.clone());
    let task = workspace.tasks().create(TaskDraft::new("a")).await.unwrap();
    workspace.edit_task(&task.id, TaskPatch::name("b")).unwrap();

    assert!(workspace.delete_task(&task.id).await.unwrap());
    assert_eq!(manual.pending_count(), 0);
    manual.advance(Duration::from_secs(2)).await;
    assert_eq!(backend.updates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn store_level_deletes_also_cancel_pending_saves() {
    let backend = Arc::new(CountingBackend::new(false));
    let (manual, workspace) = workspace_with(TaskDeckConfig::default(), backend.clone());
    let batched = workspace.tasks().create(TaskDraft::new("a")).await.unwrap();
    let single = workspace.tasks().create(TaskDraft::new("b")).await.unwrap();
    workspace.edit_task(&batched.id, TaskPatch::name("a2")).unwrap();
    workspace.edit_task(&single.id, TaskPatch::name("b2")).unwrap();
    assert_eq!(manual.pending_count(), 2);

    let outcome = workspace
        .tasks()
        .batch_delete(&[batched.id.clone()])
        .await;
    assert_eq!(outcome.successful, 1);
    assert!(workspace.tasks().delete(&single.id).await.unwrap());

    for id in [&batched.id, &single.id] {
        let key = format!("task:{id}");
        assert!(!workspace.autosave().is_pending(&key));
        assert!(workspace.task_draft(id).is_none());
    }
    assert_eq!(manual.pending_count(), 0);

    manual.advance(Duration::from_secs(2)).await;
    assert_eq!(backend.updates.load(Ordering::SeqCst), 0);
    assert_eq!(
        workspace.autosave().status(&format!("task:{}", batched.id)),
        SaveStatus::Idle
    );
}

#[tokio::test]
async fn reload_without_the_entity_cancels_its_pending_save() {
    let backend = Arc::new(CountingBackend::new(false));
    let (manual, workspace) = workspace_with(TaskDeckConfig::default(), backend.clone());
    let task = workspace.tasks().create(TaskDraft::new("a")).await.unwrap();
    workspace.edit_task(&task.id, TaskPatch::name("a2")).unwrap();

    EntityBackend::<Task>::delete(&backend.rows, "local", &task.id)
        .await
        .unwrap();
    assert_eq!(workspace.tasks().fetch_all().await.unwrap(), 0);

    assert!(workspace.task_draft(&task.id).is_none());
    assert_eq!(manual.pending_count(), 0);
}

#[tokio::test]
async fn sqlite_session_restores_entities_and_view_preferences() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskdeck.sqlite3");
    let config = TaskDeckConfig::default().with_user("alice");

    let open = |manual: Arc<ManualScheduler>| {
        let backend = Arc::new(SqliteBackend::open(&path).unwrap());
        let storage = Arc::new(SqliteStorage::open(&path).unwrap());
        let services =
            WorkspaceServices::shared(backend, Some(storage), manual.clone(), manual)
                .with_environment(Arc::new(FixedEnvironment(Some(true))));
        Workspace::new(config.clone(), services).unwrap()
    };

    let first = open(Arc::new(ManualScheduler::default()));
    first
        .tasks()
        .create(TaskDraft::new("Write report"))
        .await
        .unwrap();
    first.lists().create(taskdeck_core::TaskListDraft::new("Work")).await.unwrap();
    first
        .tasks()
        .set_sort(SortState::new(SortField::Name, SortDirection::Asc));
    assert_eq!(first.settings().theme(), Theme::Dark);
    drop(first);

    let second = open(Arc::new(ManualScheduler::default()));
    assert!(second.tasks().snapshot().is_empty());
    assert_eq!(second.load_all().await.unwrap(), (1, 1, 0, 0));
    assert_eq!(second.tasks().all()[0].name, "Write report");
    assert_eq!(
        second.tasks().snapshot().sort(),
        SortState::new(SortField::Name, SortDirection::Asc)
    );

    let other_user = {
        let backend = Arc::new(SqliteBackend::open(&path).unwrap());
        let manual = Arc::new(ManualScheduler::default());
        let services = WorkspaceServices::shared(backend, None, manual.clone(), manual);
        Workspace::new(TaskDeckConfig::default().with_user("bob"), services).unwrap()
    };
    assert_eq!(other_user.load_all().await.unwrap(), (0, 0, 0, 0));
}

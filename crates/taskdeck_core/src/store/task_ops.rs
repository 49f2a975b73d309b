//! Task-specific operations layered on the generic engine.

use crate::error::{StoreError, StoreResult};
use crate::model::entity::{Entity, EntityId};
use crate::model::task::{Task, TaskPatch, TaskStatus};
use crate::store::engine::EntityStore;

impl EntityStore<Task> {
    /// Flips between done and todo. Any non-done status completes the task.
    pub async fn toggle_complete(&self, id: &str) -> StoreResult<Task> {
        let status = self
            .get(id)
            .map(|task| task.status)
            .ok_or_else(|| StoreError::not_found(Task::KIND, id))?;
        let next = if status == TaskStatus::Done {
            TaskStatus::Todo
        } else {
            TaskStatus::Done
        };
        self.update(id, TaskPatch::status(next)).await
    }

    /// Moves a task into `list_id`, or out of any list with `None`.
    pub async fn move_to_list(&self, id: &str, list_id: Option<EntityId>) -> StoreResult<Task> {
        let patch = TaskPatch {
            list_id: Some(list_id),
            ..TaskPatch::default()
        };
        self.update(id, patch).await
    }

    /// Tasks belonging to `list_id`, in collection order.
    pub fn tasks_in_list(&self, list_id: &str) -> Vec<Task> {
        self.snapshot()
            .items()
            .filter(|task| task.list_id.as_deref() == Some(list_id))
            .cloned()
            .collect()
    }
}

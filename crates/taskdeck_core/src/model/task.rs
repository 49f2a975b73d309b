//! Task entity.
//!
//! # Invariants
//! - `completed_at` is set exactly when `status == TaskStatus::Done`.
//! - `label_ids` holds no duplicates and keeps first-seen order.

use crate::clock::advance_past;
use crate::error::StoreResult;
use crate::model::entity::{Entity, EntityId, Patch};
use crate::model::{normalize_name, normalize_optional_text};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created but not started.
    #[default]
    Todo,
    InProgress,
    Done,
    /// No longer actionable.
    Cancelled,
}

/// Task urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
    #[default]
    #[serde(alias = "None")]
    None,
}

impl Priority {
    /// Fixed sort rank: `High=4 > Medium=3 > Low=2 > None=1`.
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 4,
            Self::Medium => 3,
            Self::Low => 2,
            Self::None => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    /// Owning list, if any.
    pub list_id: Option<EntityId>,
    pub label_ids: Vec<EntityId>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create input for [`Task`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskDraft {
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub list_id: Option<EntityId>,
    pub label_ids: Vec<EntityId>,
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn in_list(mut self, list_id: impl Into<EntityId>) -> Self {
        self.list_id = Some(list_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn due(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

/// Partial update for [`Task`]. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub list_id: Option<Option<EntityId>>,
    pub label_ids: Option<Vec<EntityId>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn priority(priority: Priority) -> Self {
        Self {
            priority: Some(priority),
            ..Self::default()
        }
    }
}

impl Patch for TaskPatch {
    fn merge(&mut self, later: Self) {
        if later.name.is_some() {
            self.name = later.name;
        }
        if later.description.is_some() {
            self.description = later.description;
        }
        if later.status.is_some() {
            self.status = later.status;
        }
        if later.priority.is_some() {
            self.priority = later.priority;
        }
        if later.list_id.is_some() {
            self.list_id = later.list_id;
        }
        if later.label_ids.is_some() {
            self.label_ids = later.label_ids;
        }
        if later.due_date.is_some() {
            self.due_date = later.due_date;
        }
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Entity for Task {
    type Draft = TaskDraft;
    type Patch = TaskPatch;

    const KIND: &'static str = "task";

    fn build(id: EntityId, draft: TaskDraft, now: DateTime<Utc>) -> StoreResult<Self> {
        let name = normalize_name("name", &draft.name)?;
        Ok(Self {
            id,
            name,
            description: normalize_optional_text(draft.description),
            status: draft.status,
            priority: draft.priority,
            list_id: draft.list_id,
            label_ids: dedup_ids(draft.label_ids),
            due_date: draft.due_date,
            completed_at: (draft.status == TaskStatus::Done).then_some(now),
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_patch(&self, patch: &TaskPatch, now: DateTime<Utc>) -> StoreResult<Self> {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name = normalize_name("name", name)?;
        }
        if let Some(description) = &patch.description {
            next.description = normalize_optional_text(description.clone());
        }
        if let Some(priority) = patch.priority {
            next.priority = priority;
        }
        if let Some(list_id) = &patch.list_id {
            next.list_id = list_id.clone();
        }
        if let Some(label_ids) = &patch.label_ids {
            next.label_ids = dedup_ids(label_ids.clone());
        }
        if let Some(due_date) = patch.due_date {
            next.due_date = due_date;
        }

        next.updated_at = advance_past(now, self.updated_at);
        if let Some(status) = patch.status {
            if status != self.status {
                next.completed_at = (status == TaskStatus::Done).then_some(next.updated_at);
            }
            next.status = status;
        }
        Ok(next)
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn status(&self) -> Option<TaskStatus> {
        Some(self.status)
    }

    fn priority(&self) -> Option<Priority> {
        Some(self.priority)
    }

    fn list_id(&self) -> Option<&str> {
        self.list_id.as_deref()
    }

    fn due_date(&self) -> Option<DateTime<Utc>> {
        self.due_date
    }
}

fn dedup_ids(ids: Vec<EntityId>) -> Vec<EntityId> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

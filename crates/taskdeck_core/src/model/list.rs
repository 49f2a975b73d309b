//! Task list entity.

use crate::clock::advance_past;
use crate::error::StoreResult;
use crate::model::entity::{Entity, EntityId, Patch};
use crate::model::{normalize_color, normalize_name, normalize_optional_text};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named container grouping tasks through `Task::list_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskList {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    /// Lowercase `#rrggbb`.
    pub color: Option<String>,
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskListDraft {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

impl TaskListDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskListPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub color: Option<Option<String>>,
    pub icon: Option<Option<String>>,
}

impl Patch for TaskListPatch {
    fn merge(&mut self, later: Self) {
        if later.name.is_some() {
            self.name = later.name;
        }
        if later.description.is_some() {
            self.description = later.description;
        }
        if later.color.is_some() {
            self.color = later.color;
        }
        if later.icon.is_some() {
            self.icon = later.icon;
        }
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Entity for TaskList {
    type Draft = TaskListDraft;
    type Patch = TaskListPatch;

    const KIND: &'static str = "list";

    fn build(id: EntityId, draft: TaskListDraft, now: DateTime<Utc>) -> StoreResult<Self> {
        Ok(Self {
            id,
            name: normalize_name("name", &draft.name)?,
            description: normalize_optional_text(draft.description),
            color: optional_color(draft.color)?,
            icon: normalize_optional_text(draft.icon),
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_patch(&self, patch: &TaskListPatch, now: DateTime<Utc>) -> StoreResult<Self> {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name = normalize_name("name", name)?;
        }
        if let Some(description) = &patch.description {
            next.description = normalize_optional_text(description.clone());
        }
        if let Some(color) = &patch.color {
            next.color = optional_color(color.clone())?;
        }
        if let Some(icon) = &patch.icon {
            next.icon = normalize_optional_text(icon.clone());
        }
        next.updated_at = advance_past(now, self.updated_at);
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
}

fn optional_color(value: Option<String>) -> StoreResult<Option<String>> {
    match normalize_optional_text(value) {
        Some(color) => normalize_color("color", &color).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::{TaskList, TaskListDraft, TaskListPatch};
    use crate::model::entity::Entity;
    use chrono::Utc;

    #[test]
    fn build_normalizes_color_and_blank_icon() {
        let mut draft = TaskListDraft::new("Work").with_color("#FFAA00");
        draft.icon = Some("   ".to_string());
        let list = TaskList::build("l1".to_string(), draft, Utc::now()).unwrap();
        assert_eq!(list.color.as_deref(), Some("#ffaa00"));
        assert_eq!(list.icon, None);
    }

    #[test]
    fn patch_can_clear_color() {
        let list = TaskList::build(
            "l1".to_string(),
            TaskListDraft::new("Home").with_color("#000000"),
            Utc::now(),
        )
        .unwrap();
        let patch = TaskListPatch {
            color: Some(None),
            ..TaskListPatch::default()
        };
        let next = list.apply_patch(&patch, Utc::now()).unwrap();
        assert_eq!(next.color, None);
    }

    #[test]
    fn patch_rejects_malformed_color() {
        let list = TaskList::build("l1".to_string(), TaskListDraft::new("Home"), Utc::now()).unwrap();
        let patch = TaskListPatch {
            color: Some(Some("blue".to_string())),
            ..TaskListPatch::default()
        };
        assert!(list.apply_patch(&patch, Utc::now()).is_err());
    }
}

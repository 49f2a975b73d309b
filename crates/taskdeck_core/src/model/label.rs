//! Label entity.

use crate::clock::advance_past;
use crate::error::StoreResult;
use crate::model::entity::{Entity, EntityId, Patch};
use crate::model::{normalize_color, normalize_name};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const DEFAULT_LABEL_COLOR: &str = "#6b7280";

/// Colored tag attached to tasks through `Task::label_ids`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: EntityId,
    pub name: String,
    /// Lowercase `#rrggbb`.
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelDraft {
    pub name: String,
    /// Defaults to a neutral gray when absent.
    pub color: Option<String>,
}

impl LabelDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelPatch {
    pub name: Option<String>,
    pub color: Option<String>,
}

impl Patch for LabelPatch {
    fn merge(&mut self, later: Self) {
        if later.name.is_some() {
            self.name = later.name;
        }
        if later.color.is_some() {
            self.color = later.color;
        }
    }

    fn is_empty(&self) -> bool {
        self.name.is_none() && self.color.is_none()
    }
}

impl Entity for Label {
    type Draft = LabelDraft;
    type Patch = LabelPatch;

    const KIND: &'static str = "label";

    fn build(id: EntityId, draft: LabelDraft, now: DateTime<Utc>) -> StoreResult<Self> {
        let color = draft.color.as_deref().unwrap_or(DEFAULT_LABEL_COLOR);
        Ok(Self {
            id,
            name: normalize_name("name", &draft.name)?,
            color: normalize_color("color", color)?,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_patch(&self, patch: &LabelPatch, now: DateTime<Utc>) -> StoreResult<Self> {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name = normalize_name("name", name)?;
        }
        if let Some(color) = &patch.color {
            next.color = normalize_color("color", color)?;
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
}

//! Generic form record: a named bag of JSON fields.
//!
//! Used for editor drafts and settings panes whose shape the core does not
//! interpret; only the `name` is validated.

use crate::clock::advance_past;
use crate::error::StoreResult;
use crate::model::entity::{Entity, EntityId, Patch};
use crate::model::normalize_name;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormRecord {
    pub id: EntityId,
    pub name: String,
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FormRecord {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormDraft {
    pub name: String,
    pub fields: Map<String, Value>,
}

impl FormDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// Field-level update. A `Value::Null` entry removes the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormPatch {
    pub name: Option<String>,
    pub fields: Map<String, Value>,
}

impl FormPatch {
    pub fn field(key: impl Into<String>, value: Value) -> Self {
        let mut fields = Map::new();
        fields.insert(key.into(), value);
        Self { name: None, fields }
    }
}

impl Patch for FormPatch {
    fn merge(&mut self, later: Self) {
        if later.name.is_some() {
            self.name = later.name;
        }
        self.fields.extend(later.fields);
    }

    fn is_empty(&self) -> bool {
        self.name.is_none() && self.fields.is_empty()
    }
}

impl Entity for FormRecord {
    type Draft = FormDraft;
    type Patch = FormPatch;

    const KIND: &'static str = "form";

    fn build(id: EntityId, draft: FormDraft, now: DateTime<Utc>) -> StoreResult<Self> {
        let mut fields = draft.fields;
        fields.retain(|_, value| !value.is_null());
        Ok(Self {
            id,
            name: normalize_name("name", &draft.name)?,
            fields,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_patch(&self, patch: &FormPatch, now: DateTime<Utc>) -> StoreResult<Self> {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name = normalize_name("name", name)?;
        }
        for (key, value) in &patch.fields {
            if value.is_null() {
                next.fields.remove(key);
            } else {
                next.fields.insert(key.clone(), value.clone());
            }
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

#[cfg(test)]
mod tests {
    use super::{FormDraft, FormPatch, FormRecord};
    use crate::model::entity::{Entity, Patch};
    use chrono::Utc;
    use serde_json::{json, Value};

    #[test]
    fn patch_sets_and_removes_fields() {
        let form = FormRecord::build(
            "f1".to_string(),
            FormDraft::new("profile")
                .with_field("title", json!("Ms"))
                .with_field("city", json!("Oslo")),
            Utc::now(),
        )
        .unwrap();

        let mut patch = FormPatch::field("title", json!("Dr"));
        patch.merge(FormPatch::field("city", Value::Null));
        let next = form.apply_patch(&patch, Utc::now()).unwrap();

        assert_eq!(next.field("title"), Some(&json!("Dr")));
        assert_eq!(next.field("city"), None);
    }

    #[test]
    fn merge_keeps_last_value_per_field() {
        let mut patch = FormPatch::field("body", json!("a"));
        patch.merge(FormPatch::field("body", json!("ab")));
        patch.merge(FormPatch::field("body", json!("abc")));
        assert_eq!(patch.fields.get("body"), Some(&json!("abc")));
        assert_eq!(patch.fields.len(), 1);
    }
}

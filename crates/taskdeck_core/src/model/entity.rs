//! Entity contract shared by every store kind.

use crate::error::StoreResult;
use crate::model::task::{Priority, TaskStatus};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Opaque entity identifier (UUID v4 text for locally created entities).
pub type EntityId = String;

/// Partial update applied to an existing entity.
pub trait Patch: Clone + Debug + Default + Send + Sync + 'static {
    /// Folds a later patch into this one; fields set in `later` win.
    fn merge(&mut self, later: Self);

    /// Returns whether applying this patch would change nothing.
    fn is_empty(&self) -> bool;
}

/// Record kind owned by one store engine instance.
///
/// Filter and sort accessors default to "attribute absent" so kinds only
/// expose what they actually carry.
pub trait Entity: Clone + Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Create input.
    type Draft: Send + Sync;
    type Patch: Patch;

    /// Singular kind name used in errors, logs and storage rows.
    const KIND: &'static str;

    /// Validates `draft` and builds a new entity stamped with `now`.
    fn build(id: EntityId, draft: Self::Draft, now: DateTime<Utc>) -> StoreResult<Self>;

    /// Returns the next version of this entity with `patch` merged in.
    ///
    /// The returned `updated_at` is strictly greater than the current one.
    fn apply_patch(&self, patch: &Self::Patch, now: DateTime<Utc>) -> StoreResult<Self>;

    fn id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    fn status(&self) -> Option<TaskStatus> {
        None
    }

    fn priority(&self) -> Option<Priority> {
        None
    }

    fn list_id(&self) -> Option<&str> {
        None
    }

    fn due_date(&self) -> Option<DateTime<Utc>> {
        None
    }
}

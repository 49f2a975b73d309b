//! Backing data service contract.
//!
//! # Responsibility
//! - Define the CRUD + list operations the store engine confirms its
//!   optimistic mutations against.
//! - Provide in-memory and SQLite implementations.
//!
//! # Invariants
//! - Every call is scoped by user id; one user's rows are invisible to others.
//! - Backend failures surface as `StoreError::Operation` (transient),
//!   `StoreError::Rejected` (deterministic) or `StoreError::NotFound`;
//!   backends never validate entity shape.

mod memory;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use crate::error::StoreResult;
use crate::model::entity::Entity;
use async_trait::async_trait;

/// Remote or local service owning the authoritative entity rows.
#[async_trait]
pub trait EntityBackend<E: Entity>: Send + Sync {
    /// Persists a new entity and returns the stored version.
    async fn insert(&self, user_id: &str, entity: &E) -> StoreResult<E>;

    /// Replaces an existing entity and returns the stored version.
    async fn update(&self, user_id: &str, entity: &E) -> StoreResult<E>;

    /// Removes an entity. Removing an unknown id is not an error.
    async fn delete(&self, user_id: &str, id: &str) -> StoreResult<()>;

    /// Lists every entity of this kind owned by `user_id`, oldest first.
    async fn list(&self, user_id: &str) -> StoreResult<Vec<E>>;
}

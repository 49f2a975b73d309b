use super::EntityBackend;
use crate::error::{StoreError, StoreResult};
use crate::lock_recover;
use crate::model::entity::Entity;
use async_trait::async_trait;
use std::sync::Mutex;

/// Process-local backend keeping rows per user in insertion order.
#[derive(Debug)]
pub struct MemoryBackend<E: Entity> {
    rows: Mutex<Vec<(String, E)>>,
}

impl<E: Entity> Default for MemoryBackend<E> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Entity> MemoryBackend<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock_recover(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        lock_recover(&self.rows).is_empty()
    }

    pub fn get(&self, user_id: &str, id: &str) -> Option<E> {
        lock_recover(&self.rows)
            .iter()
            .find(|(owner, entity)| owner == user_id && entity.id() == id)
            .map(|(_, entity)| entity.clone())
    }
}

#[async_trait]
impl<E: Entity> EntityBackend<E> for MemoryBackend<E> {
    async fn insert(&self, user_id: &str, entity: &E) -> StoreResult<E> {
        let mut rows = lock_recover(&self.rows);
        if rows.iter().any(|(_, existing)| existing.id() == entity.id()) {
            return Err(StoreError::operation(format!(
                "{} `{}` already exists",
                E::KIND,
                entity.id()
            )));
        }
        rows.push((user_id.to_string(), entity.clone()));
        Ok(entity.clone())
    }

    async fn update(&self, user_id: &str, entity: &E) -> StoreResult<E> {
        let mut rows = lock_recover(&self.rows);
        let row = rows
            .iter_mut()
            .find(|(owner, existing)| owner == user_id && existing.id() == entity.id())
            .ok_or_else(|| StoreError::not_found(E::KIND, entity.id()))?;
        row.1 = entity.clone();
        Ok(entity.clone())
    }

    async fn delete(&self, user_id: &str, id: &str) -> StoreResult<()> {
        lock_recover(&self.rows).retain(|(owner, entity)| !(owner == user_id && entity.id() == id));
        Ok(())
    }

    async fn list(&self, user_id: &str) -> StoreResult<Vec<E>> {
        Ok(lock_recover(&self.rows)
            .iter()
            .filter(|(owner, _)| owner == user_id)
            .map(|(_, entity)| entity.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryBackend;
    use crate::backend::EntityBackend;
    use crate::error::StoreError;
    use crate::model::entity::Entity;
    use crate::model::label::{Label, LabelDraft};
    use chrono::Utc;

    fn label(id: &str) -> Label {
        Label::build(id.to_string(), LabelDraft::new(id), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn rows_are_scoped_by_user() {
        let backend = MemoryBackend::new();
        backend.insert("alice", &label("a")).await.unwrap();
        backend.insert("bob", &label("b")).await.unwrap();

        let alice = backend.list("alice").await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].id, "a");

        let err = backend.update("bob", &label("a")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_unknown_id_is_ok() {
        let backend: MemoryBackend<Label> = MemoryBackend::new();
        backend.delete("alice", "missing").await.unwrap();
        assert!(backend.is_empty());
    }
}

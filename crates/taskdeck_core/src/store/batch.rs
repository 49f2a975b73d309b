//! Aggregated outcome of per-id batch operations.

use crate::error::{StoreError, StoreResult};
use crate::model::entity::EntityId;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem<T> {
    pub id: EntityId,
    pub result: StoreResult<T>,
}

/// Result of a batch where every id was attempted independently.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult<T> {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// One entry per requested id, in request order.
    pub items: Vec<BatchItem<T>>,
}

impl<T> BatchResult<T> {
    pub(crate) fn from_items(items: Vec<BatchItem<T>>) -> Self {
        let successful = items.iter().filter(|item| item.result.is_ok()).count();
        Self {
            total: items.len(),
            successful,
            failed: items.len() - successful,
            items,
        }
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }

    /// Failed ids with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &StoreError)> + '_ {
        self.items.iter().filter_map(|item| match &item.result {
            Ok(_) => None,
            Err(err) => Some((item.id.as_str(), err)),
        })
    }
}

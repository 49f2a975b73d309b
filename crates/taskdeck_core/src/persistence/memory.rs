use super::{KeyValueStorage, StorageResult};
use crate::lock_recover;
use std::collections::HashMap;
use std::sync::Mutex;

/// Session-scoped storage; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock_recover(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        lock_recover(&self.items).is_empty()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(lock_recover(&self.items).get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        lock_recover(&self.items).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        lock_recover(&self.items).remove(key);
        Ok(())
    }
}

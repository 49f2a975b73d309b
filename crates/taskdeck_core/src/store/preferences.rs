//! Persisted view configuration for one store.
//!
//! Only filter, sort and favorite ids cross this boundary. Entity payloads
//! stay in the backend so stale or sensitive data is never cached on disk.

use crate::model::entity::EntityId;
use crate::persistence::{load_json, save_json, KeyValueStorage};
use crate::store::query::{FilterState, SortState};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewPreferences {
    #[serde(default)]
    pub filter: FilterState,
    #[serde(default)]
    pub sort: SortState,
    #[serde(default)]
    pub favorites: BTreeSet<EntityId>,
}

/// Storage slot holding one store's [`ViewPreferences`].
#[derive(Clone)]
pub struct PreferenceSlot {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
}

impl PreferenceSlot {
    pub fn new(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Best-effort read; corrupt or unreadable values fall back to defaults.
    pub fn load(&self) -> ViewPreferences {
        match load_json(self.storage.as_ref(), &self.key) {
            Ok(Some(preferences)) => preferences,
            Ok(None) => ViewPreferences::default(),
            Err(err) => {
                warn!(
                    "event=preferences_load module=store status=error key={} error={}",
                    self.key, err
                );
                ViewPreferences::default()
            }
        }
    }

    pub fn save(&self, preferences: &ViewPreferences) {
        if let Err(err) = save_json(self.storage.as_ref(), &self.key, preferences) {
            warn!(
                "event=preferences_save module=store status=error key={} error={}",
                self.key, err
            );
        }
    }

    pub fn clear(&self) {
        if let Err(err) = self.storage.remove_item(&self.key) {
            warn!(
                "event=preferences_clear module=store status=error key={} error={}",
                self.key, err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PreferenceSlot, ViewPreferences};
    use crate::persistence::{KeyValueStorage, MemoryStorage};
    use crate::store::query::{SortDirection, SortField, SortState};
    use std::sync::Arc;

    #[test]
    fn save_then_load() {
        let storage = Arc::new(MemoryStorage::new());
        let slot = PreferenceSlot::new(storage, "tasks.view");
        let preferences = ViewPreferences {
            sort: SortState::new(SortField::Priority, SortDirection::Asc),
            favorites: ["t1".to_string()].into_iter().collect(),
            ..ViewPreferences::default()
        };
        slot.save(&preferences);
        assert_eq!(slot.load(), preferences);
        slot.clear();
        assert_eq!(slot.load(), ViewPreferences::default());
    }

    #[test]
    fn corrupt_value_falls_back_to_defaults() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("tasks.view", "[1, 2").unwrap();
        let slot = PreferenceSlot::new(storage, "tasks.view");
        assert_eq!(slot.load(), ViewPreferences::default());
    }
}

//! Immutable store snapshot and its pure transitions.
//!
//! # Invariants
//! - `order` and `cache` always hold the same id set.
//! - `selected` is a subset of cache keys.
//! - Removing an entity drops it from selection, favorites, recent, current
//!   and failure marks in the same transition.
//! - `recent` holds at most [`MAX_RECENT`] distinct ids, most recent first.

use crate::error::StoreError;
use crate::model::entity::{Entity, EntityId};
use crate::store::query::{filter_and_sort, FilterState, SortState};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Capacity of the recently-switched-to list.
pub const MAX_RECENT: usize = 10;

/// One observable store snapshot.
#[derive(Debug, Clone)]
pub struct StoreState<E: Entity> {
    order: Vec<EntityId>,
    cache: HashMap<EntityId, E>,
    selected: BTreeSet<EntityId>,
    favorites: BTreeSet<EntityId>,
    recent: Vec<EntityId>,
    current: Option<EntityId>,
    filter: FilterState,
    sort: SortState,
    failed: BTreeMap<EntityId, String>,
    last_error: Option<StoreError>,
    loading: bool,
    pub(crate) version: u64,
}

impl<E: Entity> Default for StoreState<E> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            cache: HashMap::new(),
            selected: BTreeSet::new(),
            favorites: BTreeSet::new(),
            recent: Vec::new(),
            current: None,
            filter: FilterState::default(),
            sort: SortState::default(),
            failed: BTreeMap::new(),
            last_error: None,
            loading: false,
            version: 0,
        }
    }
}

impl<E: Entity> StoreState<E> {
    // ---- reads ----

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cache.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&E> {
        self.cache.get(id)
    }

    /// Entities in collection order.
    pub fn items(&self) -> impl Iterator<Item = &E> + '_ {
        self.order.iter().filter_map(|id| self.cache.get(id))
    }

    pub fn ids(&self) -> &[EntityId] {
        &self.order
    }

    pub fn cache_keys(&self) -> BTreeSet<&str> {
        self.cache.keys().map(String::as_str).collect()
    }

    pub fn selected_ids(&self) -> &BTreeSet<EntityId> {
        &self.selected
    }

    /// Selected entities in collection order; unresolved ids are skipped.
    pub fn selected(&self) -> Vec<E> {
        self.items()
            .filter(|entity| self.selected.contains(entity.id()))
            .cloned()
            .collect()
    }

    pub fn favorites(&self) -> &BTreeSet<EntityId> {
        &self.favorites
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.favorites.contains(id)
    }

    pub fn recent(&self) -> &[EntityId] {
        &self.recent
    }

    pub fn current(&self) -> Option<&E> {
        self.current.as_deref().and_then(|id| self.cache.get(id))
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn sort(&self) -> SortState {
        self.sort
    }

    /// Ids whose last mutation failed, with the failure message.
    pub fn failed(&self) -> &BTreeMap<EntityId, String> {
        &self.failed
    }

    pub fn last_error(&self) -> Option<&StoreError> {
        self.last_error.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Monotonic counter bumped by every assignment.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Filtered and sorted view of the collection.
    pub fn filtered(&self) -> Vec<E> {
        filter_and_sort(self.items(), &self.filter, self.sort)
    }

    // ---- transitions ----

    pub(crate) fn inserted(&self, entity: E) -> Self {
        let mut next = self.clone();
        let id = entity.id().to_string();
        if next.cache.insert(id.clone(), entity).is_none() {
            next.order.push(id);
        }
        next
    }

    /// Re-inserts a rolled-back entity near its former position.
    pub(crate) fn restored(&self, index: usize, entity: E) -> Self {
        if self.contains(entity.id()) {
            return self.clone();
        }
        let mut next = self.clone();
        let id = entity.id().to_string();
        next.order.insert(index.min(next.order.len()), id.clone());
        next.cache.insert(id, entity);
        next
    }

    pub(crate) fn replaced(&self, entity: E) -> Self {
        let mut next = self.clone();
        if let Some(slot) = next.cache.get_mut(entity.id()) {
            *slot = entity;
        }
        next
    }

    /// Swaps `optimistic` for `replacement` unless a newer local version
    /// superseded it meanwhile.
    pub(crate) fn reconciled(&self, optimistic: &E, replacement: E) -> Self {
        match self.cache.get(optimistic.id()) {
            Some(cached) if cached.updated_at() == optimistic.updated_at() => {
                self.replaced(replacement)
            }
            _ => self.clone(),
        }
    }

    /// Removes `id` everywhere; `None` when it is absent.
    pub(crate) fn removed(&self, id: &str) -> Option<(Self, (usize, E))> {
        let index = self.order.iter().position(|existing| existing == id)?;
        let mut next = self.clone();
        next.order.remove(index);
        let entity = next.cache.remove(id)?;
        next.selected.remove(id);
        next.favorites.remove(id);
        next.recent.retain(|existing| existing != id);
        if next.current.as_deref() == Some(id) {
            next.current = None;
        }
        next.failed.remove(id);
        Some((next, (index, entity)))
    }

    /// Replaces the collection and prunes every id-keyed set to survivors.
    pub(crate) fn loaded(&self, entities: Vec<E>) -> Self {
        let mut next = self.clone();
        next.order.clear();
        next.cache.clear();
        for entity in entities {
            let id = entity.id().to_string();
            if next.cache.insert(id.clone(), entity).is_none() {
                next.order.push(id);
            }
        }
        let cache = &next.cache;
        next.selected.retain(|id| cache.contains_key(id));
        next.favorites.retain(|id| cache.contains_key(id));
        next.recent.retain(|id| cache.contains_key(id));
        next.failed.retain(|id, _| cache.contains_key(id));
        if next
            .current
            .as_deref()
            .is_some_and(|id| !cache.contains_key(id))
        {
            next.current = None;
        }
        next
    }

    pub(crate) fn with_filter(&self, filter: FilterState) -> Self {
        Self {
            filter,
            ..self.clone()
        }
    }

    pub(crate) fn with_sort(&self, sort: SortState) -> Self {
        Self {
            sort,
            ..self.clone()
        }
    }

    pub(crate) fn with_favorites(&self, favorites: BTreeSet<EntityId>) -> Self {
        Self {
            favorites,
            ..self.clone()
        }
    }

    pub(crate) fn with_selected<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Self {
        let mut next = self.clone();
        for id in ids {
            if next.cache.contains_key(id) {
                next.selected.insert(id.to_string());
            }
        }
        next
    }

    pub(crate) fn without_selected(&self, id: &str) -> Self {
        let mut next = self.clone();
        next.selected.remove(id);
        next
    }

    pub(crate) fn with_selection_cleared(&self) -> Self {
        Self {
            selected: BTreeSet::new(),
            ..self.clone()
        }
    }

    pub(crate) fn with_favorite_toggled(&self, id: &str) -> Self {
        let mut next = self.clone();
        if !next.favorites.remove(id) {
            next.favorites.insert(id.to_string());
        }
        next
    }

    /// Marks `id` current and moves it to the front of `recent`.
    pub(crate) fn with_current(&self, id: &str) -> Self {
        let mut next = self.clone();
        next.current = Some(id.to_string());
        next.recent.retain(|existing| existing != id);
        next.recent.insert(0, id.to_string());
        next.recent.truncate(MAX_RECENT);
        next
    }

    pub(crate) fn with_failure(&self, id: &str, message: String) -> Self {
        let mut next = self.clone();
        if next.cache.contains_key(id) {
            next.failed.insert(id.to_string(), message);
        }
        next
    }

    pub(crate) fn without_failure(&self, id: &str) -> Self {
        let mut next = self.clone();
        next.failed.remove(id);
        next
    }

    pub(crate) fn with_error(&self, error: Option<StoreError>) -> Self {
        Self {
            last_error: error,
            ..self.clone()
        }
    }

    pub(crate) fn with_loading(&self, loading: bool) -> Self {
        Self {
            loading,
            ..self.clone()
        }
    }
}

//! Store engine: optimistic CRUD over one entity kind.

use crate::backend::EntityBackend;
use crate::clock::Clock;
use crate::error::{StoreError, StoreResult};
use crate::lock_recover;
use crate::middleware::RetryMiddleware;
use crate::model::entity::{Entity, EntityId};
use crate::store::batch::{BatchItem, BatchResult};
use crate::store::preferences::{PreferenceSlot, ViewPreferences};
use crate::store::query::{FilterState, SortState};
use crate::store::state::StoreState;
use log::{debug, warn};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Callback invoked with the new snapshot after every state assignment.
pub type StoreListener<E> = Arc<dyn Fn(&StoreState<E>) + Send + Sync>;

/// Callback invoked with the id of every entity that leaves the cache
/// through a delete or a reload.
pub type RemovalListener = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Collaborators one store instance is built from.
pub struct StoreDeps<E: Entity> {
    pub user_id: String,
    pub backend: Arc<dyn EntityBackend<E>>,
    pub middleware: RetryMiddleware,
    pub clock: Arc<dyn Clock>,
    /// Where filter/sort/favorites are persisted, if anywhere.
    pub preferences: Option<PreferenceSlot>,
}

struct StoreInner<E: Entity> {
    user_id: String,
    state: Mutex<Arc<StoreState<E>>>,
    listeners: Mutex<Vec<(SubscriptionId, StoreListener<E>)>>,
    removal_listeners: Mutex<Vec<RemovalListener>>,
    next_listener: AtomicU64,
    /// Persisted favorites not yet matched against a loaded collection.
    restoring_favorites: Mutex<BTreeSet<EntityId>>,
    backend: Arc<dyn EntityBackend<E>>,
    middleware: RetryMiddleware,
    clock: Arc<dyn Clock>,
    preferences: Option<PreferenceSlot>,
}

/// Cheaply cloneable handle to one entity kind's store.
///
/// Mutations follow optimistic-then-confirm: the local snapshot changes
/// first, the backend call runs through the retry middleware, and its result
/// either reconciles the cached entity or rolls the change back.
pub struct EntityStore<E: Entity> {
    inner: Arc<StoreInner<E>>,
}

impl<E: Entity> Clone for EntityStore<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Entity> EntityStore<E> {
    /// Builds a store, hydrating view preferences when a slot is given.
    ///
    /// Persisted favorites are held back until [`fetch_all`](Self::fetch_all)
    /// confirms which of them still exist, so `favorites()` only ever names
    /// cached ids.
    pub fn new(deps: StoreDeps<E>) -> Self {
        let mut initial = StoreState::default();
        let mut restoring = BTreeSet::new();
        if let Some(slot) = &deps.preferences {
            let preferences = slot.load();
            initial = initial
                .with_filter(preferences.filter)
                .with_sort(preferences.sort);
            restoring = preferences.favorites;
        }

        Self {
            inner: Arc::new(StoreInner {
                user_id: deps.user_id,
                state: Mutex::new(Arc::new(initial)),
                listeners: Mutex::new(Vec::new()),
                removal_listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                restoring_favorites: Mutex::new(restoring),
                backend: deps.backend,
                middleware: deps.middleware,
                clock: deps.clock,
                preferences: deps.preferences,
            }),
        }
    }

    /// Store name used in logs and error records.
    pub fn name(&self) -> &str {
        self.inner.middleware.store()
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    /// Current immutable snapshot.
    pub fn snapshot(&self) -> Arc<StoreState<E>> {
        Arc::clone(&lock_recover(&self.inner.state))
    }

    pub fn get(&self, id: &str) -> Option<E> {
        self.snapshot().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.snapshot().contains(id)
    }

    pub fn all(&self) -> Vec<E> {
        self.snapshot().items().cloned().collect()
    }

    pub fn filtered(&self) -> Vec<E> {
        self.snapshot().filtered()
    }

    pub fn selected(&self) -> Vec<E> {
        self.snapshot().selected()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&StoreState<E>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        lock_recover(&self.inner.listeners).push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = lock_recover(&self.inner.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Registers `listener` for ids removed by `delete`, `batch_delete` or a
    /// reload that no longer returns them.
    pub fn on_removed(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        lock_recover(&self.inner.removal_listeners).push(Arc::new(listener));
    }

    // ---- CRUD ----

    /// Validates and creates an entity, confirming it with the backend.
    ///
    /// # Errors
    /// - `InvalidInput` before any state change when the draft is malformed.
    /// - Backend failures after the optimistic insert has been rolled back.
    pub async fn create(&self, draft: E::Draft) -> StoreResult<E> {
        let id = Uuid::new_v4().to_string();
        let entity = E::build(id.clone(), draft, self.inner.clock.now())?;
        self.set(|state| state.inserted(entity.clone()));

        let result = self
            .inner
            .middleware
            .run("create", || {
                self.inner.backend.insert(&self.inner.user_id, &entity)
            })
            .await;

        match result {
            Ok(confirmed) => {
                self.set(|state| state.reconciled(&entity, confirmed.clone()).with_error(None));
                debug!(
                    "event=store_create module=store status=ok store={} id={}",
                    self.name(),
                    id
                );
                Ok(confirmed)
            }
            Err(err) => {
                self.set(|state| {
                    let base = state
                        .removed(&id)
                        .map_or_else(|| state.clone(), |(next, _)| next);
                    base.with_error(Some(err.clone()))
                });
                warn!(
                    "event=store_create module=store status=rolled_back store={} id={} error_code={}",
                    self.name(),
                    id,
                    err.code()
                );
                Err(err)
            }
        }
    }

    /// Merges `patch` into entity `id`, confirming with the backend.
    ///
    /// # Errors
    /// - `NotFound` when `id` is not cached; nothing is mutated.
    /// - `InvalidInput` when the patched entity is malformed; nothing is mutated.
    /// - Backend failures after the previous version has been restored.
    pub async fn update(&self, id: &str, patch: E::Patch) -> StoreResult<E> {
        let now = self.inner.clock.now();
        let (previous, optimistic) = self.try_apply(|state| {
            let current = state
                .get(id)
                .ok_or_else(|| StoreError::not_found(E::KIND, id))?;
            let next = current.apply_patch(&patch, now)?;
            Ok((
                state.replaced(next.clone()).without_failure(id),
                (current.clone(), next),
            ))
        })?;

        let result = self
            .inner
            .middleware
            .run("update", || {
                self.inner.backend.update(&self.inner.user_id, &optimistic)
            })
            .await;

        match result {
            Ok(confirmed) => {
                self.set(|state| {
                    state
                        .reconciled(&optimistic, confirmed.clone())
                        .with_error(None)
                });
                debug!(
                    "event=store_update module=store status=ok store={} id={}",
                    self.name(),
                    id
                );
                Ok(confirmed)
            }
            Err(err) => {
                self.set(|state| {
                    state
                        .reconciled(&optimistic, previous.clone())
                        .with_failure(id, err.to_string())
                        .with_error(Some(err.clone()))
                });
                warn!(
                    "event=store_update module=store status=rolled_back store={} id={} error_code={}",
                    self.name(),
                    id,
                    err.code()
                );
                Err(err)
            }
        }
    }

    /// Deletes entity `id`. Returns `Ok(false)` when it was already absent.
    ///
    /// # Errors
    /// - Backend failures after the entity has been restored in place.
    pub async fn delete(&self, id: &str) -> StoreResult<bool> {
        let removed = self.try_apply(|state| {
            state
                .removed(id)
                .ok_or_else(|| StoreError::not_found(E::KIND, id))
        });
        let (index, entity) = match removed {
            Ok(removed) => removed,
            Err(_) => {
                debug!(
                    "event=store_delete module=store status=noop store={} id={}",
                    self.name(),
                    id
                );
                return Ok(false);
            }
        };
        lock_recover(&self.inner.restoring_favorites).remove(id);
        self.notify_removed([id]);

        let result = self
            .inner
            .middleware
            .run("delete", || {
                self.inner.backend.delete(&self.inner.user_id, id)
            })
            .await;

        match result {
            Ok(()) => {
                debug!(
                    "event=store_delete module=store status=ok store={} id={}",
                    self.name(),
                    id
                );
                Ok(true)
            }
            Err(err) => {
                self.set(|state| {
                    state
                        .restored(index, entity.clone())
                        .with_failure(id, err.to_string())
                        .with_error(Some(err.clone()))
                });
                warn!(
                    "event=store_delete module=store status=rolled_back store={} id={} error_code={}",
                    self.name(),
                    id,
                    err.code()
                );
                Err(err)
            }
        }
    }

    /// Replaces the collection with the backend's rows for this user.
    pub async fn fetch_all(&self) -> StoreResult<usize> {
        self.set(|state| state.with_loading(true));
        let result = self
            .inner
            .middleware
            .run("fetch", || self.inner.backend.list(&self.inner.user_id))
            .await;

        match result {
            Ok(entities) => {
                let count = entities.len();
                let restoring =
                    std::mem::take(&mut *lock_recover(&self.inner.restoring_favorites));
                let previous = self.snapshot();
                self.set(|state| {
                    let loaded = state.loaded(entities.clone());
                    let mut favorites = loaded.favorites().clone();
                    favorites.extend(restoring.iter().filter(|id| loaded.contains(id)).cloned());
                    loaded
                        .with_favorites(favorites)
                        .with_loading(false)
                        .with_error(None)
                });
                let current = self.snapshot();
                self.notify_removed(
                    previous
                        .ids()
                        .iter()
                        .map(String::as_str)
                        .filter(|id| !current.contains(id)),
                );
                if !restoring.is_empty() {
                    self.persist_preferences();
                }
                debug!(
                    "event=store_fetch module=store status=ok store={} count={}",
                    self.name(),
                    count
                );
                Ok(count)
            }
            Err(err) => {
                self.set(|state| state.with_loading(false).with_error(Some(err.clone())));
                Err(err)
            }
        }
    }

    // ---- batch ----

    /// Applies `patch` to every id independently, in order.
    pub async fn batch_update(&self, ids: &[EntityId], patch: E::Patch) -> BatchResult<E> {
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            let result = self.update(id, patch.clone()).await;
            items.push(BatchItem {
                id: id.clone(),
                result,
            });
        }
        let outcome = BatchResult::from_items(items);
        debug!(
            "event=store_batch_update module=store store={} total={} successful={} failed={}",
            self.name(),
            outcome.total,
            outcome.successful,
            outcome.failed
        );
        outcome
    }

    /// Deletes every id independently; absent ids are reported as `NotFound`.
    pub async fn batch_delete(&self, ids: &[EntityId]) -> BatchResult<()> {
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            let result = if self.contains(id) {
                self.delete(id).await.map(|_| ())
            } else {
                Err(StoreError::not_found(E::KIND, id.as_str()))
            };
            items.push(BatchItem {
                id: id.clone(),
                result,
            });
        }
        let outcome = BatchResult::from_items(items);
        debug!(
            "event=store_batch_delete module=store store={} total={} successful={} failed={}",
            self.name(),
            outcome.total,
            outcome.successful,
            outcome.failed
        );
        outcome
    }

    // ---- selection ----

    pub fn select(&self, id: &str) {
        self.set(|state| state.with_selected([id]));
    }

    pub fn select_multiple(&self, ids: &[EntityId]) {
        self.set(|state| state.with_selected(ids.iter().map(String::as_str)));
    }

    /// Selects every entity currently passing the filter.
    pub fn select_all_filtered(&self) {
        self.set(|state| {
            let visible = state.filtered();
            state.with_selected(visible.iter().map(|entity| entity.id()))
        });
    }

    pub fn deselect(&self, id: &str) {
        self.set(|state| state.without_selected(id));
    }

    pub fn toggle_selection(&self, id: &str) {
        self.set(|state| {
            if state.selected_ids().contains(id) {
                state.without_selected(id)
            } else {
                state.with_selected([id])
            }
        });
    }

    pub fn clear_selection(&self) {
        self.set(StoreState::with_selection_cleared);
    }

    // ---- current / recent / favorites ----

    /// Switches to entity `id`, recording it at the front of `recent`.
    pub fn set_current(&self, id: &str) -> StoreResult<()> {
        self.try_apply(|state| {
            if !state.contains(id) {
                return Err(StoreError::not_found(E::KIND, id));
            }
            Ok((state.with_current(id), ()))
        })
    }

    /// Flips favorite membership; returns whether `id` is now a favorite.
    pub fn toggle_favorite(&self, id: &str) -> StoreResult<bool> {
        let favorite = self.try_apply(|state| {
            if !state.contains(id) {
                return Err(StoreError::not_found(E::KIND, id));
            }
            let next = state.with_favorite_toggled(id);
            let favorite = next.is_favorite(id);
            Ok((next, favorite))
        })?;
        lock_recover(&self.inner.restoring_favorites).remove(id);
        self.persist_preferences();
        Ok(favorite)
    }

    // ---- filter / sort ----

    pub fn set_filter(&self, filter: FilterState) {
        self.set(|state| state.with_filter(filter.clone()));
        self.persist_preferences();
    }

    pub fn set_query(&self, query: impl Into<String>) {
        let query = query.into();
        self.set(|state| {
            let mut filter = state.filter().clone();
            filter.query = query.clone();
            state.with_filter(filter)
        });
        self.persist_preferences();
    }

    pub fn set_sort(&self, sort: SortState) {
        self.set(|state| state.with_sort(sort));
        self.persist_preferences();
    }

    pub fn clear_filters(&self) {
        self.set(|state| state.with_filter(FilterState::default()));
        self.persist_preferences();
    }

    /// Drops every entity, selection, filter and mark; forgets persisted
    /// view preferences.
    pub fn reset(&self) {
        self.set(|_| StoreState::default());
        lock_recover(&self.inner.restoring_favorites).clear();
        if let Some(slot) = &self.inner.preferences {
            slot.clear();
        }
        debug!(
            "event=store_reset module=store status=ok store={}",
            self.name()
        );
    }

    // ---- assignment primitive ----

    fn set(&self, transition: impl FnOnce(&StoreState<E>) -> StoreState<E>) {
        let snapshot = {
            let mut guard = lock_recover(&self.inner.state);
            let mut next = transition(&guard);
            next.version = guard.version + 1;
            let snapshot = Arc::new(next);
            *guard = Arc::clone(&snapshot);
            snapshot
        };
        self.notify(&snapshot);
    }

    /// Computes the next snapshot and assigns it in one step.
    ///
    /// On `Err` nothing is assigned and no listener runs.
    fn try_apply<R>(
        &self,
        transition: impl FnOnce(&StoreState<E>) -> StoreResult<(StoreState<E>, R)>,
    ) -> StoreResult<R> {
        let (snapshot, output) = {
            let mut guard = lock_recover(&self.inner.state);
            let (mut next, output) = transition(&guard)?;
            next.version = guard.version + 1;
            let snapshot = Arc::new(next);
            *guard = Arc::clone(&snapshot);
            (snapshot, output)
        };
        self.notify(&snapshot);
        Ok(output)
    }

    fn notify(&self, snapshot: &StoreState<E>) {
        let listeners: Vec<StoreListener<E>> = lock_recover(&self.inner.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(snapshot);
        }
    }

    fn notify_removed<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
        let listeners: Vec<RemovalListener> = lock_recover(&self.inner.removal_listeners).clone();
        if listeners.is_empty() {
            return;
        }
        for id in ids {
            for listener in &listeners {
                listener(id);
            }
        }
    }

    fn persist_preferences(&self) {
        if let Some(slot) = &self.inner.preferences {
            let snapshot = self.snapshot();
            let mut favorites = snapshot.favorites().clone();
            favorites.extend(lock_recover(&self.inner.restoring_favorites).iter().cloned());
            slot.save(&ViewPreferences {
                filter: snapshot.filter().clone(),
                sort: snapshot.sort(),
                favorites,
            });
        }
    }
}

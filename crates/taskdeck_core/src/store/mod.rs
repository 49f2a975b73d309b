//! Reactive domain store engine.
//!
//! # Responsibility
//! - Hold one entity kind's collection as immutable snapshots.
//! - Run optimistic create/update/delete through the retry middleware.
//! - Derive filtered and sorted views, selection, favorites and recents.
//!
//! # Invariants
//! - Every state change replaces the whole snapshot and bumps its version.
//! - Subscribers observe snapshots in assignment order, never a partial one.
//! - A failed backend call leaves the entity as it was before the mutation.

pub mod batch;
pub mod engine;
pub mod preferences;
pub mod query;
pub mod state;
mod task_ops;

pub use batch::{BatchItem, BatchResult};
pub use engine::{EntityStore, RemovalListener, StoreDeps, StoreListener, SubscriptionId};
pub use preferences::{PreferenceSlot, ViewPreferences};
pub use query::{compare_text, filter_and_sort, FilterState, SortDirection, SortField, SortState};
pub use state::{StoreState, MAX_RECENT};

//! Filter and sort derivation over a store collection.
//!
//! Everything here is a pure function of (collection, filter, sort).

use crate::model::entity::{Entity, EntityId};
use crate::model::task::{Priority, TaskStatus};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Conjunctive filter; an empty dimension is inactive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    #[serde(default)]
    pub statuses: BTreeSet<TaskStatus>,
    #[serde(default)]
    pub priorities: BTreeSet<Priority>,
    #[serde(default)]
    pub list_id: Option<EntityId>,
    /// Case-insensitive text matched against name and description.
    #[serde(default)]
    pub query: String,
}

impl FilterState {
    pub fn is_active(&self) -> bool {
        !self.statuses.is_empty()
            || !self.priorities.is_empty()
            || self.list_id.is_some()
            || !self.query.trim().is_empty()
    }

    /// Returns whether `entity` passes every active dimension.
    ///
    /// Entities that lack an attribute fail an active filter on it.
    pub fn matches<E: Entity>(&self, entity: &E) -> bool {
        if !self.statuses.is_empty()
            && !entity
                .status()
                .is_some_and(|status| self.statuses.contains(&status))
        {
            return false;
        }
        if !self.priorities.is_empty()
            && !entity
                .priority()
                .is_some_and(|priority| self.priorities.contains(&priority))
        {
            return false;
        }
        if let Some(list_id) = &self.list_id {
            if entity.list_id() != Some(list_id.as_str()) {
                return false;
            }
        }

        let needle = self.query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        entity.name().to_lowercase().contains(&needle)
            || entity
                .description()
                .is_some_and(|description| description.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Name,
    #[default]
    CreatedAt,
    UpdatedAt,
    DueDate,
    Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SortState {
    #[serde(default)]
    pub field: SortField,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortState {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }
}

/// Orders two entities under `sort`.
///
/// Priority is the one field where ascending means highest rank first.
/// Missing due dates sort last in either direction.
pub fn compare<E: Entity>(a: &E, b: &E, sort: SortState) -> Ordering {
    let directed = |ordering: Ordering| match sort.direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    };

    match sort.field {
        SortField::Name => directed(compare_text(a.name(), b.name())),
        SortField::CreatedAt => directed(a.created_at().cmp(&b.created_at())),
        SortField::UpdatedAt => directed(a.updated_at().cmp(&b.updated_at())),
        SortField::DueDate => match (a.due_date(), b.due_date()) {
            (Some(left), Some(right)) => directed(left.cmp(&right)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SortField::Priority => directed(priority_rank(b).cmp(&priority_rank(a))),
    }
}

/// Locale-style text ordering: case-folded comparison, raw text breaks ties.
pub fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Filters then stably sorts `items`.
pub fn filter_and_sort<'a, E, I>(items: I, filter: &FilterState, sort: SortState) -> Vec<E>
where
    E: Entity,
    I: IntoIterator<Item = &'a E>,
{
    let mut matched: Vec<E> = items
        .into_iter()
        .filter(|entity| filter.matches(*entity))
        .cloned()
        .collect();
    matched.sort_by(|a, b| compare(a, b, sort));
    matched
}

fn priority_rank<E: Entity>(entity: &E) -> u8 {
    entity.priority().map_or(0, Priority::rank)
}

#[cfg(test)]
mod tests {
    use super::{compare_text, filter_and_sort, FilterState, SortDirection, SortField, SortState};
    use crate::model::entity::Entity;
    use crate::model::task::{Priority, Task, TaskDraft, TaskStatus};
    use chrono::{Duration, TimeZone, Utc};
    use std::cmp::Ordering;

    fn task(id: &str, name: &str, priority: Priority, offset_ms: i64) -> Task {
        let now = Utc.timestamp_millis_opt(1_000_000).unwrap() + Duration::milliseconds(offset_ms);
        Task::build(id.to_string(), TaskDraft::new(name).with_priority(priority), now).unwrap()
    }

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|task| task.id.as_str()).collect()
    }

    #[test]
    fn priority_ascending_puts_highest_first() {
        let items = vec![
            task("low", "a", Priority::Low, 0),
            task("high", "b", Priority::High, 1),
            task("medium", "c", Priority::Medium, 2),
        ];
        let sorted = filter_and_sort(
            &items,
            &FilterState::default(),
            SortState::new(SortField::Priority, SortDirection::Asc),
        );
        assert_eq!(ids(&sorted), vec!["high", "medium", "low"]);

        let reversed = filter_and_sort(
            &items,
            &FilterState::default(),
            SortState::new(SortField::Priority, SortDirection::Desc),
        );
        assert_eq!(ids(&reversed), vec!["low", "medium", "high"]);
    }

    #[test]
    fn ties_keep_input_order() {
        let items = vec![
            task("first", "x", Priority::High, 0),
            task("second", "y", Priority::High, 0),
            task("third", "z", Priority::High, 0),
        ];
        let sorted = filter_and_sort(
            &items,
            &FilterState::default(),
            SortState::new(SortField::Priority, SortDirection::Asc),
        );
        assert_eq!(ids(&sorted), vec!["first", "second", "third"]);
    }

    #[test]
    fn filters_are_conjunctive() {
        let mut done_high = task("done-high", "Pay rent", Priority::High, 0);
        done_high.status = TaskStatus::Done;
        let todo_high = task("todo-high", "Pay taxes", Priority::High, 1);
        let todo_low = task("todo-low", "Pay later", Priority::Low, 2);
        let items = vec![done_high, todo_high, todo_low];

        let filter = FilterState {
            statuses: [TaskStatus::Todo].into_iter().collect(),
            priorities: [Priority::High].into_iter().collect(),
            query: "PAY".to_string(),
            ..FilterState::default()
        };
        let matched = filter_and_sort(&items, &filter, SortState::default());
        assert_eq!(ids(&matched), vec!["todo-high"]);
    }

    #[test]
    fn text_query_matches_description() {
        let mut with_notes = task("t1", "Call", Priority::None, 0);
        with_notes.description = Some("Ask about the Invoice".to_string());
        let other = task("t2", "Walk", Priority::None, 1);
        let filter = FilterState {
            query: "invoice".to_string(),
            ..FilterState::default()
        };
        let matched = filter_and_sort(&[with_notes, other], &filter, SortState::default());
        assert_eq!(ids(&matched), vec!["t1"]);
    }

    #[test]
    fn missing_due_dates_sort_last() {
        let base = Utc.timestamp_millis_opt(0).unwrap();
        let mut early = task("early", "a", Priority::None, 0);
        early.due_date = Some(base + Duration::days(1));
        let mut late = task("late", "b", Priority::None, 0);
        late.due_date = Some(base + Duration::days(5));
        let undated = task("undated", "c", Priority::None, 0);
        let items = vec![undated, late, early];

        for direction in [SortDirection::Asc, SortDirection::Desc] {
            let sorted = filter_and_sort(
                &items,
                &FilterState::default(),
                SortState::new(SortField::DueDate, direction),
            );
            assert_eq!(sorted.last().map(|task| task.id.as_str()), Some("undated"));
        }
    }

    #[test]
    fn compare_text_folds_case_first() {
        assert_eq!(compare_text("apple", "Banana"), Ordering::Less);
        assert_eq!(compare_text("Apple", "apple"), Ordering::Less);
        assert_eq!(compare_text("same", "same"), Ordering::Equal);
    }

    #[test]
    fn derivation_is_repeatable() {
        let items = vec![
            task("a", "Zeta", Priority::Low, 0),
            task("b", "alpha", Priority::High, 1),
        ];
        let sort = SortState::new(SortField::Name, SortDirection::Asc);
        let first = filter_and_sort(&items, &FilterState::default(), sort);
        let second = filter_and_sort(&items, &FilterState::default(), sort);
        assert_eq!(first, second);
        assert_eq!(ids(&first), vec!["b", "a"]);
    }
}

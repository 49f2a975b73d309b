//! Domain entities managed by the store engine.
//!
//! # Responsibility
//! - Define the entity kinds (task, list, label, form) and their
//!   create/patch inputs.
//! - Validate caller-supplied shapes before they reach any store state.
//!
//! # Invariants
//! - Every entity carries a stable string `id`, `created_at` and `updated_at`.
//! - Applying a patch never moves `updated_at` backwards.
//! - Cross-entity references (`Task::list_id`, `Task::label_ids`) are plain ids.

pub mod entity;
pub mod form;
pub mod label;
pub mod list;
pub mod task;

use crate::error::{StoreError, StoreResult};
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_NAME_CHARS: usize = 200;

static HEX_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("valid hex color regex"));

/// Trims a required display name and rejects blank or oversized values.
pub(crate) fn normalize_name(field: &'static str, value: &str) -> StoreResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::invalid(field, "must not be empty"));
    }
    if trimmed.chars().count() > MAX_NAME_CHARS {
        return Err(StoreError::invalid(
            field,
            format!("must be at most {MAX_NAME_CHARS} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Normalizes `#RRGGBB` colors to lowercase.
pub(crate) fn normalize_color(field: &'static str, value: &str) -> StoreResult<String> {
    let trimmed = value.trim();
    if !HEX_COLOR_RE.is_match(trimmed) {
        return Err(StoreError::invalid(
            field,
            format!("expected `#rrggbb`, got `{trimmed}`"),
        ));
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// Blank optional text collapses to `None`.
pub(crate) fn normalize_optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

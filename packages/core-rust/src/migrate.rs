//! Rewrites stored responses so they fit a new schema version.
//!
//! Migration is a pure function of `(response, diff)`. Distinct responses
//! are independent, so a batch job may migrate them in any order or in
//! parallel, and may replay a migration without side effects.

use crate::diff::{FormVersionDiff, MappingPolicy};
use crate::types::{Response, Value};

/// Migrates one stored response across `diff`.
///
/// 1. Every mapped key present in `response` is copied to its new id.
/// 2. Every added field missing from the output is backfilled with its
///    default, or [`Value::Null`] when it has none.
/// 3. Under [`MappingPolicy::DropUnmapped`], nothing else is carried over.
#[must_use]
pub fn migrate_response(response: &Response, diff: &FormVersionDiff) -> Response {
    let mut migrated = Response::new();

    match diff.mapping_policy {
        MappingPolicy::DropUnmapped => {
            for (old_id, new_id) in diff.field_mappings.iter() {
                if let Some(value) = response.get(old_id.as_str()) {
                    migrated.insert(new_id.to_string(), value.clone());
                }
            }
        }
    }

    for field in &diff.added_fields {
        migrated
            .entry(field.id.to_string())
            .or_insert_with(|| field.default_value.clone().unwrap_or(Value::Null));
    }

    migrated
}

/// Migrates every response in `responses` across the same diff.
pub fn migrate_batch<'a, I>(responses: I, diff: &FormVersionDiff) -> Vec<Response>
where
    I: IntoIterator<Item = &'a Response>,
{
    responses
        .into_iter()
        .map(|r| migrate_response(r, diff))
        .collect()
}

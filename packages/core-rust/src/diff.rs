//! Structural diff between two field lists.
//!
//! [`diff`] indexes both lists by id and sorts fields into added, removed,
//! and modified buckets, then classifies the change:
//!
//! - **MAJOR** if any field was removed, renamed, or changed type
//! - **MINOR** if fields were added or non-type attributes changed
//! - **PATCH** otherwise
//!
//! Every id present on both sides gets an identity entry in
//! [`FormVersionDiff::field_mappings`]; explicit renames get an
//! `old -> new` entry. Anything left unmapped is dropped when responses are
//! migrated (see [`MappingPolicy`]).

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::field::{FieldDefinition, FieldId};
use crate::version::ChangeClass;

/// How response keys without a mapping entry are treated during migration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingPolicy {
    /// Keys absent from the mapping are not carried into the migrated
    /// response.
    #[default]
    DropUnmapped,
}

/// Old field id -> new field id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMappings(BTreeMap<FieldId, FieldId>);

impl FieldMappings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps each id to itself.
    pub fn identity<'a>(ids: impl IntoIterator<Item = &'a FieldId>) -> Self {
        ids.into_iter().map(|id| (id.clone(), id.clone())).collect()
    }

    /// Records that data stored under `old` moves to `new`.
    pub fn insert(&mut self, old: impl Into<FieldId>, new: impl Into<FieldId>) {
        self.0.insert(old.into(), new.into());
    }

    #[must_use]
    pub fn get(&self, old: &FieldId) -> Option<&FieldId> {
        self.0.get(old)
    }

    #[must_use]
    pub fn contains_old(&self, old: &FieldId) -> bool {
        self.0.contains_key(old)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldId, &FieldId)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<O: Into<FieldId>, N: Into<FieldId>> FromIterator<(O, N)> for FieldMappings {
    fn from_iter<I: IntoIterator<Item = (O, N)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(o, n)| (o.into(), n.into()))
                .collect(),
        )
    }
}

/// An explicit caller-supplied rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRename {
    pub from: FieldId,
    pub to: FieldId,
}

impl FieldRename {
    pub fn new(from: impl Into<FieldId>, to: impl Into<FieldId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Result of comparing two field lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormVersionDiff {
    pub change_class: ChangeClass,
    /// Present only on the new side, in new-list order.
    pub added_fields: Vec<FieldDefinition>,
    /// Present only on the old side, in old-list order.
    pub removed_fields: Vec<FieldDefinition>,
    /// New-side definitions of fields that exist on both sides but differ.
    pub modified_fields: Vec<FieldDefinition>,
    pub field_mappings: FieldMappings,
    pub mapping_policy: MappingPolicy,
    /// Renames that matched a field on each side.
    #[serde(default)]
    pub renamed_fields: Vec<FieldRename>,
    /// New-side ids of modified fields whose type changed.
    #[serde(default)]
    pub type_changed: Vec<FieldId>,
}

impl FormVersionDiff {
    /// A diff that only moves data according to `mappings`.
    #[must_use]
    pub fn from_mappings(mappings: FieldMappings) -> Self {
        Self {
            field_mappings: mappings,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_type_changes(&self) -> bool {
        !self.type_changed.is_empty()
    }

    /// `true` when neither side differs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added_fields.is_empty()
            && self.removed_fields.is_empty()
            && self.modified_fields.is_empty()
            && self.renamed_fields.is_empty()
    }
}

/// Whether two definitions of the same field differ in a way that matters
/// to a schema version: type, required flag, label, or validation rules.
///
/// Option lists and default values are ignored.
#[must_use]
pub fn fields_differ(old: &FieldDefinition, new: &FieldDefinition) -> bool {
    old.field_type() != new.field_type()
        || old.required != new.required
        || old.label != new.label
        || old.validation != new.validation
}

/// Compares two field lists by id.
#[must_use]
pub fn diff(old_fields: &[FieldDefinition], new_fields: &[FieldDefinition]) -> FormVersionDiff {
    diff_with_renames(old_fields, new_fields, &[])
}

/// Compares two field lists, pairing explicitly renamed fields.
///
/// A rename is honored only when `from` exists solely on the old side and
/// `to` solely on the new side; any other rename is ignored with a warning
/// and the fields fall back to plain add/remove handling.
#[must_use]
pub fn diff_with_renames(
    old_fields: &[FieldDefinition],
    new_fields: &[FieldDefinition],
    renames: &[FieldRename],
) -> FormVersionDiff {
    let old_by_id: HashMap<&FieldId, &FieldDefinition> =
        old_fields.iter().map(|f| (&f.id, f)).collect();
    let new_by_id: HashMap<&FieldId, &FieldDefinition> =
        new_fields.iter().map(|f| (&f.id, f)).collect();

    // new id -> old id, for renames that pair up cleanly
    let mut rename_sources: HashMap<&FieldId, &FieldId> = HashMap::new();
    let mut renamed_old: HashSet<&FieldId> = HashSet::new();
    let mut renamed_fields = Vec::new();
    for rename in renames {
        let valid = old_by_id.contains_key(&rename.from)
            && !new_by_id.contains_key(&rename.from)
            && new_by_id.contains_key(&rename.to)
            && !old_by_id.contains_key(&rename.to)
            && !renamed_old.contains(&rename.from)
            && !rename_sources.contains_key(&rename.to);
        if !valid {
            tracing::warn!(from = %rename.from, to = %rename.to, "ignoring unmatched field rename");
            continue;
        }
        rename_sources.insert(&rename.to, &rename.from);
        renamed_old.insert(&rename.from);
        renamed_fields.push(rename.clone());
    }

    let removed_fields: Vec<FieldDefinition> = old_fields
        .iter()
        .filter(|f| !new_by_id.contains_key(&f.id) && !renamed_old.contains(&f.id))
        .cloned()
        .collect();

    let mut added_fields = Vec::new();
    let mut modified_fields = Vec::new();
    let mut type_changed = Vec::new();
    let mut field_mappings = FieldMappings::new();

    for new in new_fields {
        let counterpart = match old_by_id.get(&new.id) {
            Some(old) => Some(*old),
            None => rename_sources
                .get(&new.id)
                .and_then(|from| old_by_id.get(*from).copied()),
        };

        let Some(old) = counterpart else {
            added_fields.push(new.clone());
            continue;
        };

        field_mappings.insert(old.id.clone(), new.id.clone());
        if fields_differ(old, new) {
            if old.field_type() != new.field_type() {
                type_changed.push(new.id.clone());
            }
            modified_fields.push(new.clone());
        }
    }

    let change_class = if !removed_fields.is_empty()
        || !renamed_fields.is_empty()
        || !type_changed.is_empty()
    {
        ChangeClass::Major
    } else if !added_fields.is_empty() || !modified_fields.is_empty() {
        ChangeClass::Minor
    } else {
        ChangeClass::Patch
    };

    tracing::debug!(
        %change_class,
        added = added_fields.len(),
        removed = removed_fields.len(),
        modified = modified_fields.len(),
        renamed = renamed_fields.len(),
        "computed field diff"
    );

    FormVersionDiff {
        change_class,
        added_fields,
        removed_fields,
        modified_fields,
        field_mappings,
        mapping_policy: MappingPolicy::DropUnmapped,
        renamed_fields,
        type_changed,
    }
}

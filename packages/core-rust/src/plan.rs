//! Advisory migration plans.
//!
//! A plan says whether a version transition is backward compatible, whether
//! stored responses must be rewritten, and which risks a caller has to
//! surface before publishing. It never blocks a transition.

use serde::{Deserialize, Serialize};

use crate::diff::{diff, FormVersionDiff};
use crate::schema::FormSchema;
use crate::version::ChangeClass;

pub const WARN_BREAKING: &str = "This migration contains breaking changes";
pub const WARN_REQUIRED_WITHOUT_DEFAULT: &str = "New required fields may cause validation failures";

/// Risk report for moving a form from one schema version to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationPlan {
    pub from_version: String,
    pub to_version: String,
    pub backward_compatible: bool,
    pub data_migration_required: bool,
    /// Plain-text warnings, meant to be shown verbatim.
    pub warnings: Vec<String>,
    pub diff: FormVersionDiff,
}

/// Plans the transition between two materialized schemas.
#[must_use]
pub fn plan(from: &FormSchema, to: &FormSchema) -> MigrationPlan {
    plan_from_diff(
        from.version.clone(),
        to.version.clone(),
        diff(&from.fields, &to.fields),
    )
}

/// Builds a plan around an already computed diff.
#[must_use]
pub fn plan_from_diff(
    from_version: String,
    to_version: String,
    diff: FormVersionDiff,
) -> MigrationPlan {
    let breaking = diff.change_class == ChangeClass::Major;
    let required_without_default = diff
        .added_fields
        .iter()
        .any(|f| f.required && f.default_value.is_none());

    // Validation-only edits leave the data shape alone.
    let data_migration_required = !diff.removed_fields.is_empty()
        || required_without_default
        || diff.has_type_changes()
        || !diff.renamed_fields.is_empty();

    let mut warnings = Vec::new();
    if breaking {
        warnings.push(WARN_BREAKING.to_string());
    }
    if !diff.removed_fields.is_empty() {
        warnings.push(format!(
            "Data for {} fields will be lost",
            diff.removed_fields.len()
        ));
    }
    if required_without_default {
        warnings.push(WARN_REQUIRED_WITHOUT_DEFAULT.to_string());
    }

    tracing::debug!(
        from = %from_version,
        to = %to_version,
        backward_compatible = !breaking,
        data_migration_required,
        warnings = warnings.len(),
        "built migration plan"
    );

    MigrationPlan {
        from_version,
        to_version,
        backward_compatible: !breaking,
        data_migration_required,
        warnings,
        diff,
    }
}

//! `formver` Core — field diffing, semantic versioning, migration planning,
//! and response migration for versioned form schemas.
//!
//! Everything in this crate is pure: no I/O, no shared state. Persistence
//! and orchestration live in `formver-server`.

pub mod diff;
pub mod field;
pub mod migrate;
pub mod plan;
pub mod schema;
pub mod types;
pub mod validate;
pub mod version;

pub use diff::{
    diff, diff_with_renames, fields_differ, FieldMappings, FieldRename, FormVersionDiff,
    MappingPolicy,
};
pub use field::{ChoiceOption, FieldDefinition, FieldId, FieldKind, FieldType, ValidationRules};
pub use migrate::{migrate_batch, migrate_response};
pub use plan::{plan, plan_from_diff, MigrationPlan};
pub use schema::{FormSchema, SchemaId, ValidationResult};
pub use types::{Response, Value};
pub use validate::validate_response;
pub use version::{increment, ChangeClass, SemVer, VersionParseError, FALLBACK_VERSION};

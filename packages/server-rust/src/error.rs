use formver_core::SchemaId;

/// Errors returned by [`SchemaVersionManager`](crate::SchemaVersionManager).
#[derive(Debug, thiserror::Error)]
pub enum VersioningError {
    /// No schema version with this id exists. Not retryable.
    #[error("schema not found: {schema_id}")]
    SchemaNotFound { schema_id: SchemaId },
    /// Another writer already published this version of the form.
    #[error("version {version} of form {name:?} already exists")]
    VersionConflict { name: String, version: String },
    /// The parent version is no longer the form's current version. Retrying
    /// from the current version may succeed.
    #[error("form {name:?} has moved past the parent version")]
    StaleParent {
        name: String,
        /// The version the write was derived from; `None` for a first version.
        parent: Option<SchemaId>,
        /// The form's current version at the time of the check.
        current: Option<SchemaId>,
    },
    /// The store failed; the transaction was rolled back.
    #[error("persistence failure: {0}")]
    Persistence(#[from] anyhow::Error),
}

/// Raised by a [`SchemaStore`](crate::SchemaStore) on commit when
/// `(name, version)` is already taken.
///
/// Travels inside `anyhow::Error`; the manager downcasts it into
/// [`VersioningError::VersionConflict`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("version {version} of form {name:?} already exists")]
pub struct DuplicateVersion {
    pub name: String,
    pub version: String,
}

impl From<DuplicateVersion> for VersioningError {
    fn from(e: DuplicateVersion) -> Self {
        VersioningError::VersionConflict {
            name: e.name,
            version: e.version,
        }
    }
}

/// Raised by a [`SchemaStore`](crate::SchemaStore) on commit when a staged
/// version's `parent_id` is not the current version of its form.
///
/// A first version (no parent) is only accepted for a form with no versions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("form {name:?} has moved past the parent version")]
pub struct StaleParent {
    pub name: String,
    pub parent: Option<SchemaId>,
    pub current: Option<SchemaId>,
}

impl From<StaleParent> for VersioningError {
    fn from(e: StaleParent) -> Self {
        VersioningError::StaleParent {
            name: e.name,
            parent: e.parent,
            current: e.current,
        }
    }
}

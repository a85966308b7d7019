use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::field::FieldDefinition;
use crate::version::FALLBACK_VERSION;

/// Identifier of one schema version (not of the logical form).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaId(String);

impl SchemaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random (v4 UUID) id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SchemaId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An immutable, versioned snapshot of a form's fields.
///
/// Every edit produces a new `FormSchema` with a new `id` and a bumped
/// `version`; all versions of one form share `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSchema {
    pub id: SchemaId,
    /// Logical form name, shared across versions.
    pub name: String,
    /// `MAJOR.MINOR.PATCH`. Kept as the stored string so legacy or corrupted
    /// values survive a round trip untouched.
    pub version: String,
    pub fields: Vec<FieldDefinition>,
    /// Opaque to this crate.
    #[serde(default)]
    pub validation_rules: serde_json::Value,
    /// Opaque to this crate.
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_by: String,
    /// The version this one was derived from; `None` for the first version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<SchemaId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_description: Option<String>,
    /// Wall-clock millis since epoch.
    #[serde(default)]
    pub created_at_ms: u64,
}

impl FormSchema {
    /// First version (`1.0.0`) of a new form.
    pub fn initial(
        name: impl Into<String>,
        fields: Vec<FieldDefinition>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: SchemaId::generate(),
            name: name.into(),
            version: FALLBACK_VERSION.to_string(),
            fields,
            validation_rules: serde_json::Value::Null,
            metadata: serde_json::Value::Null,
            created_by: created_by.into(),
            parent_id: None,
            change_description: None,
            created_at_ms: now_millis(),
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Builds the version that follows `self`.
    ///
    /// Gets a fresh id and carries forward the name, author, and opaque
    /// payloads.
    #[must_use]
    pub fn successor(
        &self,
        version: String,
        fields: Vec<FieldDefinition>,
        change_description: Option<String>,
    ) -> Self {
        Self {
            id: SchemaId::generate(),
            name: self.name.clone(),
            version,
            fields,
            validation_rules: self.validation_rules.clone(),
            metadata: self.metadata.clone(),
            created_by: self.created_by.clone(),
            parent_id: Some(self.id.clone()),
            change_description,
            created_at_ms: now_millis(),
        }
    }
}

/// Result of validating a response against a schema's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// The response conforms to the schema.
    Valid,
    /// The response violates one or more field constraints.
    Invalid {
        /// Human-readable descriptions of each validation failure.
        errors: Vec<String>,
    },
}

impl ValidationResult {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

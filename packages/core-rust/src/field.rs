//! Field definitions: the unit a form schema is built from.
//!
//! A field's kind is a closed enum ([`FieldKind`]) carrying only the config
//! that kind needs. Type-change detection compares [`FieldType`] tags, so
//! editing a select's options is never mistaken for a type change.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// Stable identifier of a field, unique within one schema version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(String);

impl FieldId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for FieldId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Discriminant of a [`FieldKind`], without its config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Textarea,
    Email,
    Url,
    Phone,
    Number,
    Date,
    Checkbox,
    Select,
    MultiSelect,
    Radio,
    File,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Text => "text",
            FieldType::Textarea => "textarea",
            FieldType::Email => "email",
            FieldType::Url => "url",
            FieldType::Phone => "phone",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Checkbox => "checkbox",
            FieldType::Select => "select",
            FieldType::MultiSelect => "multi_select",
            FieldType::Radio => "radio",
            FieldType::File => "file",
        };
        f.write_str(name)
    }
}

/// One selectable entry of a choice field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// Value stored in responses.
    pub value: String,
    /// Display label.
    pub label: String,
}

impl ChoiceOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// The kind of a field together with its kind-specific config.
///
/// Serialized internally tagged on `"type"`, so a field's JSON reads
/// `{"type": "select", "options": [...], ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Textarea,
    Email,
    Url,
    Phone,
    Number,
    Date,
    Checkbox,
    Select { options: Vec<ChoiceOption> },
    MultiSelect { options: Vec<ChoiceOption> },
    Radio { options: Vec<ChoiceOption> },
    File,
}

impl FieldKind {
    /// The kind's discriminant.
    #[must_use]
    pub fn tag(&self) -> FieldType {
        match self {
            FieldKind::Text => FieldType::Text,
            FieldKind::Textarea => FieldType::Textarea,
            FieldKind::Email => FieldType::Email,
            FieldKind::Url => FieldType::Url,
            FieldKind::Phone => FieldType::Phone,
            FieldKind::Number => FieldType::Number,
            FieldKind::Date => FieldType::Date,
            FieldKind::Checkbox => FieldType::Checkbox,
            FieldKind::Select { .. } => FieldType::Select,
            FieldKind::MultiSelect { .. } => FieldType::MultiSelect,
            FieldKind::Radio { .. } => FieldType::Radio,
            FieldKind::File => FieldType::File,
        }
    }

    /// Selectable options for choice kinds, `None` otherwise.
    #[must_use]
    pub fn options(&self) -> Option<&[ChoiceOption]> {
        match self {
            FieldKind::Select { options }
            | FieldKind::MultiSelect { options }
            | FieldKind::Radio { options } => Some(options),
            _ => None,
        }
    }
}

/// Structured validation rules attached to a field.
///
/// Compared structurally: every container is ordered, so two rule sets that
/// differ only in the order their custom parameters were written compare
/// equal. Numeric bounds compare with [`f64::total_cmp`], so a rule set
/// always equals its own clone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Regular expression a string value must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Accepted types for file fields: MIME types (`"application/pdf"`,
    /// `"image/*"`) or file extensions (`".pdf"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_types: Option<Vec<String>>,
    /// Identifier of a custom rule evaluated outside this crate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_rule: Option<String>,
    /// Parameters for the custom rule.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl PartialEq for ValidationRules {
    fn eq(&self, other: &Self) -> bool {
        self.min_length == other.min_length
            && self.max_length == other.max_length
            && self.pattern == other.pattern
            && same_bound(self.min, other.min)
            && same_bound(self.max, other.max)
            && self.allowed_types == other.allowed_types
            && self.custom_rule == other.custom_rule
            && self.extra == other.extra
    }
}

fn same_bound(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b).is_eq(),
        (None, None) => true,
        _ => false,
    }
}

/// One form field's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub id: FieldId,
    #[serde(flatten)]
    pub kind: FieldKind,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRules>,
    /// Used to backfill responses when the field is newly introduced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl FieldDefinition {
    /// Creates an optional field with no validation and no default.
    pub fn new(id: impl Into<FieldId>, kind: FieldKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            required: false,
            validation: None,
            default_value: None,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn with_validation(mut self, rules: ValidationRules) -> Self {
        self.validation = Some(rules);
        self
    }

    /// Shorthand for the field's kind tag.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        self.kind.tag()
    }
}

//! Checks a response against a field list.
//!
//! Used to dry-run a migration: migrate every stored response, then
//! validate the results against the target schema before publishing.

use regex::Regex;

use crate::field::{FieldDefinition, FieldKind, ValidationRules};
use crate::schema::ValidationResult;
use crate::types::{Response, Value};

/// Validates `response` against `fields`.
///
/// Keys in the response that have no field are ignored. A `null` or
/// missing value fails only when the field is required. `custom_rule` names
/// a check owned by the caller and is not evaluated here.
#[must_use]
pub fn validate_response(fields: &[FieldDefinition], response: &Response) -> ValidationResult {
    let mut errors = Vec::new();

    for field in fields {
        match response.get(field.id.as_str()) {
            None | Some(Value::Null) => {
                if field.required {
                    errors.push(format!("{}: required field is missing", field.id));
                }
            }
            Some(value) => check_field(field, value, &mut errors),
        }
    }

    if errors.is_empty() {
        ValidationResult::Valid
    } else {
        ValidationResult::Invalid { errors }
    }
}

fn check_field(field: &FieldDefinition, value: &Value, errors: &mut Vec<String>) {
    let id = &field.id;

    let type_ok = match &field.kind {
        FieldKind::Text
        | FieldKind::Textarea
        | FieldKind::Email
        | FieldKind::Url
        | FieldKind::Phone
        | FieldKind::Date => matches!(value, Value::String(_)),
        FieldKind::File => matches!(value, Value::String(_) | Value::Map(_)),
        FieldKind::Number => matches!(value, Value::Int(_) | Value::Float(_)),
        FieldKind::Checkbox => matches!(value, Value::Bool(_)),
        FieldKind::Select { .. } | FieldKind::Radio { .. } => matches!(value, Value::String(_)),
        FieldKind::MultiSelect { .. } => match value {
            Value::Array(items) => items.iter().all(|v| matches!(v, Value::String(_))),
            _ => false,
        },
    };
    if !type_ok {
        errors.push(format!(
            "{id}: {} value is not valid for a {} field",
            value.kind_name(),
            field.field_type()
        ));
        return;
    }

    if let Some(options) = field.kind.options() {
        let allowed = |s: &str| options.iter().any(|o| o.value == s);
        let chosen: Vec<&str> = match value {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        for choice in chosen.into_iter().filter(|c| !allowed(*c)) {
            errors.push(format!("{id}: {choice:?} is not one of the field's options"));
        }
    }

    if let Some(rules) = &field.validation {
        if let (FieldKind::File, Some(allowed)) = (&field.kind, &rules.allowed_types) {
            if !file_type_allowed(value, allowed) {
                errors.push(format!("{id}: file type is not allowed"));
            }
        }
        check_rules(field.id.as_str(), rules, value, errors);
    }
}

/// A file value is the stored file name, or a map with `name` and `type`
/// (MIME) entries. Extension entries match the name, MIME entries match the
/// type, and `major/*` matches any subtype.
fn file_type_allowed(value: &Value, allowed: &[String]) -> bool {
    let (name, mime) = match value {
        Value::String(name) => (Some(name.as_str()), None),
        Value::Map(entries) => (
            entries.get("name").and_then(Value::as_str),
            entries.get("type").and_then(Value::as_str),
        ),
        _ => (None, None),
    };

    allowed.iter().any(|entry| {
        if entry.starts_with('.') {
            name.is_some_and(|n| {
                n.to_ascii_lowercase()
                    .ends_with(&entry.to_ascii_lowercase())
            })
        } else if let Some(major) = entry.strip_suffix("/*") {
            mime.and_then(|m| m.split_once('/'))
                .is_some_and(|(m, _)| m.eq_ignore_ascii_case(major))
        } else {
            mime.is_some_and(|m| m.eq_ignore_ascii_case(entry))
        }
    })
}

fn check_rules(id: &str, rules: &ValidationRules, value: &Value, errors: &mut Vec<String>) {
    if let Some(s) = value.as_str() {
        let len = s.chars().count();
        if let Some(min) = rules.min_length {
            if len < min {
                errors.push(format!("{id}: shorter than {min} characters"));
            }
        }
        if let Some(max) = rules.max_length {
            if len > max {
                errors.push(format!("{id}: longer than {max} characters"));
            }
        }
        if let Some(pattern) = &rules.pattern {
            match Regex::new(pattern) {
                Ok(re) if !re.is_match(s) => {
                    errors.push(format!("{id}: does not match pattern {pattern:?}"));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(field = id, %pattern, error = %e, "invalid validation pattern");
                    errors.push(format!("{id}: validation pattern is invalid"));
                }
            }
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = rules.min {
            if n < min {
                errors.push(format!("{id}: below minimum {min}"));
            }
        }
        if let Some(max) = rules.max {
            if n > max {
                errors.push(format!("{id}: above maximum {max}"));
            }
        }
    }
}

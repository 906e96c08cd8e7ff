//! Payload validation against a resource declaration

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;

use super::registry::{FieldKind, FieldSchema, ResourceSchema};
use crate::utils::errors::{Issues, MemberHubError, Result};

/// Kind of write a payload is validated for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Insert,
    Patch,
    Replace,
}

const META_FIELDS: &[&str] = &["id", "_created", "_updated", "_etag"];

/// Field patterns, compiled on first use
static PATTERNS: OnceLock<RwLock<HashMap<&'static str, Regex>>> = OnceLock::new();

fn compiled(pattern: &'static str) -> std::result::Result<Regex, String> {
    let patterns = PATTERNS.get_or_init(Default::default);

    if let Some(regex) = patterns.read().ok().and_then(|p| p.get(pattern).cloned()) {
        return Ok(regex);
    }
    let regex = Regex::new(pattern).map_err(|e| format!("invalid pattern: {}", e))?;
    if let Ok(mut patterns) = patterns.write() {
        patterns.insert(pattern, regex.clone());
    }
    Ok(regex)
}

/// Validate a JSON payload for a write on `schema`.
///
/// `original` is the stored document for patches; dependencies may be
/// satisfied by it. Every problem found is reported, not just the first.
pub fn validate(schema: &ResourceSchema, payload: &Value, mode: Mode, original: Option<&Value>) -> Result<()> {
    let mut issues = Issues::new();

    let document = match payload.as_object() {
        Some(document) => document,
        None => return Err(MemberHubError::issue("payload", "must be a JSON object")),
    };

    for (key, value) in document {
        let field = match schema.field_schema(key) {
            Some(field) => field,
            None if META_FIELDS.contains(&key.as_str()) => {
                issues.insert(key.clone(), "field is read-only".to_string());
                continue;
            }
            None => {
                issues.insert(key.clone(), "unknown field".to_string());
                continue;
            }
        };

        if field.readonly {
            issues.insert(key.clone(), "field is read-only".to_string());
            continue;
        }

        if mode == Mode::Patch && field.not_patchable {
            issues.insert(key.clone(), "field is not patchable".to_string());
            continue;
        }

        if value.is_null() {
            if !field.nullable {
                issues.insert(key.clone(), "null value not allowed".to_string());
            }
            continue;
        }

        if let Err(message) = check_field(field, value) {
            issues.insert(key.clone(), message);
            continue;
        }

        let missing: Vec<&str> = field
            .dependencies
            .iter()
            .copied()
            .filter(|dep| !is_present(document.get(*dep)) && !is_present(original.and_then(|o| o.get(*dep))))
            .collect();
        if !missing.is_empty() {
            issues.insert(key.clone(), format!("field '{}' is required", missing.join("', '")));
        }
    }

    if mode != Mode::Patch {
        for field in schema.schema.iter().filter(|f| f.required && !f.readonly) {
            if !document.contains_key(field.name) {
                issues.insert(field.name.to_string(), "required field".to_string());
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(MemberHubError::Validation(issues))
    }
}

fn is_present(value: Option<&Value>) -> bool {
    matches!(value, Some(v) if !v.is_null())
}

fn check_field(field: &FieldSchema, value: &Value) -> std::result::Result<(), String> {
    check_type(field.kind, value)?;

    if let Some(allowed) = &field.allowed {
        let text = value.as_str().unwrap_or_default();
        if !allowed.contains(&text) {
            return Err(format!("unallowed value {}", value));
        }
    }

    if let Some(text) = value.as_str() {
        if let Some(max) = field.max_length {
            if text.chars().count() > max {
                return Err(format!("max length is {}", max));
            }
        }
        if let Some(pattern) = field.regex {
            if !compiled(pattern)?.is_match(text) {
                return Err(format!("value does not match regex '{}'", pattern));
            }
        }
    }

    if let Some(min) = field.min {
        if numeric_value(value).map_or(false, |n| n < min) {
            return Err(format!("min value is {}", min));
        }
    }

    Ok(())
}

fn check_type(kind: FieldKind, value: &Value) -> std::result::Result<(), String> {
    let ok = match kind {
        FieldKind::String | FieldKind::Email => value.is_string(),
        FieldKind::Integer => value.is_i64(),
        FieldKind::Boolean => value.is_boolean(),
        FieldKind::Datetime => value
            .as_str()
            .map_or(false, |s| DateTime::parse_from_rfc3339(s).is_ok()),
        FieldKind::Date => value
            .as_str()
            .map_or(false, |s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
        FieldKind::Decimal => value.is_number() || value.as_str().map_or(false, |s| s.parse::<Decimal>().is_ok()),
        FieldKind::Json => true,
        FieldKind::Uuid => value.as_str().map_or(false, |s| uuid::Uuid::parse_str(s).is_ok()),
        FieldKind::IntegerList => value
            .as_array()
            .map_or(false, |items| items.iter().all(Value::is_i64)),
    };

    if ok {
        Ok(())
    } else {
        Err(match kind {
            FieldKind::Datetime => "must be a datetime like 2024-05-01T18:00:00Z".to_string(),
            FieldKind::Date => "must be a date like 1995-03-21".to_string(),
            FieldKind::IntegerList => "must be a list of integers".to_string(),
            other => format!("must be of {} type", type_name(other)),
        })
    }
}

fn type_name(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::String | FieldKind::Email => "string",
        FieldKind::Integer => "integer",
        FieldKind::Boolean => "boolean",
        FieldKind::Decimal => "number",
        FieldKind::Uuid => "uuid",
        FieldKind::Datetime => "datetime",
        FieldKind::Date => "date",
        FieldKind::Json => "json",
        FieldKind::IntegerList => "list",
    }
}

fn numeric_value(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse::<f64>().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::registry::lookup;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_patterns_compile_once() {
        let first = compiled(r"^\d{6}$").unwrap();
        let second = compiled(r"^\d{6}$").unwrap();
        assert_eq!(first.as_str(), second.as_str());
        assert!(second.is_match("123456"));
        assert!(compiled("(unclosed").is_err());

        let cached = PATTERNS.get().unwrap().read().unwrap();
        assert!(cached.contains_key(r"^\d{6}$"));
        assert!(!cached.contains_key("(unclosed"));
    }

    fn issues_of(result: Result<()>) -> Issues {
        match result {
            Err(MemberHubError::Validation(issues)) => issues,
            other => panic!("expected validation issues, got {:?}", other),
        }
    }

    fn valid_user() -> Value {
        json!({
            "username": "kim",
            "firstname": "Kim",
            "lastname": "Muster",
            "gender": "female",
            "email": "kim@example.org"
        })
    }

    #[test]
    fn test_accepts_valid_user() {
        let users = lookup("users").unwrap();
        assert!(validate(users, &valid_user(), Mode::Insert, None).is_ok());
    }

    #[test]
    fn test_missing_required_fields() {
        let users = lookup("users").unwrap();
        let issues = issues_of(validate(users, &json!({"username": "kim"}), Mode::Insert, None));
        assert_eq!(issues.len(), 4);
        assert_eq!(issues["email"], "required field");
        assert_eq!(issues["gender"], "required field");
    }

    #[test]
    fn test_patch_does_not_require_fields() {
        let users = lookup("users").unwrap();
        assert!(validate(users, &json!({"phone": "0441234567"}), Mode::Patch, None).is_ok());
    }

    #[test]
    fn test_regex_and_allowed() {
        let users = lookup("users").unwrap();
        let mut user = valid_user();
        user["email"] = json!("not-an-email");
        user["gender"] = json!("robot");
        user["legi"] = json!("12ab5678");
        let issues = issues_of(validate(users, &user, Mode::Insert, None));
        assert!(issues["email"].contains("regex"));
        assert!(issues["gender"].starts_with("unallowed value"));
        assert!(issues["legi"].contains("regex"));
    }

    #[test]
    fn test_unknown_and_readonly_fields() {
        let events = lookup("events").unwrap();
        let issues = issues_of(validate(
            events,
            &json!({"title": "Party", "title_id": "0d7a1ad4-64a4-4c3c-9d8b-1f5a3b1f0b8e", "colour": "red", "_etag": "x"}),
            Mode::Insert,
            None,
        ));
        assert_eq!(issues["title_id"], "field is read-only");
        assert_eq!(issues["_etag"], "field is read-only");
        assert_eq!(issues["colour"], "unknown field");
        assert!(!issues.contains_key("title"));
    }

    #[test]
    fn test_dependencies() {
        let events = lookup("events").unwrap();
        let issues = issues_of(validate(
            events,
            &json!({"time_end": "2024-05-01T22:00:00Z"}),
            Mode::Insert,
            None,
        ));
        assert_eq!(issues["time_end"], "field 'time_start' is required");

        let original = json!({"time_start": "2024-05-01T18:00:00Z"});
        assert!(validate(events, &json!({"time_end": "2024-05-01T22:00:00Z"}), Mode::Patch, Some(&original)).is_ok());
    }

    #[test]
    fn test_not_patchable() {
        let signups = lookup("eventsignups").unwrap();
        let issues = issues_of(validate(signups, &json!({"event_id": 2}), Mode::Patch, None));
        assert_eq!(issues["event_id"], "field is not patchable");
        assert!(validate(signups, &json!({"extra_data": {"diet": "vegi"}}), Mode::Patch, None).is_ok());
    }

    #[test]
    fn test_types_and_min() {
        let events = lookup("events").unwrap();
        let issues = issues_of(validate(
            events,
            &json!({"price": -3, "spots": "many", "time_start": "tomorrow", "is_public": "yes"}),
            Mode::Insert,
            None,
        ));
        assert_eq!(issues["price"], "min value is 0");
        assert_eq!(issues["spots"], "must be of integer type");
        assert!(issues["time_start"].starts_with("must be a datetime"));
        assert_eq!(issues["is_public"], "must be of boolean type");
    }

    #[test]
    fn test_decimal_accepts_strings() {
        let events = lookup("events").unwrap();
        assert!(validate(events, &json!({"price": "12.50"}), Mode::Insert, None).is_ok());
        assert!(validate(events, &json!({"price": 12.5}), Mode::Insert, None).is_ok());
    }

    #[test]
    fn test_null_on_required_field() {
        let users = lookup("users").unwrap();
        let issues = issues_of(validate(users, &json!({"email": null}), Mode::Patch, None));
        assert_eq!(issues["email"], "null value not allowed");
    }

    #[test]
    fn test_non_object_payload() {
        let users = lookup("users").unwrap();
        assert_matches!(
            validate(users, &json!([1, 2]), Mode::Insert, None),
            Err(MemberHubError::Validation(_))
        );
    }
}

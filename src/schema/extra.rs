//! Event-defined signup fields
//!
//! An event may declare `additional_fields`, an object mapping a field name
//! to its rules, e.g. `{"diet": {"type": "string", "allowed": ["vegi", "meat"],
//! "required": true}}`. Signups for the event must then carry `extra_data`
//! that satisfies these rules.

use regex::Regex;
use serde_json::{Map, Value};

use crate::utils::errors::Issues;

/// Value types an extra field accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraFieldKind {
    String,
    Integer,
    Number,
    Boolean,
}

/// A single event-defined field
#[derive(Debug, Clone)]
pub struct ExtraField {
    pub name: String,
    pub kind: ExtraFieldKind,
    pub required: bool,
    pub allowed: Option<Vec<Value>>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub max_length: Option<usize>,
    pub regex: Option<Regex>,
}

const KNOWN_RULES: &[&str] = &["type", "required", "allowed", "min", "max", "maxlength", "regex"];

/// Parse and check an `additional_fields` declaration.
///
/// Older clients send the declaration as a JSON encoded string, which is
/// accepted as well.
pub fn parse_extra_schema(value: &Value) -> std::result::Result<Vec<ExtraField>, String> {
    let parsed;
    let value = match value {
        Value::String(raw) => {
            parsed = serde_json::from_str::<Value>(raw).map_err(|e| format!("invalid JSON: {}", e))?;
            &parsed
        }
        other => other,
    };

    let fields = value
        .as_object()
        .ok_or_else(|| "must be an object mapping field names to rules".to_string())?;

    fields
        .iter()
        .map(|(name, rules)| parse_field(name, rules))
        .collect()
}

fn parse_field(name: &str, rules: &Value) -> std::result::Result<ExtraField, String> {
    let rules = rules
        .as_object()
        .ok_or_else(|| format!("rules of '{}' must be an object", name))?;

    if let Some(unknown) = rules.keys().find(|k| !KNOWN_RULES.contains(&k.as_str())) {
        return Err(format!("unknown rule '{}' for '{}'", unknown, name));
    }

    let kind = match rules.get("type").and_then(Value::as_str) {
        Some("string") => ExtraFieldKind::String,
        Some("integer") => ExtraFieldKind::Integer,
        Some("number") => ExtraFieldKind::Number,
        Some("boolean") => ExtraFieldKind::Boolean,
        Some(other) => return Err(format!("unknown type '{}' for '{}'", other, name)),
        None => return Err(format!("'{}' needs a type", name)),
    };

    let required = match rules.get("required") {
        None => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(format!("'required' of '{}' must be a boolean", name)),
    };

    let allowed = match rules.get("allowed") {
        None => None,
        Some(Value::Array(values)) => Some(values.clone()),
        Some(_) => return Err(format!("'allowed' of '{}' must be a list", name)),
    };

    let number = |rule: &str| -> std::result::Result<Option<f64>, String> {
        match rules.get(rule) {
            None => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| format!("'{}' of '{}' must be a number", rule, name)),
        }
    };
    let min = number("min")?;
    let max = number("max")?;

    let max_length = match rules.get("maxlength") {
        None => None,
        Some(v) => Some(
            v.as_u64()
                .ok_or_else(|| format!("'maxlength' of '{}' must be a positive integer", name))?
                as usize,
        ),
    };

    let regex = match rules.get("regex") {
        None => None,
        Some(Value::String(pattern)) => Some(
            Regex::new(pattern).map_err(|e| format!("invalid regex for '{}': {}", name, e))?,
        ),
        Some(_) => return Err(format!("'regex' of '{}' must be a string", name)),
    };

    Ok(ExtraField {
        name: name.to_string(),
        kind,
        required,
        allowed,
        min,
        max,
        max_length,
        regex,
    })
}

/// Check `extra_data` against the event's declared fields
pub fn validate_extra_data(fields: &[ExtraField], data: &Value) -> std::result::Result<(), Issues> {
    let mut issues = Issues::new();
    let empty = Map::new();
    let data = match data {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => {
            issues.insert("extra_data".to_string(), "must be an object".to_string());
            return Err(issues);
        }
    };

    for key in data.keys() {
        if !fields.iter().any(|f| &f.name == key) {
            issues.insert(format!("extra_data.{}", key), "unknown field".to_string());
        }
    }

    for field in fields {
        let key = format!("extra_data.{}", field.name);
        match data.get(&field.name) {
            None | Some(Value::Null) => {
                if field.required {
                    issues.insert(key, "required field".to_string());
                }
            }
            Some(value) => {
                if let Err(message) = check_value(field, value) {
                    issues.insert(key, message);
                }
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn check_value(field: &ExtraField, value: &Value) -> std::result::Result<(), String> {
    let type_ok = match field.kind {
        ExtraFieldKind::String => value.is_string(),
        ExtraFieldKind::Integer => value.is_i64() || value.is_u64(),
        ExtraFieldKind::Number => value.is_number(),
        ExtraFieldKind::Boolean => value.is_boolean(),
    };
    if !type_ok {
        return Err(format!("must be of {:?} type", field.kind).to_lowercase());
    }

    if let Some(allowed) = &field.allowed {
        if !allowed.contains(value) {
            return Err(format!("unallowed value {}", value));
        }
    }

    if let Some(number) = value.as_f64() {
        if field.min.map_or(false, |min| number < min) {
            return Err(format!("min value is {}", field.min.unwrap_or_default()));
        }
        if field.max.map_or(false, |max| number > max) {
            return Err(format!("max value is {}", field.max.unwrap_or_default()));
        }
    }

    if let Some(text) = value.as_str() {
        if field.max_length.map_or(false, |max| text.chars().count() > max) {
            return Err(format!("max length is {}", field.max_length.unwrap_or_default()));
        }
        if let Some(regex) = &field.regex {
            if !regex.is_match(text) {
                return Err(format!("value does not match regex '{}'", regex.as_str()));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn diet_schema() -> Vec<ExtraField> {
        parse_extra_schema(&json!({
            "diet": {"type": "string", "allowed": ["vegi", "meat"], "required": true},
            "age": {"type": "integer", "min": 16},
            "comment": {"type": "string", "maxlength": 5}
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_accepts_string_encoded_schema() {
        let fields = parse_extra_schema(&json!("{\"shirt\": {\"type\": \"string\"}}")).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].kind, ExtraFieldKind::String);
    }

    #[test]
    fn test_parse_rejects_bad_schemas() {
        assert!(parse_extra_schema(&json!([1, 2])).is_err());
        assert!(parse_extra_schema(&json!({"a": {"type": "tuple"}})).is_err());
        assert!(parse_extra_schema(&json!({"a": {"required": true}})).is_err());
        assert!(parse_extra_schema(&json!({"a": {"type": "string", "colour": 1}})).is_err());
        assert!(parse_extra_schema(&json!({"a": {"type": "string", "regex": "("}})).is_err());
        assert!(parse_extra_schema(&json!("not json")).is_err());
    }

    #[test]
    fn test_valid_extra_data() {
        let fields = diet_schema();
        assert!(validate_extra_data(&fields, &json!({"diet": "vegi", "age": 20})).is_ok());
    }

    #[test]
    fn test_collects_every_issue() {
        let fields = diet_schema();
        let issues = validate_extra_data(
            &fields,
            &json!({"age": 12, "comment": "too long", "shoe": 42}),
        )
        .unwrap_err();

        assert_eq!(issues.len(), 4);
        assert_eq!(issues["extra_data.diet"], "required field");
        assert_eq!(issues["extra_data.age"], "min value is 16");
        assert_eq!(issues["extra_data.comment"], "max length is 5");
        assert_eq!(issues["extra_data.shoe"], "unknown field");
    }

    #[test]
    fn test_allowed_and_type() {
        let fields = diet_schema();
        let issues = validate_extra_data(&fields, &json!({"diet": "fish", "age": "old"})).unwrap_err();
        assert!(issues["extra_data.diet"].starts_with("unallowed value"));
        assert_eq!(issues["extra_data.age"], "must be of integer type");
    }
}

//! Query parameters and document mapping for registry-driven resources
//!
//! Rows are fetched as `to_jsonb(t)` and mapped to API documents: columns are
//! renamed to their field names, internal columns are dropped and the
//! `_created`/`_updated`/`_etag` meta fields are added.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::schema::{FieldKind, ResourceSchema};
use crate::utils::errors::{MemberHubError, Result};
use crate::utils::helpers::{calculate_offset, compute_etag};

pub const DEFAULT_MAX_RESULTS: i64 = 25;
pub const MAX_RESULTS_LIMIT: i64 = 50;

/// Raw query string of a collection request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    #[serde(rename = "where")]
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub page: Option<i64>,
    pub max_results: Option<i64>,
    pub projection: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Field selection requested with `?projection={"field": 0|1}`
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let raw = match raw {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return Ok(Projection::All),
        };
        let fields: Map<String, Value> = serde_json::from_str(raw)
            .map_err(|e| MemberHubError::InvalidInput(format!("projection must be a JSON object: {}", e)))?;

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for (field, flag) in fields {
            match flag.as_i64().or_else(|| flag.as_bool().map(i64::from)) {
                Some(1) => include.push(field),
                Some(0) => exclude.push(field),
                _ => {
                    return Err(MemberHubError::InvalidInput(format!(
                        "projection of '{}' must be 0 or 1",
                        field
                    )))
                }
            }
        }

        match (include.is_empty(), exclude.is_empty()) {
            (true, true) => Ok(Projection::All),
            (false, true) => Ok(Projection::Include(include)),
            (true, false) => Ok(Projection::Exclude(exclude)),
            (false, false) => Err(MemberHubError::InvalidInput(
                "projection cannot mix inclusion and exclusion".to_string(),
            )),
        }
    }

    /// Whether a field is explicitly requested
    pub fn requests(&self, field: &str) -> bool {
        matches!(self, Projection::Include(fields) if fields.iter().any(|f| f == field))
    }

    pub fn apply(&self, document: &mut Value) {
        let Some(map) = document.as_object_mut() else {
            return;
        };
        match self {
            Projection::All => {}
            Projection::Include(fields) => map.retain(|key, _| {
                key.starts_with('_') || key == "id" || fields.iter().any(|f| f == key)
            }),
            Projection::Exclude(fields) => map.retain(|key, _| !fields.iter().any(|f| f == key)),
        }
    }
}

/// Equality condition on a column
#[derive(Debug, Clone)]
pub struct Filter {
    pub column: &'static str,
    pub value: SqlValue,
}

/// Parsed and checked collection query
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub filters: Vec<Filter>,
    pub sort: Vec<(&'static str, SortDirection)>,
    pub page: i64,
    pub max_results: i64,
    pub projection: Projection,
}

impl ListQuery {
    pub fn parse(schema: &ResourceSchema, params: &ListParams) -> Result<Self> {
        let mut filters = Vec::new();
        if let Some(raw) = params.filter.as_deref().filter(|raw| !raw.trim().is_empty()) {
            let conditions: Map<String, Value> = serde_json::from_str(raw)
                .map_err(|e| MemberHubError::InvalidInput(format!("where must be a JSON object: {}", e)))?;
            for (field, value) in conditions {
                let (column, kind) = queryable(schema, &field)?;
                let value = SqlValue::from_json(kind, &value)
                    .map_err(|message| MemberHubError::InvalidInput(format!("where.{}: {}", field, message)))?;
                filters.push(Filter { column, value });
            }
        }

        let mut sort = Vec::new();
        if let Some(raw) = params.sort.as_deref() {
            for key in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
                let (field, direction) = match key.strip_prefix('-') {
                    Some(field) => (field, SortDirection::Desc),
                    None => (key, SortDirection::Asc),
                };
                let (column, _) = queryable(schema, field)?;
                sort.push((column, direction));
            }
        }

        let page = params.page.unwrap_or(1);
        if page < 1 {
            return Err(MemberHubError::InvalidInput("page must be at least 1".to_string()));
        }
        let max_results = params
            .max_results
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, MAX_RESULTS_LIMIT);

        Ok(Self {
            filters,
            sort,
            page,
            max_results,
            projection: Projection::parse(params.projection.as_deref())?,
        })
    }

    pub fn offset(&self) -> i64 {
        calculate_offset(self.page, self.max_results)
    }
}

fn queryable(schema: &ResourceSchema, field: &str) -> Result<(&'static str, FieldKind)> {
    let column = schema
        .queryable_column(field)
        .ok_or_else(|| MemberHubError::InvalidInput(format!("cannot query on field '{}'", field)))?;
    let kind = match field {
        "id" => FieldKind::Integer,
        "_created" | "_updated" => FieldKind::Datetime,
        _ => schema.field_schema(field).map(|f| f.kind).unwrap_or(FieldKind::String),
    };
    Ok((column, kind))
}

/// Restricts a query to rows owned by a user
#[derive(Debug, Clone)]
pub struct OwnerFilter {
    pub columns: Vec<&'static str>,
    pub user_id: i64,
}

impl OwnerFilter {
    pub fn push_condition(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push("(");
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                builder.push(" OR ");
            }
            builder.push(format!("t.{} = ", column));
            builder.push_bind(self.user_id);
        }
        builder.push(")");
    }
}

/// A JSON value converted to the SQL type of its column
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(Option<String>),
    Int(Option<i64>),
    Bool(Option<bool>),
    Timestamp(Option<DateTime<Utc>>),
    Date(Option<NaiveDate>),
    Decimal(Option<Decimal>),
    Json(Option<Value>),
    Uuid(Option<Uuid>),
}

impl SqlValue {
    pub fn from_json(kind: FieldKind, value: &Value) -> std::result::Result<Self, String> {
        if value.is_null() {
            return Ok(Self::null(kind));
        }
        let converted = match kind {
            FieldKind::String | FieldKind::Email => value.as_str().map(|s| SqlValue::Text(Some(s.to_string()))),
            FieldKind::Integer => value.as_i64().map(|n| SqlValue::Int(Some(n))),
            FieldKind::Boolean => value.as_bool().map(|b| SqlValue::Bool(Some(b))),
            FieldKind::Datetime => value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| SqlValue::Timestamp(Some(dt.with_timezone(&Utc)))),
            FieldKind::Date => value
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .map(|d| SqlValue::Date(Some(d))),
            FieldKind::Decimal => match value {
                Value::String(s) => s.parse::<Decimal>().ok(),
                Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
                _ => None,
            }
            .map(|d| SqlValue::Decimal(Some(d))),
            FieldKind::Json => Some(SqlValue::Json(Some(value.clone()))),
            FieldKind::Uuid => value
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(|u| SqlValue::Uuid(Some(u))),
            FieldKind::IntegerList => None,
        };
        converted.ok_or_else(|| format!("value {} does not fit a {:?} column", value, kind))
    }

    pub fn null(kind: FieldKind) -> Self {
        match kind {
            FieldKind::String | FieldKind::Email | FieldKind::IntegerList => SqlValue::Text(None),
            FieldKind::Integer => SqlValue::Int(None),
            FieldKind::Boolean => SqlValue::Bool(None),
            FieldKind::Datetime => SqlValue::Timestamp(None),
            FieldKind::Date => SqlValue::Date(None),
            FieldKind::Decimal => SqlValue::Decimal(None),
            FieldKind::Json => SqlValue::Json(None),
            FieldKind::Uuid => SqlValue::Uuid(None),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(
            self,
            SqlValue::Text(None)
                | SqlValue::Int(None)
                | SqlValue::Bool(None)
                | SqlValue::Timestamp(None)
                | SqlValue::Date(None)
                | SqlValue::Decimal(None)
                | SqlValue::Json(None)
                | SqlValue::Uuid(None)
        )
    }

    pub fn push_bind(self, builder: &mut QueryBuilder<'_, Postgres>) {
        match self {
            SqlValue::Text(v) => builder.push_bind(v),
            SqlValue::Int(v) => builder.push_bind(v),
            SqlValue::Bool(v) => builder.push_bind(v),
            SqlValue::Timestamp(v) => builder.push_bind(v),
            SqlValue::Date(v) => builder.push_bind(v),
            SqlValue::Decimal(v) => builder.push_bind(v),
            SqlValue::Json(v) => builder.push_bind(v.map(sqlx::types::Json)),
            SqlValue::Uuid(v) => builder.push_bind(v),
        };
    }
}

/// Map a `to_jsonb` row to the API document of `schema`
pub fn to_document(schema: &ResourceSchema, row: &Value) -> Value {
    let mut document = Map::new();
    document.insert("id".to_string(), row.get("id").cloned().unwrap_or(Value::Null));
    for field in schema.schema.iter().filter(|f| !f.hidden && !f.virtual_field) {
        document.insert(
            field.name.to_string(),
            row.get(field.column).cloned().unwrap_or(Value::Null),
        );
    }
    document.insert("_created".to_string(), row.get("created_at").cloned().unwrap_or(Value::Null));
    document.insert("_updated".to_string(), row.get("updated_at").cloned().unwrap_or(Value::Null));
    Value::Object(document)
}

/// Attach the `_etag` of a finished document
pub fn with_etag(mut document: Value) -> Value {
    if let Some(map) = document.as_object_mut() {
        map.remove("_etag");
        let etag = compute_etag(&*map);
        map.insert("_etag".to_string(), Value::String(etag));
    }
    document
}

/// Numeric id of a document
pub fn document_id(document: &Value) -> Option<i64> {
    document.get("id").and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::lookup;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn params(filter: Option<&str>, sort: Option<&str>) -> ListParams {
        ListParams {
            filter: filter.map(str::to_string),
            sort: sort.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_and_limits() {
        let events = lookup("events").unwrap();
        let query = ListQuery::parse(events, &ListParams::default()).unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.max_results, DEFAULT_MAX_RESULTS);
        assert_eq!(query.offset(), 0);

        let query = ListQuery::parse(
            events,
            &ListParams { page: Some(3), max_results: Some(500), ..Default::default() },
        )
        .unwrap();
        assert_eq!(query.max_results, MAX_RESULTS_LIMIT);
        assert_eq!(query.offset(), 100);

        assert_matches!(
            ListQuery::parse(events, &ListParams { page: Some(0), ..Default::default() }),
            Err(MemberHubError::InvalidInput(_))
        );
    }

    #[test]
    fn test_where_is_typed() {
        let events = lookup("events").unwrap();
        let query = ListQuery::parse(events, &params(Some(r#"{"is_public": true, "spots": 10}"#), None)).unwrap();
        assert_eq!(query.filters.len(), 2);
        assert!(query.filters.iter().any(|f| f.column == "is_public" && f.value == SqlValue::Bool(Some(true))));
        assert!(query.filters.iter().any(|f| f.column == "spots" && f.value == SqlValue::Int(Some(10))));

        assert!(ListQuery::parse(events, &params(Some(r#"{"spots": "ten"}"#), None)).is_err());
        assert!(ListQuery::parse(events, &params(Some("not json"), None)).is_err());
    }

    #[test]
    fn test_cannot_query_hidden_fields() {
        let users = lookup("users").unwrap();
        assert_matches!(
            ListQuery::parse(users, &params(Some(r#"{"password": "x"}"#), None)),
            Err(MemberHubError::InvalidInput(_))
        );
        assert!(ListQuery::parse(users, &params(None, Some("-password"))).is_err());
    }

    #[test]
    fn test_sort() {
        let events = lookup("events").unwrap();
        let query = ListQuery::parse(events, &params(None, Some("-time_start,title"))).unwrap();
        assert_eq!(query.sort, vec![("time_start", SortDirection::Desc), ("title", SortDirection::Asc)]);
    }

    #[test]
    fn test_projection() {
        assert_eq!(Projection::parse(None).unwrap(), Projection::All);
        let projection = Projection::parse(Some(r#"{"title": 1}"#)).unwrap();
        assert!(projection.requests("title"));

        let mut doc = json!({"id": 1, "title": "Party", "location": "HG", "_etag": "x"});
        projection.apply(&mut doc);
        assert_eq!(doc, json!({"id": 1, "title": "Party", "_etag": "x"}));

        let mut doc = json!({"id": 1, "title": "Party", "location": "HG"});
        Projection::parse(Some(r#"{"location": 0}"#)).unwrap().apply(&mut doc);
        assert_eq!(doc, json!({"id": 1, "title": "Party"}));

        assert!(Projection::parse(Some(r#"{"a": 1, "b": 0}"#)).is_err());
    }

    #[test]
    fn test_document_mapping() {
        let docs = lookup("studydocuments").unwrap();
        let row = json!({
            "id": 4,
            "name": "Analysis I",
            "doc_type": "exam",
            "author_id": 7,
            "created_at": "2024-01-01T00:00:00+00:00",
            "updated_at": "2024-01-02T00:00:00+00:00"
        });
        let document = with_etag(to_document(docs, &row));
        assert_eq!(document["type"], "exam");
        assert_eq!(document["_author"], 7);
        assert_eq!(document["_created"], "2024-01-01T00:00:00+00:00");
        assert!(document.get("doc_type").is_none());
        assert_eq!(document["_etag"].as_str().map(str::len), Some(64));
        assert_eq!(document_id(&document), Some(4));
    }

    #[test]
    fn test_hidden_columns_are_dropped() {
        let users = lookup("users").unwrap();
        let document = to_document(users, &json!({"id": 1, "username": "kim", "password": "$argon2id$..."}));
        assert!(document.get("password").is_none());
        assert_eq!(document["username"], "kim");
    }

    #[test]
    fn test_sql_values() {
        assert_eq!(SqlValue::from_json(FieldKind::Decimal, &json!(12.5)).unwrap(), SqlValue::Decimal(Some(Decimal::new(125, 1))));
        assert!(SqlValue::from_json(FieldKind::Integer, &Value::Null).unwrap().is_null());
        assert!(SqlValue::from_json(FieldKind::Date, &json!("21.03.1995")).is_err());
    }
}

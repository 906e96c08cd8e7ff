//! Registry-driven repository for every REST resource
//!
//! Statements are assembled with `QueryBuilder` from the declared columns, so
//! one implementation serves all tables. Writes take a connection so they can
//! run inside the caller's transaction.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::{Map, Value};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};

use crate::database::query::{to_document, with_etag, ListQuery, OwnerFilter, SqlValue};
use crate::schema::{FieldSchema, ResourceSchema};
use crate::utils::errors::{MemberHubError, Result};
use crate::utils::logging::log_database_operation;

/// Many-to-many field stored in a join table
struct LinkTable {
    resource: &'static str,
    field: &'static str,
    table: &'static str,
    owner_column: &'static str,
    target_column: &'static str,
}

const LINK_TABLES: &[LinkTable] = &[LinkTable {
    resource: "studydocuments",
    field: "files",
    table: "study_document_files",
    owner_column: "study_document_id",
    target_column: "file_id",
}];

fn link_table(schema: &ResourceSchema, field: &str) -> Option<&'static LinkTable> {
    LINK_TABLES
        .iter()
        .find(|l| l.resource == schema.name && l.field == field)
}

#[derive(Debug, Clone)]
pub struct ResourceRepository {
    pool: PgPool,
}

impl ResourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// One page of documents plus the total number of matches
    pub async fn list(
        &self,
        schema: &ResourceSchema,
        query: &ListQuery,
        owner: Option<&OwnerFilter>,
    ) -> Result<(Vec<Value>, i64)> {
        let started = Instant::now();

        let mut count = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*) FROM {} t", schema.table));
        push_conditions(&mut count, query, owner);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT to_jsonb(t) AS doc FROM {} t", schema.table));
        push_conditions(&mut select, query, owner);
        select.push(" ORDER BY ");
        for (column, direction) in &query.sort {
            select.push(format!("t.{} {}, ", column, direction.as_sql()));
        }
        select.push("t.id ASC LIMIT ");
        select.push_bind(query.max_results);
        select.push(" OFFSET ");
        select.push_bind(query.offset());

        let rows: Vec<Value> = select
            .build()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.try_get::<Value, _>("doc"))
            .collect::<std::result::Result<_, _>>()?;

        let mut documents: Vec<Value> = rows.iter().map(|row| to_document(schema, row)).collect();
        self.attach_links(schema, &mut documents).await?;

        log_database_operation("list", schema.table, started.elapsed().as_millis() as u64);
        Ok((documents.into_iter().map(with_etag).collect(), total))
    }

    /// Fetch a document by id
    pub async fn find(&self, schema: &ResourceSchema, id: i64) -> Result<Option<Value>> {
        self.find_where(schema, "id", SqlValue::Int(Some(id))).await
    }

    /// Fetch a document by its secondary lookup field
    pub async fn find_by_lookup(&self, schema: &ResourceSchema, value: &str) -> Result<Option<Value>> {
        let field = match schema.additional_lookup.and_then(|name| schema.field_schema(name)) {
            Some(field) => field,
            None => return Ok(None),
        };
        self.find_where(schema, field.column, SqlValue::Text(Some(value.to_string()))).await
    }

    async fn find_where(&self, schema: &ResourceSchema, column: &str, value: SqlValue) -> Result<Option<Value>> {
        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT to_jsonb(t) AS doc FROM {} t WHERE t.{} = ",
            schema.table, column
        ));
        value.push_bind(&mut select);

        let row = match select.build().fetch_optional(&self.pool).await? {
            Some(row) => row.try_get::<Value, _>("doc")?,
            None => return Ok(None),
        };

        let mut documents = vec![to_document(schema, &row)];
        self.attach_links(schema, &mut documents).await?;
        Ok(documents.pop().map(with_etag))
    }

    /// Re-read a document inside a transaction, locking its row until commit
    pub async fn lock(conn: &mut PgConnection, schema: &ResourceSchema, id: i64) -> Result<Option<Value>> {
        let row: Option<Value> = sqlx::query_scalar(&format!(
            "SELECT to_jsonb(t) AS doc FROM {} t WHERE t.id = $1 FOR UPDATE",
            schema.table
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut document = to_document(schema, &row);
        load_links(&mut *conn, schema, std::slice::from_mut(&mut document)).await?;
        Ok(Some(with_etag(document)))
    }

    /// Insert a validated payload. Keys are field names.
    pub async fn insert(conn: &mut PgConnection, schema: &ResourceSchema, payload: &Map<String, Value>) -> Result<Value> {
        let (columns, links) = split_payload(schema, payload)?;

        let mut insert = QueryBuilder::<Postgres>::new(format!("INSERT INTO {} ", schema.table));
        if columns.is_empty() {
            insert.push("DEFAULT VALUES");
        } else {
            insert.push("(");
            let mut names = insert.separated(", ");
            for (field, _) in &columns {
                names.push(field.column);
            }
            insert.push(") VALUES (");
            let mut values = insert.separated(", ");
            for (_, value) in columns {
                push_value(&mut values, value, true);
            }
            insert.push(")");
        }
        insert.push(" RETURNING to_jsonb(");
        insert.push(schema.table);
        insert.push(".*) AS doc");

        let row: Value = insert.build().fetch_one(&mut *conn).await?.try_get("doc")?;
        let mut document = to_document(schema, &row);
        let id = document.get("id").and_then(Value::as_i64).unwrap_or_default();
        for (link, ids) in links {
            replace_links(&mut *conn, link, id, &ids).await?;
        }
        load_links(&mut *conn, schema, std::slice::from_mut(&mut document)).await?;
        Ok(with_etag(document))
    }

    /// Update a document.
    ///
    /// With `replace` every writable field missing from the payload is reset
    /// to its column default.
    pub async fn update(
        conn: &mut PgConnection,
        schema: &ResourceSchema,
        id: i64,
        payload: &Map<String, Value>,
        replace: bool,
    ) -> Result<Value> {
        let (columns, links) = split_payload(schema, payload)?;

        let mut update = QueryBuilder::<Postgres>::new(format!("UPDATE {} SET ", schema.table));
        {
            let mut assignments = update.separated(", ");
            for (field, value) in columns {
                assignments.push(format!("{} = ", field.column));
                push_value(&mut assignments, value, false);
            }
            if replace {
                for field in schema
                    .schema
                    .iter()
                    .filter(|f| !f.readonly && !f.hidden && !f.virtual_field && !payload.contains_key(f.name))
                {
                    assignments.push(format!("{} = DEFAULT", field.column));
                }
            }
            assignments.push("updated_at = NOW()");
        }
        update.push(" WHERE id = ");
        update.push_bind(id);
        update.push(" RETURNING to_jsonb(");
        update.push(schema.table);
        update.push(".*) AS doc");

        let row = update
            .build()
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| MemberHubError::not_found(schema.name, id))?;
        let row: Value = row.try_get("doc")?;

        for (link, ids) in links {
            replace_links(&mut *conn, link, id, &ids).await?;
        }
        if replace {
            for link in LINK_TABLES.iter().filter(|l| l.resource == schema.name && !payload.contains_key(l.field)) {
                replace_links(&mut *conn, link, id, &[]).await?;
            }
        }

        let mut document = to_document(schema, &row);
        load_links(&mut *conn, schema, std::slice::from_mut(&mut document)).await?;
        Ok(with_etag(document))
    }

    pub async fn delete(conn: &mut PgConnection, schema: &ResourceSchema, id: i64) -> Result<()> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", schema.table))
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MemberHubError::not_found(schema.name, id));
        }
        Ok(())
    }

    async fn attach_links(&self, schema: &ResourceSchema, documents: &mut [Value]) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        load_links(&mut conn, schema, documents).await
    }
}

fn push_conditions(builder: &mut QueryBuilder<'_, Postgres>, query: &ListQuery, owner: Option<&OwnerFilter>) {
    builder.push(" WHERE TRUE");
    for filter in &query.filters {
        if filter.value.is_null() {
            builder.push(format!(" AND t.{} IS NULL", filter.column));
        } else {
            builder.push(format!(" AND t.{} = ", filter.column));
            filter.value.clone().push_bind(builder);
        }
    }
    if let Some(owner) = owner {
        builder.push(" AND ");
        owner.push_condition(builder);
    }
}

/// Bind a value, preceded by the separator when `separate` is set
fn push_value(
    separated: &mut sqlx::query_builder::Separated<'_, '_, Postgres, &'static str>,
    value: SqlValue,
    separate: bool,
) {
    macro_rules! bind {
        ($v:expr) => {
            if separate {
                separated.push_bind($v);
            } else {
                separated.push_bind_unseparated($v);
            }
        };
    }
    match value {
        SqlValue::Text(v) => bind!(v),
        SqlValue::Int(v) => bind!(v),
        SqlValue::Bool(v) => bind!(v),
        SqlValue::Timestamp(v) => bind!(v),
        SqlValue::Date(v) => bind!(v),
        SqlValue::Decimal(v) => bind!(v),
        SqlValue::Json(v) => bind!(v.map(sqlx::types::Json)),
        SqlValue::Uuid(v) => bind!(v),
    }
}

type ColumnValues<'s> = Vec<(&'s FieldSchema, SqlValue)>;
type LinkValues = Vec<(&'static LinkTable, Vec<i64>)>;

/// Split a payload into column assignments and join-table links
fn split_payload<'s>(
    schema: &'s ResourceSchema,
    payload: &Map<String, Value>,
) -> Result<(ColumnValues<'s>, LinkValues)> {
    let mut columns = Vec::new();
    let mut links = Vec::new();

    for (name, value) in payload {
        let field = schema
            .field_schema(name)
            .ok_or_else(|| MemberHubError::issue(name, "unknown field"))?;

        if field.virtual_field {
            if let Some(link) = link_table(schema, name) {
                let ids = value
                    .as_array()
                    .map(|items| items.iter().filter_map(Value::as_i64).collect())
                    .unwrap_or_default();
                links.push((link, ids));
            }
            continue;
        }

        let value = SqlValue::from_json(field.kind, value).map_err(|message| MemberHubError::issue(name, message))?;
        columns.push((field, value));
    }

    Ok((columns, links))
}

async fn replace_links(conn: &mut PgConnection, link: &LinkTable, owner_id: i64, ids: &[i64]) -> Result<()> {
    sqlx::query(&format!("DELETE FROM {} WHERE {} = $1", link.table, link.owner_column))
        .bind(owner_id)
        .execute(&mut *conn)
        .await?;

    if !ids.is_empty() {
        sqlx::query(&format!(
            "INSERT INTO {} ({}, {}) SELECT $1, UNNEST($2::BIGINT[]) ON CONFLICT DO NOTHING",
            link.table, link.owner_column, link.target_column
        ))
        .bind(owner_id)
        .bind(ids)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn load_links(conn: &mut PgConnection, schema: &ResourceSchema, documents: &mut [Value]) -> Result<()> {
    let ids: Vec<i64> = documents
        .iter()
        .filter_map(|d| d.get("id").and_then(Value::as_i64))
        .collect();
    if ids.is_empty() {
        return Ok(());
    }

    for link in LINK_TABLES.iter().filter(|l| l.resource == schema.name) {
        let rows: Vec<(i64, i64)> = sqlx::query_as(&format!(
            "SELECT {}, {} FROM {} WHERE {} = ANY($1) ORDER BY {}",
            link.owner_column, link.target_column, link.table, link.owner_column, link.target_column
        ))
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;

        let mut grouped: HashMap<i64, Vec<i64>> = HashMap::new();
        for (owner, target) in rows {
            grouped.entry(owner).or_default().push(target);
        }

        for document in documents.iter_mut() {
            let id = document.get("id").and_then(Value::as_i64).unwrap_or_default();
            let targets = grouped.remove(&id).unwrap_or_default();
            if let Some(map) = document.as_object_mut() {
                map.insert(link.field.to_string(), Value::from(targets));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{lookup, FieldKind};
    use serde_json::json;

    #[test]
    fn test_split_payload_separates_links() {
        let docs = lookup("studydocuments").unwrap();
        let payload = json!({"name": "Analysis", "type": "exam", "files": [3, 4]});
        let (columns, links) = split_payload(docs, payload.as_object().unwrap()).unwrap();

        let names: Vec<_> = columns.iter().map(|(f, _)| f.column).collect();
        assert!(names.contains(&"doc_type"));
        assert!(names.contains(&"name"));
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].1, vec![3, 4]);
    }

    #[test]
    fn test_split_payload_rejects_mismatched_values() {
        let events = lookup("events").unwrap();
        let payload = json!({"spots": "many"});
        assert!(split_payload(events, payload.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_kind_of_password_column() {
        let users = lookup("users").unwrap();
        let password = users.field_schema("password").unwrap();
        assert_eq!(password.kind, FieldKind::String);
        assert!(password.hidden);
    }
}

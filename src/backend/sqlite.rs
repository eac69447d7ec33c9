use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::{sqlite::SqliteRow, Column, Row, SqlitePool, TypeInfo, ValueRef};
use tracing::debug;

use super::{Backend, ResourceQuery};
use crate::error::{AppError, AppResult, BACKEND_CONFLICT};
use crate::id::new_uuid_v7;
use crate::model::{Property, PropertyId, RecordId, ResourceKind};

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

/// Writable columns per table, excluding `id` and the timestamps.
fn writable_columns(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::Maintenance => &[
            "property_id",
            "title",
            "description",
            "priority",
            "status",
            "due_date",
        ],
        ResourceKind::Appliances => &[
            "property_id",
            "name",
            "brand",
            "model",
            "serial_number",
            "location",
            "purchase_date",
            "warranty_expiration",
            "category",
        ],
        ResourceKind::Documents => &[
            "property_id",
            "title",
            "description",
            "category",
            "file_type",
            "file_size",
            "url",
        ],
        ResourceKind::Projects => &[
            "property_id",
            "name",
            "description",
            "status",
            "budget",
            "spent",
            "start_date",
            "projected_end_date",
        ],
        ResourceKind::Expenses => &[
            "property_id",
            "title",
            "amount",
            "category",
            "date",
            "recurring",
            "recurring_interval",
        ],
        ResourceKind::Budgets => &["property_id", "category", "amount", "month", "year"],
    }
}

fn order_clause(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Expenses => "ORDER BY date DESC, created_at DESC, rowid DESC",
        ResourceKind::Budgets => "ORDER BY year, month, category",
        _ => "ORDER BY created_at DESC, rowid DESC",
    }
}

fn row_to_value(row: SqliteRow) -> Value {
    let mut map = Map::new();
    for col in row.columns() {
        let idx = col.ordinal();
        let v = row.try_get_raw(idx).ok();
        let val = match v {
            Some(raw) => {
                if raw.is_null() {
                    Value::Null
                } else {
                    match raw.type_info().name() {
                        "INTEGER" => row
                            .try_get::<i64, _>(idx)
                            .map(Value::from)
                            .unwrap_or(Value::Null),
                        "REAL" => row
                            .try_get::<f64, _>(idx)
                            .map(Value::from)
                            .unwrap_or(Value::Null),
                        _ => row
                            .try_get::<String, _>(idx)
                            .map(Value::from)
                            .unwrap_or(Value::Null),
                    }
                }
            }
            None => Value::Null,
        };
        map.insert(col.name().to_string(), val);
    }
    Value::Object(map)
}

fn bind_value<'q>(q: SqliteQuery<'q>, v: &Value) -> SqliteQuery<'q> {
    match v {
        Value::Null => q.bind(Option::<i64>::None),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(Option::<i64>::None)
            }
        }
        Value::Bool(b) => q.bind(*b as i64),
        Value::String(s) => q.bind(s.clone()),
        _ => q.bind(v.to_string()),
    }
}

fn now_text() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Keeps whitelisted columns only; ids arrive as numbers from some callers
/// and are stored as text.
fn writable(kind: ResourceKind, payload: Map<String, Value>) -> Vec<(&'static str, Value)> {
    let allowed = writable_columns(kind);
    let mut out = Vec::new();
    for (key, value) in payload {
        match allowed.iter().find(|col| **col == key) {
            Some(col) if *col == "property_id" => {
                let value = match value {
                    Value::Number(n) => Value::String(n.to_string()),
                    other => other,
                };
                out.push((*col, value));
            }
            Some(col) => out.push((*col, value)),
            None if key == "id" => {}
            None => debug!(
                target: "propertypal",
                event = "payload_field_ignored",
                resource = kind.as_str(),
                field = %key
            ),
        }
    }
    out
}

fn map_write_error(kind: ResourceKind, err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() && kind == ResourceKind::Budgets {
            return AppError::new(
                BACKEND_CONFLICT,
                "A budget already exists for this category, month, year, and property",
            );
        }
    }
    AppError::from(err).with_context("resource", kind.as_str())
}

/// SQLite-backed store. Tables are named after the resource.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn property_exists(&self, id: &str) -> AppResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM properties WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn fetch_record(&self, kind: ResourceKind, id: &str) -> AppResult<Value> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", kind.as_str());
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found(kind, id))?;
        Ok(row_to_value(row))
    }

    /// Properties are created by onboarding, outside this client; this is the
    /// seeding path for that flow and for tests.
    pub async fn insert_property(&self, property: &Property) -> AppResult<()> {
        let now = now_text();
        sqlx::query(
            "INSERT INTO properties (id, address, city, state, zip, property_type, bedrooms, \
             bathrooms, square_footage, is_primary_residence, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(property.id.as_str())
        .bind(&property.address)
        .bind(&property.city)
        .bind(&property.state)
        .bind(&property.zip)
        .bind(&property.property_type)
        .bind(property.bedrooms.map(i64::from))
        .bind(property.bathrooms)
        .bind(property.square_footage.map(i64::from))
        .bind(property.is_primary_residence as i64)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "insert_property"))?;
        Ok(())
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn list_properties(&self) -> AppResult<Vec<Property>> {
        let rows = sqlx::query("SELECT * FROM properties ORDER BY created_at, rowid")
            .fetch_all(&self.pool)
            .await
            .map_err(|err| AppError::from(err).with_context("operation", "list_properties"))?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row_to_value(row)).map_err(AppError::from))
            .collect()
    }

    async fn list(&self, kind: ResourceKind, query: &ResourceQuery) -> AppResult<Vec<Value>> {
        let filter = &query.filter;
        let mut sql = format!("SELECT * FROM {} WHERE property_id = ?", kind.as_str());
        let mut binds: Vec<Value> = vec![Value::from(query.property_id.as_str())];

        if let Some(status) = &filter.status {
            sql.push_str(" AND status = ?");
            binds.push(Value::from(status.as_str()));
        }
        if let Some(category) = &filter.category {
            sql.push_str(" AND category = ?");
            binds.push(Value::from(category.as_str()));
        }
        if let Some(start) = filter.start_date {
            sql.push_str(" AND date >= ?");
            binds.push(Value::from(start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = filter.end_date {
            sql.push_str(" AND substr(date, 1, 10) <= ?");
            binds.push(Value::from(end.format("%Y-%m-%d").to_string()));
        }
        if let Some(year) = filter.year {
            sql.push_str(" AND year = ?");
            binds.push(Value::from(year));
        }
        if let Some(month) = filter.month {
            sql.push_str(" AND month = ?");
            binds.push(Value::from(month));
        }
        sql.push(' ');
        sql.push_str(order_clause(kind));

        let mut q = sqlx::query(&sql);
        for value in &binds {
            q = bind_value(q, value);
        }
        let rows = q.fetch_all(&self.pool).await.map_err(|err| {
            AppError::from(err)
                .with_context("operation", "list")
                .with_context("resource", kind.as_str())
                .with_context("property_id", query.property_id.as_str())
        })?;
        Ok(rows.into_iter().map(row_to_value).collect())
    }

    async fn create(&self, kind: ResourceKind, payload: Map<String, Value>) -> AppResult<Value> {
        let columns = writable(kind, payload);
        let property_id = columns
            .iter()
            .find(|(col, _)| *col == "property_id")
            .and_then(|(_, value)| value.as_str().map(str::to_owned))
            .ok_or_else(|| AppError::missing_field("property_id"))?;
        if !self.property_exists(&property_id).await? {
            return Err(AppError::property_not_found(&property_id));
        }

        let id = new_uuid_v7();
        let now = now_text();
        let names: Vec<&str> = columns.iter().map(|(col, _)| *col).collect();
        let placeholders = vec!["?"; names.len() + 3].join(",");
        let sql = format!(
            "INSERT INTO {} (id,{},created_at,updated_at) VALUES ({})",
            kind.as_str(),
            names.join(","),
            placeholders
        );
        let mut q = sqlx::query(&sql).bind(id.clone());
        for (_, value) in &columns {
            q = bind_value(q, value);
        }
        q.bind(now.clone())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|err| map_write_error(kind, err).with_context("operation", "create"))?;

        self.fetch_record(kind, &id).await
    }

    async fn update(
        &self,
        kind: ResourceKind,
        id: &RecordId,
        patch: Map<String, Value>,
    ) -> AppResult<Value> {
        let columns = writable(kind, patch);
        if let Some(property_id) = columns
            .iter()
            .find(|(col, _)| *col == "property_id")
            .and_then(|(_, value)| value.as_str())
        {
            if !self.property_exists(property_id).await? {
                return Err(AppError::property_not_found(property_id));
            }
        }

        let mut set_clause: Vec<String> = columns.iter().map(|(col, _)| format!("{col} = ?")).collect();
        set_clause.push("updated_at = ?".into());
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            kind.as_str(),
            set_clause.join(",")
        );
        let mut q = sqlx::query(&sql);
        for (_, value) in &columns {
            q = bind_value(q, value);
        }
        let result = q
            .bind(now_text())
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|err| {
                map_write_error(kind, err)
                    .with_context("operation", "update")
                    .with_context("id", id.as_str())
            })?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(kind, id.as_str()));
        }

        self.fetch_record(kind, id.as_str()).await
    }

    async fn delete(&self, kind: ResourceKind, id: &RecordId) -> AppResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", kind.as_str());
        let result = sqlx::query(&sql)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "delete")
                    .with_context("resource", kind.as_str())
                    .with_context("id", id.as_str())
            })?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(kind, id.as_str()));
        }
        Ok(())
    }

    async fn set_primary_property(&self, id: &PropertyId) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM properties WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if found.is_none() {
            tx.rollback().await?;
            return Err(AppError::property_not_found(id.as_str()));
        }
        sqlx::query(
            "UPDATE properties SET is_primary_residence = CASE WHEN id = ? THEN 1 ELSE 0 END, \
             updated_at = ?",
        )
        .bind(id.as_str())
        .bind(now_text())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

//! Contracts of the stores this client talks to.
//!
//! Resource lists come back as raw JSON objects so that a record that does not
//! match its entity shape fails only the slot it belongs to, not the call.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::AppResult;
use crate::model::{parse_iso_date, Property, PropertyId, RecordId, ResourceKind};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

/// Optional narrowing of a resource list. An empty filter means everything
/// for the property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
}

impl ResourceFilter {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }

    pub fn date_range(start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> Self {
        Self {
            start_date,
            end_date,
            ..Self::default()
        }
    }

    pub fn period(year: i32, month: u32) -> Self {
        Self {
            year: Some(year),
            month: Some(month),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies the filter to one raw record. Date bounds look at the `date`
    /// field, period bounds at `year`/`month`; records lacking the field are
    /// excluded once the bound is set.
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        if let Some(status) = &self.status {
            if record.get("status").and_then(Value::as_str) != Some(status.as_str()) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if record.get("category").and_then(Value::as_str) != Some(category.as_str()) {
                return false;
            }
        }
        if self.start_date.is_some() || self.end_date.is_some() {
            let Some(date) = record
                .get("date")
                .and_then(Value::as_str)
                .and_then(parse_iso_date)
            else {
                return false;
            };
            if self.start_date.is_some_and(|start| date < start) {
                return false;
            }
            if self.end_date.is_some_and(|end| date > end) {
                return false;
            }
        }
        if let Some(year) = self.year {
            if record.get("year").and_then(Value::as_i64) != Some(i64::from(year)) {
                return false;
            }
        }
        if let Some(month) = self.month {
            if record.get("month").and_then(Value::as_i64) != Some(i64::from(month)) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceQuery {
    pub property_id: PropertyId,
    pub filter: ResourceFilter,
}

impl ResourceQuery {
    pub fn new(property_id: PropertyId, filter: ResourceFilter) -> Self {
        Self {
            property_id,
            filter,
        }
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Properties of the signed-in user in backend-defined order.
    async fn list_properties(&self) -> AppResult<Vec<Property>>;

    /// Records of one resource for one property. Never `None`: no results is
    /// an empty vector.
    async fn list(&self, kind: ResourceKind, query: &ResourceQuery) -> AppResult<Vec<Value>>;

    async fn create(&self, kind: ResourceKind, payload: Map<String, Value>) -> AppResult<Value>;

    async fn update(
        &self,
        kind: ResourceKind,
        id: &RecordId,
        patch: Map<String, Value>,
    ) -> AppResult<Value>;

    async fn delete(&self, kind: ResourceKind, id: &RecordId) -> AppResult<()>;

    async fn set_primary_property(&self, id: &PropertyId) -> AppResult<()>;
}

/// String form of a JSON id, numeric or textual.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use propertypal_lib::backend::{Backend, MemoryBackend, ResourceQuery};
use propertypal_lib::model::Property;
use propertypal_lib::{AppResult, PropertyId, RecordId, ResourceKind};
use serde_json::{json, Map, Value};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tokio::sync::watch;

pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect sqlite::memory:");
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await
        .unwrap();
    pool
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 15).unwrap()
}

pub fn property(id: &str) -> Property {
    serde_json::from_value(json!({ "id": id, "address": format!("{id} Main St") })).unwrap()
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Wraps a [`MemoryBackend`] and can hold every `list` call for a property
/// until the test releases it.
#[derive(Clone)]
pub struct GatedBackend {
    inner: MemoryBackend,
    gates: Arc<Mutex<HashMap<String, watch::Sender<bool>>>>,
}

impl GatedBackend {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            gates: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn memory(&self) -> &MemoryBackend {
        &self.inner
    }

    pub fn hold(&self, property_id: &str) {
        let (tx, _) = watch::channel(false);
        self.gates.lock().unwrap().insert(property_id.to_string(), tx);
    }

    pub fn release(&self, property_id: &str) {
        if let Some(tx) = self.gates.lock().unwrap().get(property_id) {
            tx.send_replace(true);
        }
    }

    fn gate(&self, property_id: &str) -> Option<watch::Receiver<bool>> {
        self.gates
            .lock()
            .unwrap()
            .get(property_id)
            .map(watch::Sender::subscribe)
    }
}

#[async_trait]
impl Backend for GatedBackend {
    async fn list_properties(&self) -> AppResult<Vec<Property>> {
        self.inner.list_properties().await
    }

    async fn list(&self, kind: ResourceKind, query: &ResourceQuery) -> AppResult<Vec<Value>> {
        if let Some(mut gate) = self.gate(query.property_id.as_str()) {
            gate.wait_for(|open| *open).await.expect("gate dropped");
        }
        self.inner.list(kind, query).await
    }

    async fn create(&self, kind: ResourceKind, payload: Map<String, Value>) -> AppResult<Value> {
        self.inner.create(kind, payload).await
    }

    async fn update(
        &self,
        kind: ResourceKind,
        id: &RecordId,
        patch: Map<String, Value>,
    ) -> AppResult<Value> {
        self.inner.update(kind, id, patch).await
    }

    async fn delete(&self, kind: ResourceKind, id: &RecordId) -> AppResult<()> {
        self.inner.delete(kind, id).await
    }

    async fn set_primary_property(&self, id: &PropertyId) -> AppResult<()> {
        self.inner.set_primary_property(id).await
    }
}

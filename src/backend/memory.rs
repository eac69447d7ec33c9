use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{id_string, Backend, ResourceQuery};
use crate::error::{AppError, AppResult, BACKEND_CONFLICT};
use crate::model::{parse_iso_date, Property, PropertyId, RecordId, ResourceKind};

struct StoredRecord {
    seq: u64,
    data: Map<String, Value>,
}

#[derive(Default)]
struct Inner {
    properties: Vec<Property>,
    records: HashMap<ResourceKind, Vec<StoredRecord>>,
    next_id: i64,
    next_seq: u64,
    offline: bool,
    failing: HashSet<ResourceKind>,
    calls: Vec<String>,
}

impl Inner {
    fn reachable(&self, kind: Option<ResourceKind>) -> AppResult<()> {
        if self.offline {
            return Err(AppError::network("memory backend offline"));
        }
        if let Some(kind) = kind.filter(|kind| self.failing.contains(kind)) {
            return Err(AppError::network(format!("{kind} store unavailable"))
                .with_context("resource", kind.as_str()));
        }
        Ok(())
    }

    fn has_property(&self, id: &str) -> bool {
        self.properties.iter().any(|property| property.id.as_str() == id)
    }

    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn push(&mut self, kind: ResourceKind, data: Map<String, Value>) {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.records
            .entry(kind)
            .or_default()
            .push(StoredRecord { seq, data });
    }

    fn position(&self, kind: ResourceKind, id: &RecordId) -> Option<usize> {
        self.records.get(&kind)?.iter().position(|record| {
            record.data.get("id").and_then(id_string).as_deref() == Some(id.as_str())
        })
    }

    /// One budget per category, month, year and property.
    fn budget_taken(&self, candidate: &Map<String, Value>, except: Option<&RecordId>) -> bool {
        let key = |data: &Map<String, Value>| {
            (
                data.get("category").cloned(),
                data.get("month").and_then(Value::as_i64),
                data.get("year").and_then(Value::as_i64),
                data.get("property_id").and_then(id_string),
            )
        };
        let wanted = key(candidate);
        self.records
            .get(&ResourceKind::Budgets)
            .into_iter()
            .flatten()
            .filter(|record| {
                except.map_or(true, |id| {
                    record.data.get("id").and_then(id_string).as_deref() != Some(id.as_str())
                })
            })
            .any(|record| key(&record.data) == wanted)
    }
}

fn budget_conflict() -> AppError {
    AppError::new(
        BACKEND_CONFLICT,
        "A budget already exists for this category, month, year, and property",
    )
}

fn date_of(record: &StoredRecord) -> Option<chrono::NaiveDate> {
    record
        .data
        .get("date")
        .and_then(Value::as_str)
        .and_then(parse_iso_date)
}

fn budget_key(record: &StoredRecord) -> (i64, i64, String) {
    (
        record.data.get("year").and_then(Value::as_i64).unwrap_or(0),
        record.data.get("month").and_then(Value::as_i64).unwrap_or(0),
        record
            .data
            .get("category")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    )
}

/// Ordering the hosted service applies: newest first for most lists,
/// expenses by date descending, budgets by period then category.
fn listing_order(kind: ResourceKind, a: &StoredRecord, b: &StoredRecord) -> Ordering {
    match kind {
        ResourceKind::Expenses => date_of(b).cmp(&date_of(a)).then(b.seq.cmp(&a.seq)),
        ResourceKind::Budgets => budget_key(a).cmp(&budget_key(b)),
        _ => b.seq.cmp(&a.seq),
    }
}

/// In-process store with the filtering and ordering of the hosted service.
/// Every call is recorded, and stores can be taken offline one resource at a
/// time.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_properties(properties: Vec<Property>) -> Self {
        let backend = Self::new();
        backend.lock().properties = properties;
        backend
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_property(&self, property: Property) {
        self.lock().properties.push(property);
    }

    /// Inserts a record as-is, assigning an id when it has none. Shape is not
    /// checked, which lets tests plant malformed records.
    pub fn seed(&self, kind: ResourceKind, record: Value) -> RecordId {
        let mut inner = self.lock();
        let mut data = match record {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".into(), other);
                map
            }
        };
        let id = match data.get("id").and_then(id_string) {
            Some(id) => id,
            None => {
                let id = inner.allocate_id();
                data.insert("id".into(), Value::from(id));
                id.to_string()
            }
        };
        inner.push(kind, data);
        RecordId::new(id)
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn fail_resource(&self, kind: ResourceKind, failing: bool) {
        let mut inner = self.lock();
        if failing {
            inner.failing.insert(kind);
        } else {
            inner.failing.remove(&kind);
        }
    }

    /// Calls received so far, e.g. `list:maintenance`, `create:expenses`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn records(&self, kind: ResourceKind) -> Vec<Value> {
        self.lock()
            .records
            .get(&kind)
            .into_iter()
            .flatten()
            .map(|record| Value::Object(record.data.clone()))
            .collect()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn list_properties(&self) -> AppResult<Vec<Property>> {
        let mut inner = self.lock();
        inner.calls.push("list_properties".into());
        inner.reachable(None)?;
        Ok(inner.properties.clone())
    }

    async fn list(&self, kind: ResourceKind, query: &ResourceQuery) -> AppResult<Vec<Value>> {
        let mut inner = self.lock();
        inner.calls.push(format!("list:{kind}"));
        inner.reachable(Some(kind))?;

        let mut matching: Vec<&StoredRecord> = inner
            .records
            .get(&kind)
            .into_iter()
            .flatten()
            .filter(|record| {
                record.data.get("property_id").and_then(id_string).as_deref()
                    == Some(query.property_id.as_str())
            })
            .filter(|record| query.filter.matches(&record.data))
            .collect();
        matching.sort_by(|a, b| listing_order(kind, a, b));
        Ok(matching
            .into_iter()
            .map(|record| Value::Object(record.data.clone()))
            .collect())
    }

    async fn create(&self, kind: ResourceKind, mut payload: Map<String, Value>) -> AppResult<Value> {
        let mut inner = self.lock();
        inner.calls.push(format!("create:{kind}"));
        inner.reachable(Some(kind))?;

        let property_id = payload
            .get("property_id")
            .and_then(id_string)
            .ok_or_else(|| AppError::missing_field("property_id"))?;
        if !inner.has_property(&property_id) {
            return Err(AppError::property_not_found(&property_id));
        }
        if kind == ResourceKind::Budgets && inner.budget_taken(&payload, None) {
            return Err(budget_conflict());
        }

        let id = inner.allocate_id();
        payload.insert("id".into(), Value::from(id));
        inner.push(kind, payload.clone());
        Ok(Value::Object(payload))
    }

    async fn update(
        &self,
        kind: ResourceKind,
        id: &RecordId,
        patch: Map<String, Value>,
    ) -> AppResult<Value> {
        let mut inner = self.lock();
        inner.calls.push(format!("update:{kind}"));
        inner.reachable(Some(kind))?;

        let idx = inner
            .position(kind, id)
            .ok_or_else(|| AppError::not_found(kind, id.as_str()))?;
        let mut merged = inner.records[&kind][idx].data.clone();
        for (key, value) in patch {
            if key != "id" {
                merged.insert(key, value);
            }
        }
        if let Some(property_id) = merged.get("property_id").and_then(id_string) {
            if !inner.has_property(&property_id) {
                return Err(AppError::property_not_found(&property_id));
            }
        }
        if kind == ResourceKind::Budgets && inner.budget_taken(&merged, Some(id)) {
            return Err(budget_conflict());
        }

        if let Some(records) = inner.records.get_mut(&kind) {
            records[idx].data = merged.clone();
        }
        Ok(Value::Object(merged))
    }

    async fn delete(&self, kind: ResourceKind, id: &RecordId) -> AppResult<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("delete:{kind}"));
        inner.reachable(Some(kind))?;

        let idx = inner
            .position(kind, id)
            .ok_or_else(|| AppError::not_found(kind, id.as_str()))?;
        if let Some(records) = inner.records.get_mut(&kind) {
            records.remove(idx);
        }
        Ok(())
    }

    async fn set_primary_property(&self, id: &PropertyId) -> AppResult<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("set_primary:{id}"));
        inner.reachable(None)?;

        if !inner.has_property(id.as_str()) {
            return Err(AppError::property_not_found(id.as_str()));
        }
        for property in inner.properties.iter_mut() {
            property.is_primary_residence = &property.id == id;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ResourceFilter;
    use crate::error::{BACKEND_NOT_FOUND, NETWORK_UNAVAILABLE, PROPERTY_NOT_FOUND};
    use serde_json::json;

    fn property(id: &str) -> Property {
        serde_json::from_value(json!({ "id": id, "address": format!("{id} Main St") })).unwrap()
    }

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn query(property: &str) -> ResourceQuery {
        ResourceQuery::new(PropertyId::new(property), ResourceFilter::default())
    }

    #[tokio::test]
    async fn lists_are_scoped_to_the_property_newest_first() {
        let backend = MemoryBackend::with_properties(vec![property("1"), property("2")]);
        backend.seed(
            ResourceKind::Maintenance,
            json!({ "title": "old", "property_id": 1 }),
        );
        backend.seed(
            ResourceKind::Maintenance,
            json!({ "title": "other", "property_id": 2 }),
        );
        backend.seed(
            ResourceKind::Maintenance,
            json!({ "title": "new", "property_id": "1" }),
        );

        let rows = backend
            .list(ResourceKind::Maintenance, &query("1"))
            .await
            .unwrap();
        let titles: Vec<_> = rows.iter().map(|row| row["title"].clone()).collect();
        assert_eq!(titles, vec![json!("new"), json!("old")]);
    }

    #[tokio::test]
    async fn expenses_sort_by_date_descending() {
        let backend = MemoryBackend::with_properties(vec![property("1")]);
        for date in ["2024-01-05", "2024-03-01", "2024-02-10"] {
            backend.seed(
                ResourceKind::Expenses,
                json!({ "title": date, "date": date, "property_id": 1 }),
            );
        }
        let rows = backend
            .list(ResourceKind::Expenses, &query("1"))
            .await
            .unwrap();
        let dates: Vec<_> = rows.iter().map(|row| row["date"].clone()).collect();
        assert_eq!(
            dates,
            vec![json!("2024-03-01"), json!("2024-02-10"), json!("2024-01-05")]
        );
    }

    #[tokio::test]
    async fn duplicate_budget_period_is_rejected() {
        let backend = MemoryBackend::with_properties(vec![property("1")]);
        let budget = json!({
            "category": "utilities", "amount": 20000, "month": 5, "year": 2024, "property_id": "1"
        });
        backend
            .create(ResourceKind::Budgets, payload(budget.clone()))
            .await
            .unwrap();
        let err = backend
            .create(ResourceKind::Budgets, payload(budget))
            .await
            .unwrap_err();
        assert_eq!(err.code(), BACKEND_CONFLICT);
    }

    #[tokio::test]
    async fn create_requires_a_known_property() {
        let backend = MemoryBackend::with_properties(vec![property("1")]);
        let err = backend
            .create(
                ResourceKind::Appliances,
                payload(json!({ "name": "Fridge", "category": "kitchen", "property_id": "9" })),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), PROPERTY_NOT_FOUND);
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_records() {
        let backend = MemoryBackend::with_properties(vec![property("1")]);
        let missing = RecordId::new("404");
        let err = backend
            .update(ResourceKind::Projects, &missing, Map::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), BACKEND_NOT_FOUND);
        let err = backend
            .delete(ResourceKind::Projects, &missing)
            .await
            .unwrap_err();
        assert_eq!(err.code(), BACKEND_NOT_FOUND);
    }

    #[tokio::test]
    async fn update_merges_patch_and_keeps_id() {
        let backend = MemoryBackend::with_properties(vec![property("1")]);
        let id = backend.seed(
            ResourceKind::Projects,
            json!({ "name": "Deck", "status": "planning", "property_id": "1" }),
        );
        let updated = backend
            .update(
                ResourceKind::Projects,
                &id,
                payload(json!({ "id": "hijack", "status": "in-progress" })),
            )
            .await
            .unwrap();
        assert_eq!(updated["status"], json!("in-progress"));
        assert_eq!(updated["name"], json!("Deck"));
        assert_eq!(id_string(&updated["id"]).as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn failing_resource_only_affects_that_resource() {
        let backend = MemoryBackend::with_properties(vec![property("1")]);
        backend.fail_resource(ResourceKind::Documents, true);

        let err = backend
            .list(ResourceKind::Documents, &query("1"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), NETWORK_UNAVAILABLE);
        assert!(backend
            .list(ResourceKind::Appliances, &query("1"))
            .await
            .is_ok());
        assert_eq!(
            backend.calls(),
            vec!["list:documents".to_string(), "list:appliances".to_string()]
        );
    }

    #[tokio::test]
    async fn set_primary_leaves_exactly_one_primary() {
        let backend = MemoryBackend::with_properties(vec![property("1"), property("2")]);
        backend
            .set_primary_property(&PropertyId::new("2"))
            .await
            .unwrap();
        let properties = backend.list_properties().await.unwrap();
        let primaries: Vec<_> = properties
            .iter()
            .filter(|property| property.is_primary_residence)
            .map(|property| property.id.as_str())
            .collect();
        assert_eq!(primaries, vec!["2"]);
    }
}

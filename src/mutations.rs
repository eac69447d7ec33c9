//! Create, update and delete with a follow-up re-fetch of the touched
//! resource.
//!
//! A mutation that fails validation never reaches the backend. A backend
//! failure is returned untouched and nothing is re-fetched. On success the
//! affected slot goes back to loading before the call returns its result, and
//! the re-fetch is scoped to whatever property is current at that moment.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::backend::Backend;
use crate::coordinator::FetchCoordinator;
use crate::error::{AppError, AppResult, VALIDATION_PROPERTY_REQUIRED};
use crate::model::{RecordId, ResourceKind};
use crate::money::to_storage;
use crate::property_context::PropertyContext;
use crate::validation::{integer, is_blank, numeric, validate, Mode};

/// Fields sent as JSON integers, whatever form the caller used.
fn integer_fields(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::Budgets => &["month", "year"],
        ResourceKind::Documents => &["file_size"],
        _ => &[],
    }
}

/// Fields sent as JSON numbers, untouched by the minor-unit conversion.
fn number_fields(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::Projects => &["budget", "spent"],
        _ => &[],
    }
}

/// Turns validated form text into the numeric shapes the stores decode.
/// Blank optional numbers become null. Form amounts are major units; stores
/// keep whole minor units.
fn to_wire(kind: ResourceKind, payload: &mut Map<String, Value>) {
    for field in integer_fields(kind) {
        let Some(value) = payload.get_mut(*field) else {
            continue;
        };
        if is_blank(value) {
            *value = Value::Null;
        } else if let Some(n) = integer(value) {
            *value = Value::from(n);
        }
    }
    for field in number_fields(kind) {
        let Some(value) = payload.get_mut(*field) else {
            continue;
        };
        if is_blank(value) {
            *value = Value::Null;
        } else if let Some(n) = numeric(value) {
            *value = Value::from(n);
        }
    }
    if kind.has_monetary_amount() {
        if let Some(amount) = payload.get("amount").and_then(numeric) {
            let minor = to_storage(amount).round() as i64;
            payload.insert("amount".into(), Value::from(minor));
        }
    }
}

#[derive(Clone)]
pub struct MutationController {
    backend: Arc<dyn Backend>,
    context: Arc<PropertyContext>,
    coordinator: FetchCoordinator,
}

impl MutationController {
    pub fn new(
        backend: Arc<dyn Backend>,
        context: Arc<PropertyContext>,
        coordinator: FetchCoordinator,
    ) -> Self {
        Self {
            backend,
            context,
            coordinator,
        }
    }

    /// Creates a record. A payload without `property_id` is filed under the
    /// current property.
    pub async fn create(
        &self,
        kind: ResourceKind,
        mut payload: Map<String, Value>,
    ) -> AppResult<Value> {
        let has_property = payload
            .get("property_id")
            .is_some_and(|value| !value.is_null() && value.as_str() != Some(""));
        if !has_property {
            let current = self.context.current_id().ok_or_else(|| {
                AppError::new(
                    VALIDATION_PROPERTY_REQUIRED,
                    "Select a property before adding records",
                )
                .with_context("resource", kind.as_str())
            })?;
            payload.insert("property_id".into(), Value::String(current.into()));
        }
        validate(kind, &payload, Mode::Create)?;
        to_wire(kind, &mut payload);

        let result = self.backend.create(kind, payload).await;
        self.finish(kind, "create", None, result).await
    }

    pub async fn update(
        &self,
        kind: ResourceKind,
        id: &RecordId,
        mut patch: Map<String, Value>,
    ) -> AppResult<Value> {
        validate(kind, &patch, Mode::Update)?;
        to_wire(kind, &mut patch);

        let result = self.backend.update(kind, id, patch).await;
        self.finish(kind, "update", Some(id), result).await
    }

    pub async fn delete(&self, kind: ResourceKind, id: &RecordId) -> AppResult<()> {
        let result = self.backend.delete(kind, id).await;
        self.finish(kind, "delete", Some(id), result).await
    }

    async fn finish<T>(
        &self,
        kind: ResourceKind,
        operation: &'static str,
        id: Option<&RecordId>,
        result: AppResult<T>,
    ) -> AppResult<T> {
        match result {
            Ok(value) => {
                info!(
                    target: "propertypal",
                    event = "mutation_succeeded",
                    resource = kind.as_str(),
                    operation,
                    id = id.map(RecordId::as_str).unwrap_or_default()
                );
                self.coordinator.refresh(kind).settled().await;
                Ok(value)
            }
            Err(err) => {
                warn!(
                    target: "propertypal",
                    event = "mutation_failed",
                    resource = kind.as_str(),
                    operation,
                    code = %err.code(),
                    error = %err
                );
                let err = err
                    .with_context("operation", operation)
                    .with_context("resource", kind.as_str());
                Err(match id {
                    Some(id) => err.with_context("id", id.as_str()),
                    None => err,
                })
            }
        }
    }
}

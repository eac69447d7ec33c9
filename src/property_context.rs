//! The single "current property" shared by every view.
//!
//! The selection is resolved against the last fetched property list and is
//! never left pointing at an id missing from it. Every change is persisted and
//! broadcast on a watch channel before the call returns, so anything that
//! reacts to the notification already sees the new id.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::error::{AppError, AppResult, PROPERTY_NOT_FOUND, PROPERTY_NOT_READY};
use crate::model::{Property, PropertyId};
use crate::selection_store::StoreHandle;

#[derive(Debug, Clone, PartialEq)]
pub enum ContextState {
    Uninitialized,
    Loading,
    Ready {
        properties: Vec<Property>,
        current: PropertyId,
    },
    /// The user owns no properties; nothing downstream may fetch.
    Empty,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    #[error("property not found")]
    NotFound,
    #[error("property list not loaded")]
    NotReady,
}

impl From<SelectError> for AppError {
    fn from(err: SelectError) -> Self {
        match err {
            SelectError::NotFound => AppError::new(PROPERTY_NOT_FOUND, "Property not found"),
            SelectError::NotReady => {
                AppError::new(PROPERTY_NOT_READY, "Properties have not been loaded yet")
            }
        }
    }
}

/// `None` only when there is nothing to choose from.
fn resolve(
    persisted: Option<String>,
    properties: &[Property],
) -> Option<(PropertyId, Option<&'static str>)> {
    let first = properties.first()?.id.clone();
    Some(match persisted {
        Some(candidate) => match properties.iter().find(|p| p.id.as_str() == candidate) {
            Some(property) => (property.id.clone(), None),
            None => (first, Some("not_found")),
        },
        None => (first, Some("missing")),
    })
}

pub struct PropertyContext {
    store: StoreHandle,
    state: RwLock<ContextState>,
    changes: watch::Sender<Option<PropertyId>>,
}

impl PropertyContext {
    pub fn new(store: StoreHandle) -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            store,
            state: RwLock::new(ContextState::Uninitialized),
            changes,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ContextState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ContextState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ContextState {
        self.read().clone()
    }

    /// The id every fetch must be scoped to. Read it per fetch cycle; do not
    /// hold on to it.
    pub fn current_id(&self) -> Option<PropertyId> {
        match &*self.read() {
            ContextState::Ready { current, .. } => Some(current.clone()),
            _ => None,
        }
    }

    pub fn current_property(&self) -> Option<Property> {
        match &*self.read() {
            ContextState::Ready {
                properties,
                current,
            } => properties.iter().find(|p| &p.id == current).cloned(),
            _ => None,
        }
    }

    pub fn properties(&self) -> Vec<Property> {
        match &*self.read() {
            ContextState::Ready { properties, .. } => properties.clone(),
            _ => Vec::new(),
        }
    }

    pub fn primary_property(&self) -> Option<Property> {
        match &*self.read() {
            ContextState::Ready { properties, .. } => properties
                .iter()
                .find(|p| p.is_primary_residence)
                .cloned(),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(*self.read(), ContextState::Empty)
    }

    /// Receives the current id after every change; `None` when nothing is
    /// selected.
    pub fn subscribe(&self) -> watch::Receiver<Option<PropertyId>> {
        self.changes.subscribe()
    }

    fn persist_selection(&self, id: &PropertyId) {
        self.store.write_current(id.as_str());
        if let Err(err) = self.store.persist() {
            warn!(
                target: "propertypal",
                event = "current_property_store_save_failed",
                property_id = %id,
                error = %err
            );
        }
    }

    /// Session start: reads the persisted selection, fetches the property
    /// list and resolves the selection against it.
    ///
    /// On a failed fetch the store returns to `Uninitialized` and the error is
    /// handed back; the persisted id is never trusted without the list.
    pub async fn initialize(&self, backend: &dyn Backend) -> AppResult<Option<PropertyId>> {
        let persisted = self.store.read_current();
        *self.write() = ContextState::Loading;

        let properties = match backend.list_properties().await {
            Ok(properties) => properties,
            Err(err) => {
                *self.write() = ContextState::Uninitialized;
                warn!(
                    target: "propertypal",
                    event = "property_list_failed",
                    code = %err.code(),
                    error = %err
                );
                return Err(err.with_context("operation", "list_properties"));
            }
        };

        Ok(self.apply_properties(properties, persisted))
    }

    fn apply_properties(
        &self,
        properties: Vec<Property>,
        preferred: Option<String>,
    ) -> Option<PropertyId> {
        let Some((current, fallback_reason)) = resolve(preferred, &properties) else {
            *self.write() = ContextState::Empty;
            self.changes.send_replace(None);
            info!(target: "propertypal", event = "property_list_empty");
            return None;
        };
        if let Some(reason) = fallback_reason {
            info!(
                target: "propertypal",
                event = "current_property_fallback",
                reason,
                chosen_id = %current
            );
        }
        self.persist_selection(&current);
        *self.write() = ContextState::Ready {
            properties,
            current: current.clone(),
        };
        self.changes.send_replace(Some(current.clone()));
        Some(current)
    }

    /// Explicit switch by the user. Persists and notifies before returning.
    pub fn select_property(&self, id: &PropertyId) -> Result<(), SelectError> {
        {
            let mut state = self.write();
            match &mut *state {
                ContextState::Ready {
                    properties,
                    current,
                } => {
                    if !properties.iter().any(|p| &p.id == id) {
                        warn!(
                            target: "propertypal",
                            event = "current_property_set_rejected",
                            reason = "not_found",
                            id = %id
                        );
                        return Err(SelectError::NotFound);
                    }
                    *current = id.clone();
                }
                _ => {
                    warn!(
                        target: "propertypal",
                        event = "current_property_set_rejected",
                        reason = "not_ready",
                        id = %id
                    );
                    return Err(SelectError::NotReady);
                }
            }
        }

        self.persist_selection(id);
        self.changes.send_replace(Some(id.clone()));
        info!(target: "propertypal", event = "current_property_selected", property_id = %id);
        Ok(())
    }

    /// Flags `id` as primary, then reloads the list. The current selection
    /// is kept when it still exists. A failure at either step leaves the
    /// state as it was.
    pub async fn set_primary_property(
        &self,
        backend: &dyn Backend,
        id: &PropertyId,
    ) -> AppResult<Option<PropertyId>> {
        backend.set_primary_property(id).await.map_err(|err| {
            err.with_context("operation", "set_primary_property")
                .with_context("property_id", id.as_str())
        })?;

        let properties = backend
            .list_properties()
            .await
            .map_err(|err| err.with_context("operation", "list_properties"))?;
        let preferred = self
            .current_id()
            .map(String::from)
            .or_else(|| self.store.read_current());
        info!(target: "propertypal", event = "primary_property_set", property_id = %id);
        Ok(self.apply_properties(properties, preferred))
    }

    /// Logout: forgets the persisted selection and the property list.
    pub fn reset(&self) -> AppResult<()> {
        *self.write() = ContextState::Uninitialized;
        self.changes.send_replace(None);
        self.store.clear()?;
        info!(target: "propertypal", event = "property_context_reset");
        Ok(())
    }
}

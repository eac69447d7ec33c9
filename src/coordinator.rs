//! Fan-out of per-resource fetches for the current property.
//!
//! Each resource has its own slot in a [`DashboardSnapshot`] and its own
//! spawned task; a slot updates the moment its fetch settles. Results are
//! tagged with the snapshot generation, the property id and the slot sequence
//! at dispatch, and are dropped on arrival if any of them moved on. Nothing is
//! cancelled: superseded tasks finish and their output is discarded.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{Backend, ResourceFilter, ResourceQuery};
use crate::error::{AppError, AppResult, NETWORK_UNAVAILABLE, RESOURCE_DECODE, RESOURCE_FETCH_FAILED};
use crate::model::{
    Appliance, Budget, Document, Expense, MaintenanceItem, MaintenanceStatus, Project, PropertyId,
    ResourceKind,
};
use crate::property_context::PropertyContext;
use crate::time::{month_bounds, Clock};

/// Loading, data and error state of one resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slot<T> {
    pub loading: bool,
    /// `None` until the first fetch settles. A failed fetch leaves an empty
    /// collection here alongside the error.
    pub data: Option<Vec<T>>,
    pub error: Option<String>,
    #[serde(skip)]
    seq: u64,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            loading: false,
            data: None,
            error: None,
            seq: 0,
        }
    }
}

impl<T> Slot<T> {
    pub fn items(&self) -> &[T] {
        self.data.as_deref().unwrap_or(&[])
    }

    pub fn is_settled(&self) -> bool {
        !self.loading
    }

    fn begin(&mut self) -> u64 {
        self.seq += 1;
        self.loading = true;
        self.data = None;
        self.error = None;
        self.seq
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub generation: u64,
    pub property_id: Option<PropertyId>,
    pub maintenance: Slot<MaintenanceItem>,
    pub appliances: Slot<Appliance>,
    pub documents: Slot<Document>,
    pub projects: Slot<Project>,
    pub expenses: Slot<Expense>,
    pub budgets: Slot<Budget>,
}

impl DashboardSnapshot {
    pub fn is_settled(&self) -> bool {
        self.maintenance.is_settled()
            && self.appliances.is_settled()
            && self.documents.is_settled()
            && self.projects.is_settled()
            && self.expenses.is_settled()
            && self.budgets.is_settled()
    }

    pub fn is_loading(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Maintenance => self.maintenance.loading,
            ResourceKind::Appliances => self.appliances.loading,
            ResourceKind::Documents => self.documents.loading,
            ResourceKind::Projects => self.projects.loading,
            ResourceKind::Expenses => self.expenses.loading,
            ResourceKind::Budgets => self.budgets.loading,
        }
    }

    pub fn error(&self, kind: ResourceKind) -> Option<&str> {
        match kind {
            ResourceKind::Maintenance => self.maintenance.error.as_deref(),
            ResourceKind::Appliances => self.appliances.error.as_deref(),
            ResourceKind::Documents => self.documents.error.as_deref(),
            ResourceKind::Projects => self.projects.error.as_deref(),
            ResourceKind::Expenses => self.expenses.error.as_deref(),
            ResourceKind::Budgets => self.budgets.error.as_deref(),
        }
    }
}

/// An entity that lives in one slot of the snapshot.
pub trait Resource: DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn slot(snapshot: &DashboardSnapshot) -> &Slot<Self>;
    fn slot_mut(snapshot: &mut DashboardSnapshot) -> &mut Slot<Self>;
}

macro_rules! resource {
    ($ty:ty, $kind:ident, $field:ident) => {
        impl Resource for $ty {
            const KIND: ResourceKind = ResourceKind::$kind;

            fn slot(snapshot: &DashboardSnapshot) -> &Slot<Self> {
                &snapshot.$field
            }

            fn slot_mut(snapshot: &mut DashboardSnapshot) -> &mut Slot<Self> {
                &mut snapshot.$field
            }
        }
    };
}

resource!(MaintenanceItem, Maintenance, maintenance);
resource!(Appliance, Appliances, appliances);
resource!(Document, Documents, documents);
resource!(Project, Projects, projects);
resource!(Expense, Expenses, expenses);
resource!(Budget, Budgets, budgets);

/// Which filters a view asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ViewScope {
    /// Pending maintenance, this month's expenses and budgets, everything
    /// else unfiltered.
    #[default]
    Dashboard,
    Unfiltered,
    Custom(HashMap<ResourceKind, ResourceFilter>),
}

impl ViewScope {
    pub fn filter(&self, kind: ResourceKind, today: NaiveDate) -> ResourceFilter {
        match self {
            ViewScope::Dashboard => match kind {
                ResourceKind::Maintenance => {
                    ResourceFilter::status(MaintenanceStatus::Pending.as_str())
                }
                ResourceKind::Expenses => match month_bounds(today.year(), today.month()) {
                    Some((first, last)) => ResourceFilter::date_range(Some(first), Some(last)),
                    None => ResourceFilter::default(),
                },
                ResourceKind::Budgets => ResourceFilter::period(today.year(), today.month()),
                _ => ResourceFilter::default(),
            },
            ViewScope::Unfiltered => ResourceFilter::default(),
            ViewScope::Custom(filters) => filters.get(&kind).cloned().unwrap_or_default(),
        }
    }
}

/// Handle on the tasks of one dispatch.
pub struct FetchCycle {
    generation: u64,
    handles: Vec<JoinHandle<()>>,
}

impl FetchCycle {
    fn empty(generation: u64) -> Self {
        Self {
            generation,
            handles: Vec::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `true` when nothing was dispatched.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits until every fetch of this cycle has been applied or discarded.
    pub async fn settled(self) {
        for outcome in futures::future::join_all(self.handles).await {
            if let Err(err) = outcome {
                warn!(target: "propertypal", event = "fetch_task_failed", error = %err);
            }
        }
    }
}

fn decode<R: Resource>(rows: Vec<Value>) -> AppResult<Vec<R>> {
    rows.into_iter()
        .map(serde_json::from_value::<R>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            AppError::new(
                RESOURCE_DECODE,
                format!("Received malformed {} data", R::KIND.as_str()),
            )
            .with_context("resource", R::KIND.as_str())
            .with_cause(err)
        })
}

/// Transport and decode errors keep their code; anything else is reported as
/// a failed load of that resource.
fn slot_error(kind: ResourceKind, err: AppError) -> AppError {
    if err.code() == NETWORK_UNAVAILABLE || err.code() == RESOURCE_DECODE {
        err
    } else {
        AppError::new(
            RESOURCE_FETCH_FAILED,
            format!("Failed to load {}", kind.as_str()),
        )
        .with_context("resource", kind.as_str())
        .with_cause(err)
    }
}

struct Shared {
    backend: Arc<dyn Backend>,
    context: Arc<PropertyContext>,
    clock: Arc<dyn Clock>,
    scope: ViewScope,
    state: watch::Sender<DashboardSnapshot>,
}

impl Shared {
    fn apply<R: Resource>(
        &self,
        generation: u64,
        property_id: &PropertyId,
        seq: u64,
        outcome: AppResult<Vec<R>>,
    ) {
        let still_current = self.context.current_id().as_ref() == Some(property_id);
        let summary = match &outcome {
            Ok(items) => Ok(items.len()),
            Err(err) => Err(err.clone()),
        };

        let applied = still_current
            && self.state.send_if_modified(move |snapshot| {
                if snapshot.generation != generation
                    || snapshot.property_id.as_ref() != Some(property_id)
                {
                    return false;
                }
                let slot = R::slot_mut(snapshot);
                if slot.seq != seq {
                    return false;
                }
                slot.loading = false;
                match outcome {
                    Ok(items) => {
                        slot.data = Some(items);
                        slot.error = None;
                    }
                    Err(err) => {
                        slot.data = Some(Vec::new());
                        slot.error = Some(err.message().to_string());
                    }
                }
                true
            });

        if !applied {
            debug!(
                target: "propertypal",
                event = "fetch_stale_discarded",
                resource = R::KIND.as_str(),
                generation,
                property_id = %property_id
            );
            return;
        }

        match summary {
            Ok(count) => debug!(
                target: "propertypal",
                event = "fetch_settled",
                resource = R::KIND.as_str(),
                generation,
                property_id = %property_id,
                count
            ),
            Err(err) => warn!(
                target: "propertypal",
                event = "fetch_failed",
                resource = R::KIND.as_str(),
                generation,
                property_id = %property_id,
                code = %err.code(),
                error = %err
            ),
        }
    }
}

#[derive(Clone)]
pub struct FetchCoordinator {
    shared: Arc<Shared>,
}

impl FetchCoordinator {
    pub fn new(
        backend: Arc<dyn Backend>,
        context: Arc<PropertyContext>,
        clock: Arc<dyn Clock>,
        scope: ViewScope,
    ) -> Self {
        let (state, _) = watch::channel(DashboardSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                backend,
                context,
                clock,
                scope,
                state,
            }),
        }
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.shared.state.subscribe()
    }

    pub fn scope(&self) -> &ViewScope {
        &self.shared.scope
    }

    /// Discards the snapshot and fans out one fetch per resource for the
    /// current property. With no current property the snapshot is cleared
    /// and nothing is dispatched.
    pub fn load(&self) -> FetchCycle {
        let Some(property_id) = self.shared.context.current_id() else {
            return self.clear();
        };

        let mut generation = 0;
        let mut seqs = [0u64; 6];
        self.shared.state.send_modify(|snapshot| {
            generation = snapshot.generation + 1;
            *snapshot = DashboardSnapshot {
                generation,
                property_id: Some(property_id.clone()),
                ..DashboardSnapshot::default()
            };
            for (idx, kind) in ResourceKind::ALL.into_iter().enumerate() {
                seqs[idx] = begin_slot(snapshot, kind);
            }
        });
        info!(
            target: "propertypal",
            event = "fetch_cycle_started",
            generation,
            property_id = %property_id
        );

        let today = self.shared.clock.today();
        let handles = ResourceKind::ALL
            .into_iter()
            .zip(seqs)
            .map(|(kind, seq)| self.dispatch(kind, generation, &property_id, seq, today))
            .collect();
        FetchCycle {
            generation,
            handles,
        }
    }

    /// Re-fetches one resource for the property current right now. If the
    /// snapshot belongs to another property the whole dashboard is reloaded
    /// instead.
    pub fn refresh(&self, kind: ResourceKind) -> FetchCycle {
        let Some(property_id) = self.shared.context.current_id() else {
            return self.clear();
        };
        let (generation, same_property) = {
            let snapshot = self.shared.state.borrow();
            (
                snapshot.generation,
                snapshot.property_id.as_ref() == Some(&property_id),
            )
        };
        if !same_property {
            return self.load();
        }

        let mut seq = 0;
        self.shared.state.send_modify(|snapshot| {
            seq = begin_slot(snapshot, kind);
        });
        debug!(
            target: "propertypal",
            event = "fetch_refresh",
            resource = kind.as_str(),
            generation,
            property_id = %property_id
        );

        let today = self.shared.clock.today();
        FetchCycle {
            generation,
            handles: vec![self.dispatch(kind, generation, &property_id, seq, today)],
        }
    }

    /// Drops the snapshot; any fetch still in flight will be discarded.
    pub fn clear(&self) -> FetchCycle {
        let mut generation = 0;
        self.shared.state.send_modify(|snapshot| {
            generation = snapshot.generation + 1;
            *snapshot = DashboardSnapshot {
                generation,
                ..DashboardSnapshot::default()
            };
        });
        FetchCycle::empty(generation)
    }

    fn dispatch(
        &self,
        kind: ResourceKind,
        generation: u64,
        property_id: &PropertyId,
        seq: u64,
        today: NaiveDate,
    ) -> JoinHandle<()> {
        let filter = self.shared.scope.filter(kind, today);
        match kind {
            ResourceKind::Maintenance => {
                self.spawn_fetch::<MaintenanceItem>(generation, property_id, seq, filter)
            }
            ResourceKind::Appliances => {
                self.spawn_fetch::<Appliance>(generation, property_id, seq, filter)
            }
            ResourceKind::Documents => {
                self.spawn_fetch::<Document>(generation, property_id, seq, filter)
            }
            ResourceKind::Projects => {
                self.spawn_fetch::<Project>(generation, property_id, seq, filter)
            }
            ResourceKind::Expenses => {
                self.spawn_fetch::<Expense>(generation, property_id, seq, filter)
            }
            ResourceKind::Budgets => {
                self.spawn_fetch::<Budget>(generation, property_id, seq, filter)
            }
        }
    }

    fn spawn_fetch<R: Resource>(
        &self,
        generation: u64,
        property_id: &PropertyId,
        seq: u64,
        filter: ResourceFilter,
    ) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let query = ResourceQuery::new(property_id.clone(), filter);
        tokio::spawn(async move {
            let outcome = shared
                .backend
                .list(R::KIND, &query)
                .await
                .and_then(decode::<R>)
                .map_err(|err| slot_error(R::KIND, err));
            shared.apply::<R>(generation, &query.property_id, seq, outcome);
        })
    }
}

fn begin_slot(snapshot: &mut DashboardSnapshot, kind: ResourceKind) -> u64 {
    match kind {
        ResourceKind::Maintenance => snapshot.maintenance.begin(),
        ResourceKind::Appliances => snapshot.appliances.begin(),
        ResourceKind::Documents => snapshot.documents.begin(),
        ResourceKind::Projects => snapshot.projects.begin(),
        ResourceKind::Expenses => snapshot.expenses.begin(),
        ResourceKind::Budgets => snapshot.budgets.begin(),
    }
}

//! One signed-in session: the property context, the dashboard coordinator
//! and the mutation controller sharing a backend and a clock.

use std::sync::Arc;

use tracing::info;

use crate::backend::Backend;
use crate::coordinator::{FetchCoordinator, FetchCycle, ViewScope};
use crate::error::{AppError, AppResult, PROPERTY_NOT_READY, RESOURCE_FETCH_FAILED};
use crate::model::{PropertyId, ResourceKind};
use crate::mutations::MutationController;
use crate::property_context::PropertyContext;
use crate::reports::{DateRange, FinancialReport};
use crate::selection_store::StoreHandle;
use crate::time::Clock;
use crate::views::{dashboard_view, DashboardView};

pub struct Session {
    backend: Arc<dyn Backend>,
    context: Arc<PropertyContext>,
    coordinator: FetchCoordinator,
    mutations: MutationController,
    clock: Arc<dyn Clock>,
}

impl Session {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: StoreHandle,
        clock: Arc<dyn Clock>,
        scope: ViewScope,
    ) -> Self {
        let context = Arc::new(PropertyContext::new(store));
        let coordinator =
            FetchCoordinator::new(backend.clone(), context.clone(), clock.clone(), scope);
        let mutations = MutationController::new(backend.clone(), context.clone(), coordinator.clone());
        Self {
            backend,
            context,
            coordinator,
            mutations,
            clock,
        }
    }

    pub fn context(&self) -> &PropertyContext {
        &self.context
    }

    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    pub fn mutations(&self) -> &MutationController {
        &self.mutations
    }

    /// Resolves the current property without loading anything for it.
    pub async fn resume(&self) -> AppResult<Option<PropertyId>> {
        let current = self.context.initialize(self.backend.as_ref()).await?;
        info!(
            target: "propertypal",
            event = "session_started",
            property_id = current.as_ref().map(PropertyId::as_str).unwrap_or_default()
        );
        Ok(current)
    }

    /// Resolves the current property, then loads its dashboard. With no
    /// properties the snapshot stays empty and nothing is fetched.
    pub async fn start(&self) -> AppResult<FetchCycle> {
        self.resume().await?;
        Ok(self.coordinator.load())
    }

    /// Switches property and reloads; results still in flight for the old
    /// property are discarded.
    pub fn select_property(&self, id: &PropertyId) -> AppResult<FetchCycle> {
        self.context.select_property(id)?;
        Ok(self.coordinator.load())
    }

    /// Reloads only when the current property changed as a result.
    pub async fn set_primary_property(&self, id: &PropertyId) -> AppResult<Option<FetchCycle>> {
        let before = self.coordinator.snapshot().property_id;
        let after = self
            .context
            .set_primary_property(self.backend.as_ref(), id)
            .await?;
        if after == before {
            return Ok(None);
        }
        Ok(Some(self.coordinator.load()))
    }

    pub fn logout(&self) -> AppResult<()> {
        self.context.reset()?;
        self.coordinator.clear();
        info!(target: "propertypal", event = "session_logged_out");
        Ok(())
    }

    pub fn today(&self) -> chrono::NaiveDate {
        self.clock.today()
    }

    pub fn dashboard(&self) -> DashboardView {
        dashboard_view(&self.coordinator.snapshot(), self.clock.today())
    }

    /// Fetches the expenses of `range` and all budgets for the current
    /// property and aggregates them.
    pub async fn report(&self, range: DateRange) -> AppResult<FinancialReport> {
        let today = self.clock.today();
        if self.context.current_id().is_none() {
            return Err(AppError::new(
                PROPERTY_NOT_READY,
                "No property is selected",
            ));
        }

        let coordinator = FetchCoordinator::new(
            self.backend.clone(),
            self.context.clone(),
            self.clock.clone(),
            range.scope(today),
        );
        coordinator.load().settled().await;
        let snapshot = coordinator.snapshot();
        for kind in [ResourceKind::Expenses, ResourceKind::Budgets] {
            if let Some(message) = snapshot.error(kind) {
                return Err(AppError::new(RESOURCE_FETCH_FAILED, message)
                    .with_context("resource", kind.as_str()));
            }
        }

        Ok(FinancialReport::build(
            range,
            today,
            snapshot.expenses.items(),
            snapshot.budgets.items(),
        ))
    }
}

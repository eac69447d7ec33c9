//! Property-scoped data layer for a homeowner client: which property is
//! current, what has been loaded for it, and how writes refresh what is shown.

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod id;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod money;
pub mod mutations;
pub mod property_context;
pub mod reports;
pub mod selection_store;
pub mod session;
pub mod status;
pub mod time;
pub mod validation;
pub mod views;

pub use backend::{Backend, MemoryBackend, ResourceFilter, ResourceQuery, SqliteBackend};
pub use config::Config;
pub use coordinator::{DashboardSnapshot, FetchCoordinator, FetchCycle, Slot, ViewScope};
pub use error::{AppError, AppResult};
pub use model::{PropertyId, RecordId, ResourceKind};
pub use mutations::MutationController;
pub use property_context::{ContextState, PropertyContext, SelectError};
pub use selection_store::StoreHandle;
pub use session::Session;
pub use time::{Clock, FixedClock, SystemClock};

/// Commit the binary was built from, or `unknown`.
pub fn git_commit_hash() -> &'static str {
    env!("PROPERTYPAL_GIT_HASH")
}

//! Application layer for Hourboost.
//!
//! This crate coordinates the domain types of `hourboost-core` into the
//! farming cluster: the process-wide registry map, startup restore, the
//! command surface and the default event handlers.

pub mod cluster_storage;
pub mod farming_usecase;
pub mod handlers;
pub mod restore;

pub use cluster_storage::{FarmingClusterStorage, UserSummary};
pub use farming_usecase::{FarmingUseCase, PlanChangeReport};
pub use handlers::{CacheCleanupHandler, UsagePersistenceHandler, register_default_handlers};
pub use restore::{AttachFailure, RestoreOrchestrator, RestoreReport};

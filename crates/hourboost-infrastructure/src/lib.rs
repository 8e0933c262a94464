pub mod cache_repository;
pub mod config_service;
pub mod paths;
pub mod plan_repository;
pub mod simulated_client;
pub mod storage;
pub mod users_repository;

pub use crate::cache_repository::JsonCacheRepository;
pub use crate::config_service::ConfigService;
pub use crate::paths::{HourboostPaths, PathError, StoragePaths};
pub use crate::plan_repository::JsonPlanRepository;
pub use crate::simulated_client::{
    SimulatedBehavior, SimulatedConnection, SimulatedConnectionFactory,
};
pub use crate::users_repository::JsonUsersRepository;

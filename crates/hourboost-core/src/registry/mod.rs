//! Per-user account registry.

mod account_registry;
mod outcome;

pub use account_registry::{AccountRegistry, SessionContext, SharedClient};
pub use outcome::{AccountError, PauseReport, RemovedAccount, TrimReport};

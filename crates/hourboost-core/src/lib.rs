pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod plan;
pub mod registry;
pub mod session;
pub mod sync;
pub mod usage;
pub mod user;

#[cfg(test)]
pub(crate) mod testing;

// Re-export common error type
pub use error::{HourboostError, Result};

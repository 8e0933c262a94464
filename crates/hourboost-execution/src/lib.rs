//! Background runtime for Hourboost.
//!
//! Everything that runs on its own schedule lives here: the auto-restart
//! scheduler, the connection watcher, the usage watchdog and the tracing
//! setup that streams lifecycle events.

pub mod restart;
pub mod telemetry;
pub mod tracing_layer;
pub mod usage_watchdog;
pub mod watcher;
pub mod workers;

#[cfg(test)]
mod test_support;

pub use restart::AutoRestartScheduler;
pub use telemetry::init_tracing;
pub use tracing_layer::{LIFECYCLE_TARGET, LifecycleEvent, LifecycleEventLayer};
pub use usage_watchdog::UsageWatchdog;
pub use watcher::ConnectionWatcher;
pub use workers::BackgroundWorkers;

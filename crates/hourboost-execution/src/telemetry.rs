//! Global subscriber setup.

use crate::tracing_layer::{LifecycleEvent, LifecycleEventLayer};
use hourboost_core::config::LoggingSettings;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `settings.level`. With `lifecycle` set, lifecycle
/// events are also forwarded to that channel.
pub fn init_tracing(
    settings: &LoggingSettings,
    lifecycle: Option<mpsc::UnboundedSender<LifecycleEvent>>,
) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json = settings
        .json
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text = (!settings.json).then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .with(lifecycle.map(LifecycleEventLayer::new))
        .try_init()
}

use super::model::{EventKind, FarmEvent};
use crate::error::Result;
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Receives events of the kinds it was registered for.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and in [`EmitReport`] failures.
    fn name(&self) -> &str;

    async fn handle(&self, event: &FarmEvent) -> Result<()>;
}

/// Adapts an async closure into an [`EventHandler`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(FarmEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &FarmEvent) -> Result<()> {
        (self.f)(event.clone()).await
    }
}

/// A handler that returned an error or panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub handler: String,
    pub message: String,
}

/// Outcome of one `emit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitReport {
    pub kind: EventKind,
    pub delivered: usize,
    pub failed: Vec<HandlerFailure>,
}

impl EmitReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// In-process publish/subscribe keyed by [`EventKind`].
///
/// `emit` runs the handlers of one kind sequentially in registration order,
/// awaiting each before starting the next. A failing or panicking handler is
/// logged and skipped; delivery continues with the next one.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<HashMap<EventKind, Vec<Arc<dyn EventHandler>>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn on(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        tracing::debug!(
            event = %kind,
            handler = handler.name(),
            "[EventDispatcher] Handler registered"
        );
        self.handlers
            .write()
            .await
            .entry(kind)
            .or_default()
            .push(handler);
    }

    pub async fn on_fn<F, Fut>(&self, kind: EventKind, name: impl Into<String>, f: F)
    where
        F: Fn(FarmEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on(kind, Arc::new(FnHandler::new(name, f))).await;
    }

    pub async fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .await
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub async fn emit(&self, event: FarmEvent) -> EmitReport {
        let kind = event.kind();
        // Snapshot so handlers may register or emit without deadlocking.
        let handlers = self
            .handlers
            .read()
            .await
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        tracing::debug!(
            event = %kind,
            username = event.username(),
            handlers = handlers.len(),
            "[EventDispatcher] Emitting"
        );

        let mut report = EmitReport {
            kind,
            delivered: 0,
            failed: Vec::new(),
        };

        for handler in handlers {
            let outcome = AssertUnwindSafe(handler.handle(&event)).catch_unwind().await;
            let message = match outcome {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };
            tracing::error!(
                event = %kind,
                handler = handler.name(),
                error = %message,
                "[EventDispatcher] Handler failed"
            );
            report.failed.push(HandlerFailure {
                handler: handler.name().to_string(),
                message,
            });
        }

        report
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod tests;

//! Tracing layer streaming session lifecycle events.
//!
//! Session clients log every state transition and farm stop under the
//! [`LIFECYCLE_TARGET`] target. This layer captures those events and forwards
//! them to a tokio channel, so `hourboost run --events` can print them as JSON
//! lines next to the regular log output.

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Target used by lifecycle log lines.
pub const LIFECYCLE_TARGET: &str = "hourboost::lifecycle";

/// One captured lifecycle event.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LifecycleEvent {
    pub target: String,
    /// Log level (INFO, DEBUG, WARN, ERROR)
    pub level: String,
    pub message: String,
    /// Structured fields, e.g. `account_name`, `from`, `to`
    pub fields: HashMap<String, Value>,
    pub timestamp: String,
}

/// Forwards events whose target starts with [`LIFECYCLE_TARGET`].
pub struct LifecycleEventLayer {
    sender: mpsc::UnboundedSender<LifecycleEvent>,
}

impl LifecycleEventLayer {
    pub fn new(sender: mpsc::UnboundedSender<LifecycleEvent>) -> Self {
        Self { sender }
    }

    /// Creates a layer together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl<S> Layer<S> for LifecycleEventLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let target = event.metadata().target();
        if !target.starts_with(LIFECYCLE_TARGET) {
            return;
        }

        let mut fields = HashMap::new();
        let mut visitor = FieldVisitor(&mut fields);
        event.record(&mut visitor);

        let message = fields
            .remove("message")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        let lifecycle_event = LifecycleEvent {
            target: target.to_string(),
            level: event.metadata().level().to_string(),
            message,
            fields,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        // Receiver gone means nobody is listening any more.
        let _ = self.sender.send(lifecycle_event);
    }
}

/// Field visitor that extracts tracing event fields into a HashMap
struct FieldVisitor<'a>(&'a mut HashMap<String, Value>);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(
            field.name().to_string(),
            serde_json::json!(format!("{:?}", value)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_only_lifecycle_events_are_forwarded() {
        let (layer, mut receiver) = LifecycleEventLayer::channel();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "hourboost::other", "[Other] ignored");
            tracing::info!(
                target: "hourboost::lifecycle",
                account_name = "acc1",
                from = "logged_in",
                to = "farming",
                amount = 5u64,
                "[SessionClient] State transition"
            );
        });

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.level, "INFO");
        assert_eq!(event.message, "[SessionClient] State transition");
        assert_eq!(event.fields["account_name"], "acc1");
        assert_eq!(event.fields["to"], "farming");
        assert_eq!(event.fields["amount"], 5);
        assert!(!event.fields.contains_key("message"));
        assert!(receiver.try_recv().is_err());
    }
}

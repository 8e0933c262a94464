//! Lifecycle events and their in-process dispatcher.

mod dispatcher;
mod model;

pub use dispatcher::{EmitReport, EventDispatcher, EventHandler, FnHandler, HandlerFailure};
pub use model::{EventKind, FarmEvent};

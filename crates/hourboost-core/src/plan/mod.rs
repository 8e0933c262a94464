//! Subscription plans and their limits.

mod model;
mod repository;

pub use model::{Plan, PlanKind, PlanSnapshot};
pub use repository::PlanRepository;

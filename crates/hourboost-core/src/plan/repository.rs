//! Plan repository trait.

use super::model::Plan;
use crate::error::Result;
use async_trait::async_trait;

/// Persistence boundary for plans and their usage ledgers.
///
/// Reads return owned values. Mutating a returned plan has no effect until it
/// is passed back to [`PlanRepository::save`].
#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn get_by_id(&self, plan_id: &str) -> Result<Option<Plan>>;

    /// Finds the active plan of a user.
    async fn get_by_owner(&self, user_id: &str) -> Result<Option<Plan>>;

    async fn save(&self, plan: &Plan) -> Result<()>;
}

//! Default event handlers wired at bootstrap.

use async_trait::async_trait;
use hourboost_core::error::Result;
use hourboost_core::event::{EventDispatcher, EventHandler, EventKind, FarmEvent};
use hourboost_core::plan::PlanRepository;
use hourboost_core::session::CacheRepository;
use hourboost_core::usage::persist_usages_on_database;
use std::sync::Arc;

/// Appends completed farm usage to the plan ledger.
pub struct UsagePersistenceHandler {
    plan_repository: Arc<dyn PlanRepository>,
}

impl UsagePersistenceHandler {
    pub fn new(plan_repository: Arc<dyn PlanRepository>) -> Self {
        Self { plan_repository }
    }
}

#[async_trait]
impl EventHandler for UsagePersistenceHandler {
    fn name(&self) -> &str {
        "persist-usages"
    }

    async fn handle(&self, event: &FarmEvent) -> Result<()> {
        let FarmEvent::UserCompleteFarmSession {
            plan_id, usages, ..
        } = event
        else {
            return Ok(());
        };
        persist_usages_on_database(plan_id, usages, self.plan_repository.as_ref()).await?;
        Ok(())
    }
}

/// Drops every cached entry of a removed account.
pub struct CacheCleanupHandler {
    cache_repository: Arc<dyn CacheRepository>,
}

impl CacheCleanupHandler {
    pub fn new(cache_repository: Arc<dyn CacheRepository>) -> Self {
        Self { cache_repository }
    }
}

#[async_trait]
impl EventHandler for CacheCleanupHandler {
    fn name(&self) -> &str {
        "delete-account-cache"
    }

    async fn handle(&self, event: &FarmEvent) -> Result<()> {
        let FarmEvent::AccountRemoved { account_name, .. } = event else {
            return Ok(());
        };
        self.cache_repository
            .delete_all_entries_from_account(account_name)
            .await?;
        tracing::debug!(
            account_name = %account_name,
            "[CacheCleanupHandler] Cache entries deleted"
        );
        Ok(())
    }
}

/// Registers the handlers every process needs.
pub async fn register_default_handlers(
    dispatcher: &EventDispatcher,
    plan_repository: Arc<dyn PlanRepository>,
    cache_repository: Arc<dyn CacheRepository>,
) {
    dispatcher
        .on(
            EventKind::UserCompleteFarmSession,
            Arc::new(UsagePersistenceHandler::new(plan_repository)),
        )
        .await;
    dispatcher
        .on(
            EventKind::AccountRemoved,
            Arc::new(CacheCleanupHandler::new(cache_repository)),
        )
        .await;
}

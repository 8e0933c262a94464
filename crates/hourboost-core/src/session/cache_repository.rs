//! Cache repository trait.

use super::cache_state::CacheState;
use super::connection::OwnedGame;
use crate::error::Result;
use async_trait::async_trait;

/// Persistence boundary for per-account session snapshots.
///
/// Treated as an eventually-consistent external store: the in-memory session
/// is authoritative for whether an account is farming right now.
#[async_trait]
pub trait CacheRepository: Send + Sync {
    async fn save(&self, state: &CacheState) -> Result<()>;

    async fn get(&self, account_name: &str) -> Result<Option<CacheState>>;

    /// Removes the snapshot, refresh token and games of an account.
    async fn delete_all_entries_from_account(&self, account_name: &str) -> Result<()>;

    async fn set_refresh_token_plan_id(&self, account_name: &str, plan_id: &str) -> Result<()>;

    async fn get_refresh_token(&self, account_name: &str) -> Result<Option<String>>;

    async fn set_refresh_token(&self, account_name: &str, token: &str) -> Result<()>;

    async fn get_account_games(&self, account_name: &str) -> Result<Option<Vec<OwnedGame>>>;

    async fn set_account_games(&self, account_name: &str, games: &[OwnedGame]) -> Result<()>;
}

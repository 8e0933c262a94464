//! JSON-backed [`CacheRepository`].

use crate::storage::{DocumentStore, SnapshotFile};
use async_trait::async_trait;
use hourboost_core::error::Result;
use hourboost_core::session::{CacheRepository, CacheState, OwnedGame};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything cached per account, keyed by account name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheDocument {
    #[serde(default)]
    pub states: BTreeMap<String, CacheState>,
    #[serde(default)]
    pub refresh_tokens: BTreeMap<String, String>,
    #[serde(default)]
    pub games: BTreeMap<String, Vec<OwnedGame>>,
}

pub struct JsonCacheRepository {
    store: DocumentStore<CacheDocument>,
}

impl JsonCacheRepository {
    pub fn in_memory() -> Self {
        Self {
            store: DocumentStore::memory(CacheDocument::default()),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            store: DocumentStore::file(SnapshotFile::new(path)),
        }
    }
}

#[async_trait]
impl CacheRepository for JsonCacheRepository {
    async fn save(&self, state: &CacheState) -> Result<()> {
        let state = state.clone();
        self.store
            .write(move |doc| {
                doc.states.insert(state.account_name.clone(), state);
            })
            .await
    }

    async fn get(&self, account_name: &str) -> Result<Option<CacheState>> {
        let account_name = account_name.to_string();
        self.store
            .read(move |doc| doc.states.get(&account_name).cloned())
            .await
    }

    async fn delete_all_entries_from_account(&self, account_name: &str) -> Result<()> {
        let account_name = account_name.to_string();
        self.store
            .write(move |doc| {
                doc.states.remove(&account_name);
                doc.refresh_tokens.remove(&account_name);
                doc.games.remove(&account_name);
            })
            .await
    }

    async fn set_refresh_token_plan_id(&self, account_name: &str, plan_id: &str) -> Result<()> {
        let account_name = account_name.to_string();
        let plan_id = plan_id.to_string();
        self.store
            .write(move |doc| {
                doc.states
                    .entry(account_name.clone())
                    .or_insert_with(|| CacheState::idle(account_name))
                    .refresh_token_plan_id = Some(plan_id);
            })
            .await
    }

    async fn get_refresh_token(&self, account_name: &str) -> Result<Option<String>> {
        let account_name = account_name.to_string();
        self.store
            .read(move |doc| doc.refresh_tokens.get(&account_name).cloned())
            .await
    }

    async fn set_refresh_token(&self, account_name: &str, token: &str) -> Result<()> {
        let account_name = account_name.to_string();
        let token = token.to_string();
        self.store
            .write(move |doc| {
                doc.refresh_tokens.insert(account_name, token);
            })
            .await
    }

    async fn get_account_games(&self, account_name: &str) -> Result<Option<Vec<OwnedGame>>> {
        let account_name = account_name.to_string();
        self.store
            .read(move |doc| doc.games.get(&account_name).cloned())
            .await
    }

    async fn set_account_games(&self, account_name: &str, games: &[OwnedGame]) -> Result<()> {
        let account_name = account_name.to_string();
        let games = games.to_vec();
        self.store
            .write(move |doc| {
                doc.games.insert(account_name, games);
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn farming(account_name: &str) -> CacheState {
        CacheState {
            account_name: account_name.to_string(),
            is_farming: true,
            farm_started_at: Some(Utc::now()),
            staged_game_list: vec![730],
            refresh_token_plan_id: None,
            usage_flushed: false,
        }
    }

    #[tokio::test]
    async fn test_file_cache_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");

        let repo = JsonCacheRepository::open(&path);
        repo.save(&farming("acc1")).await.unwrap();
        repo.set_refresh_token("acc1", "token").await.unwrap();
        repo.set_refresh_token_plan_id("acc1", "plan-1").await.unwrap();

        let reopened = JsonCacheRepository::open(&path);
        let state = reopened.get("acc1").await.unwrap().unwrap();
        assert!(state.is_resumable());
        assert_eq!(state.refresh_token_plan_id.as_deref(), Some("plan-1"));
        assert_eq!(
            reopened.get_refresh_token("acc1").await.unwrap().as_deref(),
            Some("token")
        );
    }

    #[tokio::test]
    async fn test_delete_all_entries_from_account() {
        let repo = JsonCacheRepository::in_memory();
        repo.save(&farming("acc1")).await.unwrap();
        repo.save(&farming("acc2")).await.unwrap();
        repo.set_refresh_token("acc1", "token").await.unwrap();
        repo.set_account_games(
            "acc1",
            &[OwnedGame {
                app_id: 730,
                name: "CS2".to_string(),
                playtime_forever_mins: 0,
            }],
        )
        .await
        .unwrap();

        repo.delete_all_entries_from_account("acc1").await.unwrap();

        assert!(repo.get("acc1").await.unwrap().is_none());
        assert!(repo.get_refresh_token("acc1").await.unwrap().is_none());
        assert!(repo.get_account_games("acc1").await.unwrap().is_none());
        assert!(repo.get("acc2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_plan_id_creates_idle_entry() {
        let repo = JsonCacheRepository::in_memory();
        repo.set_refresh_token_plan_id("acc9", "plan-2").await.unwrap();

        let state = repo.get("acc9").await.unwrap().unwrap();
        assert!(!state.is_farming);
        assert_eq!(state.refresh_token_plan_id.as_deref(), Some("plan-2"));
    }
}

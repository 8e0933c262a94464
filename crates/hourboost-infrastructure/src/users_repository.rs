//! JSON-backed [`UsersRepository`].

use crate::storage::{DocumentStore, SnapshotFile};
use async_trait::async_trait;
use hourboost_core::error::Result;
use hourboost_core::user::{User, UsersRepository};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsersDocument {
    /// Users in creation order.
    #[serde(default)]
    pub users: Vec<User>,
}

pub struct JsonUsersRepository {
    store: DocumentStore<UsersDocument>,
}

impl JsonUsersRepository {
    pub fn in_memory() -> Self {
        Self::with_users(Vec::new())
    }

    pub fn with_users(users: Vec<User>) -> Self {
        Self {
            store: DocumentStore::memory(UsersDocument { users }),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            store: DocumentStore::file(SnapshotFile::new(path)),
        }
    }
}

#[async_trait]
impl UsersRepository for JsonUsersRepository {
    async fn list_all(&self) -> Result<Vec<User>> {
        self.store.read(|doc| doc.users.clone()).await
    }

    async fn get_by_id(&self, user_id: &str) -> Result<Option<User>> {
        let user_id = user_id.to_string();
        self.store
            .read(move |doc| doc.users.iter().find(|u| u.id == user_id).cloned())
            .await
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let username = username.to_string();
        self.store
            .read(move |doc| doc.users.iter().find(|u| u.username == username).cloned())
            .await
    }

    async fn save(&self, user: &User) -> Result<()> {
        let user = user.clone();
        self.store
            .write(move |doc| match doc.users.iter_mut().find(|u| u.id == user.id) {
                Some(existing) => *existing = user,
                None => doc.users.push(user),
            })
            .await
    }
}

//! Users repository trait.

use super::model::User;
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait UsersRepository: Send + Sync {
    async fn list_all(&self) -> Result<Vec<User>>;

    async fn get_by_id(&self, user_id: &str) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn save(&self, user: &User) -> Result<()>;
}

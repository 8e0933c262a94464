use crate::session::LoginCredentials;
use serde::{Deserialize, Serialize};

/// A steam account a user has attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SteamAccount {
    pub account_name: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub auto_relogin: bool,
}

impl SteamAccount {
    pub fn credentials(&self) -> LoginCredentials {
        LoginCredentials {
            account_name: self.account_name.clone(),
            password: self.password.clone(),
            refresh_token: None,
            auth_code: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub plan_id: String,
    /// Attached accounts, oldest first.
    #[serde(default)]
    pub steam_accounts: Vec<SteamAccount>,
}

impl User {
    pub fn steam_account(&self, account_name: &str) -> Option<&SteamAccount> {
        self.steam_accounts
            .iter()
            .find(|a| a.account_name == account_name)
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a connection needs to log an account on.
///
/// A refresh token, when present, is preferred over the password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub account_name: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// One-time guard code for the next attempt.
    #[serde(default)]
    pub auth_code: Option<String>,
}

impl LoginCredentials {
    pub fn with_password(account_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            password: Some(password.into()),
            refresh_token: None,
            auth_code: None,
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("account_name", &self.account_name)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("auth_code", &self.auth_code.as_ref().map(|_| "***"))
            .finish()
    }
}

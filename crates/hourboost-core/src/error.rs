//! Error types for the farming cluster.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of an error, used by the presentation layer to pick
/// a response family without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    NotFound,
    LimitExceeded,
    UsageExhausted,
    Transport,
    Persistence,
    Invalid,
    Internal,
}

/// A shared error type for the whole farming cluster.
///
/// Expected conditions (missing user storage, plan limits, exhausted usage)
/// are regular variants returned through [`Result`]. Nothing in the core
/// panics for them.
#[derive(Error, Debug, Clone, Serialize)]
pub enum HourboostError {
    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Entity already registered under the same key
    #[error("Entity already exists: {entity_type} '{id}'")]
    AlreadyExists {
        entity_type: &'static str,
        id: String,
    },

    /// The plan does not allow another steam account
    #[error("Account limit reached: plan allows {max} steam accounts")]
    AccountLimitReached { max: usize },

    /// More games requested than the plan allows
    #[error("Too many games: requested {requested}, plan allows {max}")]
    TooManyGames { requested: usize, max: usize },

    /// A capped plan has no farming time left
    #[error("Usage exhausted for plan '{plan_id}'")]
    UsageExhausted { plan_id: String },

    /// Operation not valid for the current session state
    #[error("Invalid state for '{account_name}': cannot {action} while {state}")]
    InvalidState {
        account_name: String,
        state: String,
        action: &'static str,
    },

    /// Failure reported by the underlying game client
    #[error("Transport error ({code}): {message}")]
    Transport { code: String, message: String },

    /// Cache or database write failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Multiple errors
    #[error("Multiple errors occurred ({} total)", .0.len())]
    Multiple(Vec<HourboostError>),
}

impl HourboostError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    pub fn already_exists(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity_type,
            id: id.into(),
        }
    }

    pub fn transport(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Classification
    // ============================================================================

    /// Returns the response family of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AccountLimitReached { .. } | Self::TooManyGames { .. } => {
                ErrorCategory::LimitExceeded
            }
            Self::UsageExhausted { .. } => ErrorCategory::UsageExhausted,
            Self::Transport { .. } => ErrorCategory::Transport,
            Self::Persistence(_) | Self::Io { .. } | Self::Serialization { .. } => {
                ErrorCategory::Persistence
            }
            Self::AlreadyExists { .. } | Self::InvalidState { .. } | Self::Config(_) => {
                ErrorCategory::Invalid
            }
            Self::Internal(_) | Self::Multiple(_) => ErrorCategory::Internal,
        }
    }

    /// Stable machine-readable code for the boundary layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::AccountLimitReached { .. } => "ACCOUNT_LIMIT_REACHED",
            Self::TooManyGames { .. } => "TOO_MANY_GAMES",
            Self::UsageExhausted { .. } => "USAGE_EXHAUSTED",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Persistence(_) | Self::Io { .. } | Self::Serialization { .. } => {
                "PERSISTENCE_ERROR"
            }
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Multiple(_) => "MULTIPLE_ERRORS",
        }
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for plan-limit violations (account or game count).
    pub fn is_limit_exceeded(&self) -> bool {
        self.category() == ErrorCategory::LimitExceeded
    }

    pub fn is_usage_exhausted(&self) -> bool {
        matches!(self, Self::UsageExhausted { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for HourboostError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for HourboostError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for HourboostError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for HourboostError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// A type alias for `Result<T, HourboostError>`.
pub type Result<T> = std::result::Result<T, HourboostError>;

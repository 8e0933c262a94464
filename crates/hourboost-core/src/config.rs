use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root settings document (`hourboost.toml`).
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub farming: FarmingSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FarmingSettings {
    /// How long a login waits for loggedOn/steamGuard/error before giving up.
    #[serde(default = "default_guard_timeout_secs")]
    pub guard_timeout_secs: u64,
    /// Delay before an auto-restart re-login.
    #[serde(default = "default_restart_delay_secs")]
    pub restart_delay_secs: u64,
    /// Interval of the usage watchdog sweep.
    #[serde(default = "default_usage_check_interval_secs")]
    pub usage_check_interval_secs: u64,
    /// Raise a reconnect for accounts that were farming when the process stopped.
    #[serde(default = "default_true")]
    pub resume_on_restore: bool,
}

impl FarmingSettings {
    pub fn guard_timeout(&self) -> Duration {
        Duration::from_secs(self.guard_timeout_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }

    pub fn usage_check_interval(&self) -> Duration {
        Duration::from_secs(self.usage_check_interval_secs.max(1))
    }
}

impl Default for FarmingSettings {
    fn default() -> Self {
        Self {
            guard_timeout_secs: default_guard_timeout_secs(),
            restart_delay_secs: default_restart_delay_secs(),
            usage_check_interval_secs: default_usage_check_interval_secs(),
            resume_on_restore: true,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct StorageSettings {
    /// Overrides the platform data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_guard_timeout_secs() -> u64 {
    30
}

fn default_restart_delay_secs() -> u64 {
    60
}

fn default_usage_check_interval_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

use anyhow::{Context, Result};
use hourboost_application::{
    FarmingClusterStorage, FarmingUseCase, RestoreOrchestrator, register_default_handlers,
};
use hourboost_core::clock::SystemClock;
use hourboost_core::config::Settings;
use hourboost_core::event::EventDispatcher;
use hourboost_core::registry::SessionContext;
use hourboost_infrastructure::{
    ConfigService, JsonCacheRepository, JsonPlanRepository, JsonUsersRepository,
    SimulatedConnectionFactory, StoragePaths,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Loads settings from `config` (or the default location) and applies the
/// command-line data directory override.
pub fn load_settings(config: Option<&Path>, data_dir: Option<PathBuf>) -> Result<Settings> {
    let service = match config {
        Some(path) => ConfigService::with_path(path),
        None => ConfigService::new().context("Failed to locate the settings file")?,
    };
    let mut settings = service
        .get_config()
        .with_context(|| format!("Failed to load settings from {}", service.path().display()))?;
    if let Some(data_dir) = data_dir {
        settings.storage.data_dir = Some(data_dir);
    }
    Ok(settings)
}

/// Process-scoped resources shared by every command.
pub struct AppContext {
    pub settings: Settings,
    pub paths: StoragePaths,
    pub plans: Arc<JsonPlanRepository>,
    pub users: Arc<JsonUsersRepository>,
    pub cache: Arc<JsonCacheRepository>,
    pub usecase: Arc<FarmingUseCase>,
}

impl AppContext {
    pub async fn open(settings: Settings) -> Result<Self> {
        let paths = StoragePaths::from_settings(&settings.storage)?;
        std::fs::create_dir_all(paths.root())
            .with_context(|| format!("Failed to create {}", paths.root().display()))?;
        tracing::debug!(data_dir = %paths.root().display(), "[AppContext] Opening storage");

        let plans = Arc::new(JsonPlanRepository::open(paths.plans_file()));
        let users = Arc::new(JsonUsersRepository::open(paths.users_file()));
        let cache = Arc::new(JsonCacheRepository::open(paths.cache_file()));

        let context = SessionContext {
            connections: Arc::new(SimulatedConnectionFactory::new()),
            clock: Arc::new(SystemClock),
            guard_timeout: settings.farming.guard_timeout(),
        };
        let dispatcher = Arc::new(EventDispatcher::new());
        register_default_handlers(&dispatcher, plans.clone(), cache.clone()).await;

        let usecase = Arc::new(FarmingUseCase::new(
            Arc::new(FarmingClusterStorage::new(context)),
            dispatcher,
            plans.clone(),
            users.clone(),
            cache.clone(),
        ));

        Ok(Self {
            settings,
            paths,
            plans,
            users,
            cache,
            usecase,
        })
    }

    pub fn restore_orchestrator(&self, resume_on_restore: bool) -> RestoreOrchestrator {
        RestoreOrchestrator::new(
            self.usecase.storage().clone(),
            self.usecase.dispatcher().clone(),
            self.users.clone(),
            self.plans.clone(),
            self.cache.clone(),
            resume_on_restore,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_data_dir_flag_overrides_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config = temp_dir.path().join("hourboost.toml");
        std::fs::write(
            &config,
            "[storage]\ndata_dir = \"/var/lib/hourboost\"\n\n[farming]\nrestart_delay_secs = 5\n",
        )
        .unwrap();

        let settings = load_settings(Some(&config), None).unwrap();
        assert_eq!(
            settings.storage.data_dir,
            Some(PathBuf::from("/var/lib/hourboost"))
        );
        assert_eq!(settings.farming.restart_delay_secs, 5);

        let overridden = load_settings(Some(&config), Some(temp_dir.path().join("data"))).unwrap();
        assert_eq!(
            overridden.storage.data_dir,
            Some(temp_dir.path().join("data"))
        );
    }
}

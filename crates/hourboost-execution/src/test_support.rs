use chrono::{Duration, Utc};
use hourboost_application::{FarmingClusterStorage, FarmingUseCase, register_default_handlers};
use hourboost_core::clock::ManualClock;
use hourboost_core::event::EventDispatcher;
use hourboost_core::plan::{Plan, PlanKind, PlanRepository};
use hourboost_core::registry::SessionContext;
use hourboost_core::session::{SessionState, TransportErrorCode};
use hourboost_core::usage::{UsageEntry, UsageLedger};
use hourboost_core::user::{SteamAccount, User};
use hourboost_infrastructure::{
    JsonCacheRepository, JsonPlanRepository, JsonUsersRepository, SimulatedConnection,
    SimulatedConnectionFactory,
};
use std::sync::Arc;

/// A one-user cluster on a capped plan (3600s, auto restart on).
pub struct Cluster {
    pub usecase: Arc<FarmingUseCase>,
    pub connections: Arc<SimulatedConnectionFactory>,
    pub clock: Arc<ManualClock>,
    pub plans: Arc<JsonPlanRepository>,
}

impl Cluster {
    pub async fn new(already_used: u64) -> Self {
        let connections = Arc::new(SimulatedConnectionFactory::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let context = SessionContext {
            connections: connections.clone(),
            clock: clock.clone(),
            guard_timeout: std::time::Duration::from_secs(5),
        };

        let usages = if already_used > 0 {
            UsageLedger::new(vec![UsageEntry::new(
                "old-account",
                already_used,
                Utc::now() - Duration::days(1),
            )])
        } else {
            UsageLedger::default()
        };
        let plans = Arc::new(JsonPlanRepository::with_plans(vec![Plan {
            id: "plan-1".to_string(),
            owner_id: "u1".to_string(),
            name: "Capped".to_string(),
            kind: PlanKind::Usage {
                max_usage_time: 3600,
            },
            max_steam_accounts: 3,
            max_games_allowed: 2,
            auto_restarter: true,
            usages,
        }]));
        let users = Arc::new(JsonUsersRepository::with_users(vec![User {
            id: "u1".to_string(),
            username: "alice".to_string(),
            plan_id: "plan-1".to_string(),
            steam_accounts: Vec::new(),
        }]));
        let cache = Arc::new(JsonCacheRepository::in_memory());

        let dispatcher = Arc::new(EventDispatcher::new());
        register_default_handlers(&dispatcher, plans.clone(), cache.clone()).await;

        let usecase = Arc::new(FarmingUseCase::new(
            Arc::new(FarmingClusterStorage::new(context)),
            dispatcher,
            plans.clone(),
            users,
            cache,
        ));
        Self {
            usecase,
            connections,
            clock,
            plans,
        }
    }

    /// Adds `account_name`, logs it in and starts farming `games`.
    pub async fn farming(&self, account_name: &str, games: Vec<u32>) {
        self.usecase
            .add_account(
                "u1",
                SteamAccount {
                    account_name: account_name.to_string(),
                    password: Some("pw".to_string()),
                    auto_relogin: true,
                },
            )
            .await
            .unwrap();
        self.usecase.login("alice", account_name).await.unwrap();
        self.usecase
            .start_farm("alice", account_name, games)
            .await
            .unwrap();
    }

    /// Drops the connection and reports the error to the cluster.
    pub async fn fail(&self, account_name: &str, code: TransportErrorCode) {
        self.connection(account_name).inject_error(code, "simulated");
        self.usecase
            .handle_client_error("alice", account_name, code, "simulated")
            .await
            .unwrap();
    }

    pub fn connection(&self, account_name: &str) -> Arc<SimulatedConnection> {
        self.connections.connection(account_name).unwrap()
    }

    pub fn advance(&self, secs: i64) {
        self.clock.advance(Duration::seconds(secs));
    }

    pub async fn state(&self, account_name: &str) -> SessionState {
        let client = self
            .usecase
            .storage()
            .get_account_client("alice", account_name)
            .await
            .unwrap();
        let state = client.lock().await.state();
        state
    }

    pub async fn recorded_usage(&self) -> u64 {
        let plan = self.plans.get_by_id("plan-1").await.unwrap().unwrap();
        // Minus the seeded entry.
        plan.usages.total_secs() - plan.usages.total_for_account("old-account")
    }
}

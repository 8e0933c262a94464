use super::context::AppContext;
use anyhow::{Result, bail};
use clap::ValueEnum;
use hourboost_core::plan::{Plan, PlanKind, PlanRepository};
use hourboost_core::usage::UsageLedger;
use hourboost_core::user::{SteamAccount, User, UsersRepository};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlanTier {
    /// Capped farming time
    Usage,
    /// No time ceiling
    Infinity,
}

pub struct BootstrapArgs {
    pub username: String,
    pub plan: PlanTier,
    pub max_usage_secs: u64,
    pub max_accounts: usize,
    pub max_games: usize,
    pub auto_restart: bool,
    pub accounts: Vec<String>,
}

pub async fn run(ctx: &AppContext, args: BootstrapArgs) -> Result<()> {
    if ctx.users.get_by_username(&args.username).await?.is_some() {
        bail!("User '{}' already exists", args.username);
    }
    if args.accounts.len() > args.max_accounts {
        bail!(
            "{} accounts given but the plan allows {}",
            args.accounts.len(),
            args.max_accounts
        );
    }

    let user_id = Uuid::new_v4().to_string();
    let kind = match args.plan {
        PlanTier::Usage => PlanKind::Usage {
            max_usage_time: args.max_usage_secs,
        },
        PlanTier::Infinity => PlanKind::Infinity,
    };
    let plan = Plan {
        id: Uuid::new_v4().to_string(),
        owner_id: user_id.clone(),
        name: format!("{}-{:?}", args.username, args.plan).to_lowercase(),
        kind,
        max_steam_accounts: args.max_accounts,
        max_games_allowed: args.max_games,
        auto_restarter: args.auto_restart,
        usages: UsageLedger::default(),
    };
    ctx.plans.save(&plan).await?;

    let user = User {
        id: user_id,
        username: args.username,
        plan_id: plan.id.clone(),
        steam_accounts: args
            .accounts
            .into_iter()
            .map(|account_name| SteamAccount {
                account_name,
                password: None,
                auto_relogin: true,
            })
            .collect(),
    };
    ctx.users.save(&user).await?;

    println!(
        "Created user '{}' ({}) on plan {} with {} account(s) in {}",
        user.username,
        user.id,
        plan.id,
        user.steam_accounts.len(),
        ctx.paths.root().display()
    );
    Ok(())
}

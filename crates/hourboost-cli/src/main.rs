use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::mpsc;

mod commands;

use commands::bootstrap::{BootstrapArgs, PlanTier};
use commands::context::{AppContext, load_settings};

#[derive(Parser)]
#[command(name = "hourboost")]
#[command(about = "Hourboost - per-user Steam account farming cluster", long_about = None)]
struct Cli {
    /// Settings file. Defaults to $HOURBOOST_CONFIG or the platform config dir
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides `storage.data_dir` from the settings
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a user, its plan and its accounts in the data directory
    Bootstrap {
        #[arg(long)]
        username: String,
        #[arg(long, value_enum, default_value_t = PlanTier::Usage)]
        plan: PlanTier,
        /// Farming time of a usage plan, in seconds
        #[arg(long, default_value_t = 3600)]
        max_usage_secs: u64,
        #[arg(long, default_value_t = 2)]
        max_accounts: usize,
        #[arg(long, default_value_t = 32)]
        max_games: usize,
        #[arg(long)]
        auto_restart: bool,
        /// Account name to attach; repeatable
        #[arg(long = "account")]
        accounts: Vec<String>,
    },
    /// Restore the cluster from storage and print what was restored
    Restore,
    /// Restore the cluster and list users and accounts
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Restore the cluster and keep farming until Ctrl-C
    Run {
        /// Stream lifecycle events as JSON lines on stdout
        #[arg(long)]
        events: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref(), cli.data_dir)?;

    let (lifecycle_tx, lifecycle_rx) = match cli.command {
        Commands::Run { events: true } => {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(rx))
        }
        _ => (None, None),
    };
    hourboost_execution::init_tracing(&settings.logging, lifecycle_tx)
        .context("Failed to install tracing subscriber")?;

    let ctx = AppContext::open(settings).await?;

    match cli.command {
        Commands::Bootstrap {
            username,
            plan,
            max_usage_secs,
            max_accounts,
            max_games,
            auto_restart,
            accounts,
        } => {
            let args = BootstrapArgs {
                username,
                plan,
                max_usage_secs,
                max_accounts,
                max_games,
                auto_restart,
                accounts,
            };
            commands::bootstrap::run(&ctx, args).await?
        }
        Commands::Restore => commands::restore::run(&ctx).await?,
        Commands::Status { json } => commands::status::run(&ctx, json).await?,
        Commands::Run { .. } => commands::run::run(ctx, lifecycle_rx).await?,
    }

    Ok(())
}

use super::context::AppContext;
use anyhow::Result;
use futures::StreamExt;
use hourboost_application::UserSummary;

pub async fn run(ctx: &AppContext, json: bool) -> Result<()> {
    let report = ctx.restore_orchestrator(false).restore().await?;
    let users: Vec<UserSummary> = ctx.usecase.storage().list_users().await.collect().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }

    if users.is_empty() {
        println!("No users in {}", ctx.paths.root().display());
        return Ok(());
    }
    for user in &users {
        println!(
            "{} (plan {}, {}/{} farming)",
            user.username,
            user.plan_id,
            user.farming_count(),
            user.accounts.len()
        );
        for account in &user.accounts {
            let games = if account.games.is_empty() {
                "-".to_string()
            } else {
                account
                    .games
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(",")
            };
            println!(
                "  {:<24} {:<16} games: {}",
                account.account_name,
                account.state.as_str(),
                games
            );
        }
    }
    if !report.attach_failures.is_empty() {
        println!();
        for failure in &report.attach_failures {
            println!(
                "! {}/{}: {} ({})",
                failure.username, failure.account_name, failure.message, failure.code
            );
        }
    }
    Ok(())
}

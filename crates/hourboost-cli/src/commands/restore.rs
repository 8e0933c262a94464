use super::context::AppContext;
use anyhow::Result;

/// Restores without raising reconnects and prints the report as JSON.
pub async fn run(ctx: &AppContext) -> Result<()> {
    let report = ctx.restore_orchestrator(false).restore().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

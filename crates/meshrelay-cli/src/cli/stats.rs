//! `meshrelay stats`: store-wide counters.

use anyhow::Result;
use console::style;

use meshrelay_core::repository::{HistoryRepository, SummaryRepository};

use crate::state::AppState;

pub async fn stats(state: &AppState, json: bool) -> Result<()> {
    let stats = state.history.stats().await?;
    let summaries = state.summaries.list_summaries().await?.len();

    if json {
        let out = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "database": state.db_path.display().to_string(),
            "total_turns": stats.total_turns,
            "unique_users": stats.unique_users,
            "oldest_turn_at": stats.oldest_turn_at,
            "summaries": summaries,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} meshrelay v{}",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("  {}", style("── Conversations ──").dim());
    println!("  Users:     {}", style(stats.unique_users).bold());
    println!("  Turns:     {}", style(stats.total_turns).bold());
    println!("  Summaries: {}", summaries);
    if let Some(oldest) = stats.oldest_turn_at {
        println!("  Oldest:    {}", oldest.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!();
    println!("  {}", style("── System ──").dim());
    println!("  Config:   {}", style(state.config_path.display()).dim());
    println!("  Database: {}", style(state.db_path.display()).dim());
    println!();
    Ok(())
}

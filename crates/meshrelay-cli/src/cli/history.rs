//! `meshrelay history` and `meshrelay reset`.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use meshrelay_core::repository::{HistoryRepository, SummaryRepository};
use meshrelay_types::conversation::{Role, Turn};

use crate::state::AppState;

/// Print a user's turns (optionally only the last `limit`) and summary.
pub async fn show_history(
    state: &AppState,
    user_id: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut turns = state.history.get_history(user_id).await?;
    let total = turns.len();
    if let Some(limit) = limit {
        turns = tail(turns, limit);
    }
    let summary = state.summaries.get_summary(user_id).await?;

    if json {
        let out = serde_json::json!({
            "user_id": user_id,
            "total_turns": total,
            "turns": turns,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    if total == 0 {
        println!("  No history for {}", style(user_id).cyan());
        println!();
        return Ok(());
    }

    println!(
        "  History for {} ({} turns{})",
        style(user_id).cyan(),
        total,
        if turns.len() < total {
            format!(", showing last {}", turns.len())
        } else {
            String::new()
        }
    );
    println!();

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("Time").fg(Color::White),
        Cell::new("Role").fg(Color::White),
        Cell::new("Content").fg(Color::White),
    ]);
    for turn in &turns {
        table.add_row(vec![
            Cell::new(turn.id),
            Cell::new(turn.timestamp.format("%Y-%m-%d %H:%M:%S")),
            role_cell(turn.role),
            Cell::new(&turn.content),
        ]);
    }
    println!("{table}");

    if let Some(summary) = summary {
        println!();
        println!("  {}", style("── Summary ──").dim());
        println!(
            "  Covers first {} turns, updated {}",
            summary.checkpoint_count,
            summary.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!("  {}", summary.text);
    }
    println!();
    Ok(())
}

/// Delete a user's turns and summary.
pub async fn reset_user(state: &AppState, user_id: &str, json: bool) -> Result<()> {
    let deleted = state.history.clear_history(user_id).await?;
    let had_summary = state.summaries.clear_summary(user_id).await?;
    tracing::info!(user_id, deleted, had_summary, "History reset from CLI");

    if json {
        let out = serde_json::json!({
            "user_id": user_id,
            "deleted_turns": deleted,
            "summary_removed": had_summary,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if deleted == 0 && !had_summary {
        println!("  No history to clear for {}", style(user_id).cyan());
    } else {
        println!(
            "  {} Cleared {} messages for {}",
            style("✓").green(),
            deleted,
            style(user_id).cyan()
        );
    }
    Ok(())
}

fn role_cell(role: Role) -> Cell {
    match role {
        Role::User => Cell::new("user").fg(Color::Cyan),
        Role::Assistant => Cell::new("assistant").fg(Color::Green),
    }
}

fn tail(mut turns: Vec<Turn>, limit: usize) -> Vec<Turn> {
    let start = turns.len().saturating_sub(limit);
    turns.split_off(start)
}

//! Memory CLI commands: stats, context, search, record, purge, compact.

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;

use tether_core::retrieval::RetrievalEngine;
use tether_types::memory::{NewIntervention, Outcome, SimilarIntervention, UserId};

use crate::state::AppState;

/// Show live record counts for a user.
///
/// ```bash
/// tether stats alice
/// ```
pub async fn stats(state: &AppState, user: &UserId, json: bool) -> Result<()> {
    let store = state.store(user);
    let stats = store.get_stats().await;

    if json {
        let out = serde_json::json!({
            "user": user.as_str(),
            "interventions": stats.interventions,
            "reflections": stats.reflections,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  Memory for '{}'", style(user).cyan().bold());
    println!();
    println!("  Interventions: {}", style(stats.interventions).bold());
    println!("  Reflections:   {}", style(stats.reflections).bold());
    println!();
    Ok(())
}

/// Print the session-start context block.
pub async fn context(state: &AppState, user: &UserId, json: bool) -> Result<()> {
    let store = state.store(user);
    let block = store.get_context_for_prompt().await;

    if json {
        println!(
            "{}",
            serde_json::json!({"user": user.as_str(), "context": block})
        );
    } else {
        println!("{block}");
    }
    Ok(())
}

/// Semantic search over past interventions.
///
/// ```bash
/// tether search alice "I can't get started on my taxes" -k 3
/// tether search alice "overwhelmed" --all
/// ```
pub async fn search(
    state: &AppState,
    user: &UserId,
    query: &str,
    k: usize,
    all: bool,
    json: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        bail!("Query cannot be empty");
    }
    let store = std::sync::Arc::new(state.store(user));
    let embedder = state.embedder().await?;

    let results = if all {
        let vector = tokio::time::timeout(state.config.timeouts.embed(), embedder.embed(query))
            .await
            .context("Embedding timed out")??;
        store.find_similar(&vector, k, false).await
    } else {
        RetrievalEngine::new(store, embedder, &state.config)
            .similar(query, k)
            .await
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!();
        println!(
            "  {} No similar interventions for '{}'.",
            style("i").blue().bold(),
            style(user).cyan()
        );
        println!();
        return Ok(());
    }

    let threshold = state.config.retrieval.acceptance_threshold;
    println!();
    println!("{}", results_table(&results, threshold));
    println!();
    println!(
        "  {} result{} (acceptance threshold {:.2})",
        style(results.len()).bold(),
        if results.len() == 1 { "" } else { "s" },
        threshold
    );
    println!();
    Ok(())
}

fn results_table(results: &[SimilarIntervention], threshold: f32) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Similarity").fg(Color::White),
        Cell::new("Outcome").fg(Color::White),
        Cell::new("Task").fg(Color::White),
        Cell::new("Context").fg(Color::White),
        Cell::new("Intervention").fg(Color::White),
    ]);

    for r in results {
        let similarity = Cell::new(format!("{:.3}", r.similarity)).fg(if r.similarity >= threshold {
            Color::Green
        } else {
            Color::DarkGrey
        });
        table.add_row(vec![
            similarity,
            outcome_cell(&r.outcome),
            Cell::new(&r.task).fg(Color::Cyan),
            Cell::new(truncate(&r.context, 50)),
            Cell::new(truncate(&r.intervention_text, 60)),
        ]);
    }
    table
}

fn outcome_cell(outcome: &Outcome) -> Cell {
    let color = if outcome.is_successful() {
        Color::Green
    } else if matches!(outcome, Outcome::Abandoned | Outcome::Distracted) {
        Color::Red
    } else {
        Color::Yellow
    };
    Cell::new(outcome.as_str()).fg(color)
}

pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{head}...")
}

/// Embed `context` and store one intervention.
pub async fn record(
    state: &AppState,
    user: &UserId,
    intervention: &str,
    context: &str,
    task: &str,
    outcome: Outcome,
    json: bool,
) -> Result<()> {
    let store = state.store(user);
    let embedder = state.embedder().await?;
    let embedding = tokio::time::timeout(state.config.timeouts.embed(), embedder.embed(context))
        .await
        .context("Embedding timed out")??;

    store.ensure_index().await;
    let key = store
        .record_intervention(NewIntervention {
            intervention_text: intervention.to_string(),
            context: context.to_string(),
            task: task.to_string(),
            outcome: outcome.clone(),
            embedding,
        })
        .await?;

    if json {
        println!(
            "{}",
            serde_json::json!({"key": key.to_string(), "outcome": outcome.as_str()})
        );
    } else {
        println!(
            "  {} Intervention recorded for '{}'",
            style("*").green().bold(),
            style(user).cyan()
        );
        println!("  {}", style(key).dim());
    }
    Ok(())
}

/// Delete all of a user's records, with confirmation.
///
/// ```bash
/// tether purge alice
/// tether purge alice --force
/// ```
pub async fn purge(state: &AppState, user: &UserId, force: bool, json: bool) -> Result<()> {
    let store = state.store(user);
    let stats = store.get_stats().await;

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete {} interventions and {} reflections for '{}'? This cannot be undone.",
                style(stats.interventions).bold(),
                style(stats.reflections).bold(),
                style(user).red().bold()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    let removed = store.purge_user_data().await?;

    if json {
        println!(
            "{}",
            serde_json::json!({"deleted": removed, "user": user.as_str()})
        );
    } else {
        println!(
            "  {} Deleted {} record{} for '{}'.",
            style("x").red().bold(),
            removed,
            if removed == 1 { "" } else { "s" },
            user
        );
    }
    Ok(())
}

/// Remove expired records.
pub async fn compact(state: &AppState, user: &UserId, json: bool) -> Result<()> {
    let removed = state.store(user).purge_expired().await?;

    if json {
        println!(
            "{}",
            serde_json::json!({"removed": removed, "user": user.as_str()})
        );
    } else {
        println!(
            "  {} Removed {} expired record{} for '{}'.",
            style("*").green().bold(),
            removed,
            if removed == 1 { "" } else { "s" },
            user
        );
    }
    Ok(())
}

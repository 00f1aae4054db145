//! Reflection CLI commands: list stored insights, generate one from a transcript.

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use tether_types::memory::UserId;
use tether_types::session::TranscriptMessage;

use super::memory::truncate;
use crate::state::AppState;

/// List the most recent reflections, newest first.
pub async fn list(state: &AppState, user: &UserId, limit: usize, json: bool) -> Result<()> {
    let reflections = state.store(user).get_recent_reflections(limit).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&reflections)?);
        return Ok(());
    }

    if reflections.is_empty() {
        println!();
        println!(
            "  {} No reflections for '{}'. They are written when a session closes.",
            style("i").blue().bold(),
            style(user).cyan(),
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Date").fg(Color::White),
        Cell::new("Insight").fg(Color::White),
        Cell::new("Expires").fg(Color::White),
    ]);
    for r in &reflections {
        table.add_row(vec![
            Cell::new(r.created_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
            Cell::new(truncate(&r.insight, 90)),
            Cell::new(r.expires_at.format("%Y-%m-%d").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("  Reflections for '{}'", style(user).cyan().bold());
    println!();
    println!("{table}");
    println!();
    Ok(())
}

/// Read a transcript file: a JSON array of messages.
pub(crate) async fn read_transcript(path: &Path) -> Result<Vec<TranscriptMessage>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let messages: Vec<TranscriptMessage> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of messages", path.display()))?;
    Ok(messages)
}

/// Summarize a transcript into one insight and store it.
///
/// ```bash
/// tether reflect alice session.json
/// ```
pub async fn reflect(state: &AppState, user: &UserId, transcript: &Path, json: bool) -> Result<()> {
    let messages = read_transcript(transcript).await?;
    if messages.is_empty() {
        bail!("Transcript {} has no messages", transcript.display());
    }

    let store = state.store(user);
    let generator = state.reflection_generator();
    let reflection = generator.generate(&store, &messages).await;

    if json {
        let out = serde_json::json!({
            "user": user.as_str(),
            "insight": reflection.insight,
            "default_insight": reflection.is_default,
            "key": reflection.key.as_ref().map(ToString::to_string),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    if reflection.is_default {
        println!(
            "  {} Summarizer unavailable, stored the default insight.",
            style("!").yellow().bold()
        );
    }
    match &reflection.key {
        Some(key) => println!(
            "  {} Reflection stored {}",
            style("*").green().bold(),
            style(key).dim()
        ),
        None => println!(
            "  {} Reflection generated but could not be stored.",
            style("x").red().bold()
        ),
    }
    println!("  {}", reflection.insight);
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_types::session::Role;

    #[tokio::test]
    async fn test_read_transcript_parses_roles() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.json");
        tokio::fs::write(
            &path,
            r#"[{"role": "user", "content": "I can't start"}, {"role": "assistant", "content": "Tiny step?"}]"#,
        )
        .await
        .unwrap();

        let messages = read_transcript(&path).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].content, "Tiny step?");
    }

    #[tokio::test]
    async fn test_read_transcript_rejects_non_array() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.json");
        tokio::fs::write(&path, r#"{"role": "user"}"#).await.unwrap();
        assert!(read_transcript(&path).await.is_err());
    }
}

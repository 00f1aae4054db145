//! Health check command.

use anyhow::{Result, bail};
use console::style;

use tether_infra::health::check_health;
use tether_types::config::EmbeddingProviderKind;
use tether_types::memory::UserId;

use crate::state::AppState;

/// Ping the vector index and report configuration essentials.
///
/// Exits non-zero when the index is unreachable.
pub async fn health(state: &AppState, user: Option<&UserId>, json: bool) -> Result<()> {
    let report = check_health(&state.index, user).await;
    let api_key = state.has_api_key();
    let embedding = match state.config.providers.embedding {
        EmbeddingProviderKind::Fastembed => "fastembed",
        EmbeddingProviderKind::Gemini => "gemini",
    };

    if json {
        let out = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "index": report,
            "embedding_provider": embedding,
            "dimension": state.config.memory.dimension,
            "summarizer_configured": api_key,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        let check_mark = |ok: bool| {
            if ok {
                format!("{}", style("✓").green())
            } else {
                format!("{}", style("✗").red())
            }
        };

        println!();
        println!("  {} Tether v{}", style("⚡").bold(), env!("CARGO_PKG_VERSION"));
        println!();
        println!(
            "  {} Vector index reachable ({} ms)",
            check_mark(report.index_ok),
            report.latency_ms
        );
        if let (Some(user), Some(exists)) = (user, report.user_index_exists) {
            println!("  {} Semantic index for '{}'", check_mark(exists), style(user).cyan());
        }
        if let Some(error) = &report.error {
            println!("    {}", style(error).red());
        }
        println!(
            "  {} Summarizer API key (${})",
            check_mark(api_key),
            state.config.providers.api_key_env
        );
        println!();
        println!(
            "  Embeddings: {} ({} dims)",
            embedding, state.config.memory.dimension
        );
        println!("  Data dir:   {}", style(state.data_dir.display()).dim());
        println!();
    }

    if !report.index_ok {
        bail!("vector index unreachable");
    }
    Ok(())
}

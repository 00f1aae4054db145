//! Replay a scripted live session against real memory.
//!
//! The script is JSON lines. Provider events use the `LiveEvent` encoding;
//! three extra step types drive the user side:
//!
//! ```text
//! {"type": "user", "text": "I can't start my taxes"}
//! {"type": "utterance", "text": "ugh"}
//! {"type": "wait", "ms": 500}
//! {"type": "text", "text": "Let's find a tiny first step."}
//! {"type": "tool_call", "id": "c1", "name": "create_micro_steps", "args": {"task": "taxes"}}
//! {"type": "turn_complete"}
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use console::style;
use serde::Deserialize;

use tether_core::session::manager::SessionManager;
use tether_core::session::transport::{BoxLiveTransport, LiveTransport};
use tether_core::tools::registry::ToolRegistry;
use tether_types::error::TransportError;
use tether_types::memory::UserId;
use tether_types::session::LiveEvent;

use crate::state::AppState;

const DEFAULT_INSTRUCTIONS: &str =
    "You are a warm, concise support companion helping the user start and finish tasks.";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum UserStep {
    User { text: String },
    Utterance { text: String },
    Wait { ms: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ScriptStep {
    User(String),
    Utterance(String),
    Wait(Duration),
    Event(LiveEvent),
}

/// Parse a script. Blank lines and `#` comments are skipped.
pub(crate) fn parse_script(raw: &str) -> Result<Vec<ScriptStep>> {
    let mut steps = Vec::new();
    for (n, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line)
            .with_context(|| format!("line {}: invalid JSON", n + 1))?;
        let step = match serde_json::from_value::<UserStep>(value.clone()) {
            Ok(UserStep::User { text }) => ScriptStep::User(text),
            Ok(UserStep::Utterance { text }) => ScriptStep::Utterance(text),
            Ok(UserStep::Wait { ms }) => ScriptStep::Wait(Duration::from_millis(ms)),
            Err(_) => ScriptStep::Event(
                serde_json::from_value(value)
                    .with_context(|| format!("line {}: unknown step", n + 1))?,
            ),
        };
        steps.push(step);
    }
    Ok(steps)
}

/// Prints whatever the session would send to the provider.
struct ConsoleTransport {
    quiet: bool,
}

impl LiveTransport for ConsoleTransport {
    async fn send_text(&self, text: &str, turn_complete: bool) -> Result<(), TransportError> {
        if !self.quiet {
            let marker = if turn_complete { ">>" } else { ">" };
            println!("  {} {}", style(marker).green().bold(), text);
        }
        Ok(())
    }

    async fn send_tool_response(
        &self,
        call_id: Option<&str>,
        name: &str,
        result: &str,
    ) -> Result<(), TransportError> {
        if !self.quiet {
            println!(
                "  {} {}{} {}",
                style("tool").magenta().bold(),
                style(name).cyan(),
                call_id.map(|id| format!(" [{id}]")).unwrap_or_default(),
                style(result).dim()
            );
        }
        Ok(())
    }
}

/// Run a script through a full live session, then close it.
///
/// ```bash
/// tether replay alice session.jsonl
/// ```
pub async fn replay(
    state: &AppState,
    user: &UserId,
    script: &Path,
    instructions: Option<&Path>,
    json: bool,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(script)
        .await
        .with_context(|| format!("Failed to read {}", script.display()))?;
    let steps = parse_script(&raw)?;
    if steps.is_empty() {
        bail!("Script {} has no steps", script.display());
    }
    let base = match instructions {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => DEFAULT_INSTRUCTIONS.to_string(),
    };

    let manager = SessionManager::new(
        state.index.clone(),
        state.embedder().await?,
        Arc::new(state.reflection_generator()),
        Arc::new(ToolRegistry::with_builtins()),
        state.config.clone(),
    );
    let transport = BoxLiveTransport::new(ConsoleTransport { quiet: json });
    let (id, opening) = manager.open(user.clone(), transport, &base).await;

    if !json {
        println!();
        println!("  {} Session {}", style("⚡").bold(), style(id).dim());
        println!("  {}", style("── Instructions ──").dim());
        for line in opening.lines() {
            println!("  {}", style(line).dim());
        }
        println!();
    }

    let handle = manager
        .get(&id)
        .context("session vanished after open")?;
    for step in steps {
        let mut session = handle.lock().await;
        match step {
            ScriptStep::User(text) => {
                if !json {
                    println!("  {} {}", style("user").blue().bold(), text);
                }
                session.send_user_text(&text).await?;
            }
            ScriptStep::Utterance(text) => session.note_user_utterance(&text),
            ScriptStep::Wait(duration) => {
                drop(session);
                tokio::time::sleep(duration).await;
            }
            ScriptStep::Event(event) => session.handle_event(event).await?,
        }
    }

    let report = manager
        .close(&id)
        .await
        .context("session was already closed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("  {}", style("── Session ──").dim());
    println!("  Injections:             {}", report.injections);
    println!("  Interventions written:  {}", report.interventions_written);
    if report.interventions_dropped > 0 {
        println!(
            "  Interventions dropped:  {}",
            style(report.interventions_dropped).yellow()
        );
    }
    if report.abandoned_units > 0 {
        println!(
            "  Abandoned at shutdown:  {}",
            style(report.abandoned_units).yellow()
        );
    }
    if let Some(insight) = &report.insight {
        println!();
        println!("  {}", style("── Reflection ──").dim());
        println!("  {insight}");
    }
    println!();
    Ok(())
}

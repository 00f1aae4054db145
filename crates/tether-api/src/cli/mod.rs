//! CLI command definitions for the `tether` binary.
//!
//! Uses clap derive macros for argument parsing. Most commands take the
//! user id as their first positional argument (e.g., `tether stats alice`).

pub mod health;
pub mod memory;
pub mod reflection;
pub mod replay;
pub mod tools;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use tether_types::memory::{Outcome, UserId};

/// Inspect and manage per-user support memory.
#[derive(Parser)]
#[command(name = "tether", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Only log errors. Command output on stdout is unaffected.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "TETHER_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Count live interventions and reflections for a user.
    Stats {
        user: UserId,
    },

    /// Print the static context block a session would start with.
    Context {
        user: UserId,
    },

    /// Semantic search over a user's past interventions.
    Search {
        user: UserId,

        /// Free-text query.
        query: String,

        /// Number of results.
        #[arg(short, default_value = "5")]
        k: usize,

        /// Include unsuccessful outcomes.
        #[arg(long)]
        all: bool,
    },

    /// Manually record an intervention.
    Record {
        user: UserId,

        /// What the agent said or did.
        #[arg(long)]
        intervention: String,

        /// What the user said or the situation. Also the text that gets embedded.
        #[arg(long)]
        context: String,

        #[arg(long, default_value = "general")]
        task: String,

        /// Outcome label (task_started, task_progress, task_completed, re_engaged,
        /// distracted, abandoned, intervention_applied).
        #[arg(long, default_value = "intervention_applied", value_parser = parse_outcome)]
        outcome: Outcome,
    },

    /// List recent reflections for a user.
    Reflections {
        user: UserId,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Generate and store a reflection from a transcript file.
    Reflect {
        user: UserId,

        /// JSON array of `{"role": "user"|"assistant", "content": "..."}` messages.
        transcript: PathBuf,
    },

    /// Delete every record of a user.
    Purge {
        user: UserId,

        /// Skip the confirmation prompt.
        #[arg(long)]
        force: bool,
    },

    /// Physically remove expired records for a user.
    Compact {
        user: UserId,
    },

    /// Check vector index connectivity (and a user's index, if given).
    Health {
        #[arg(long)]
        user: Option<UserId>,
    },

    /// List the built-in support tools.
    Tools,

    /// Drive a live session from a JSON-lines event script.
    Replay {
        user: UserId,

        /// One event per line: `{"type": "user", "text": ...}` or a provider
        /// event (`text`, `tool_call`, `turn_complete`, `audio`).
        script: PathBuf,

        /// File holding the base system instructions.
        #[arg(long)]
        instructions: Option<PathBuf>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Unknown labels are accepted and stored verbatim.
fn parse_outcome(raw: &str) -> Result<Outcome, String> {
    let label = raw.trim();
    if label.is_empty() {
        return Err("outcome cannot be empty".to_string());
    }
    Ok(Outcome::from(label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_record() {
        let cli = Cli::try_parse_from([
            "tether",
            "record",
            "alice",
            "--intervention",
            "Try two minutes",
            "--context",
            "I can't start",
            "--outcome",
            "task_started",
        ])
        .unwrap();
        match cli.command {
            Commands::Record { user, outcome, task, .. } => {
                assert_eq!(user.as_str(), "alice");
                assert_eq!(outcome, Outcome::TaskStarted);
                assert_eq!(task, "general");
            }
            _ => panic!("expected record"),
        }
    }

    #[test]
    fn test_invalid_user_rejected() {
        assert!(Cli::try_parse_from(["tether", "stats", "../etc"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tether", "stats", "bob", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
    }
}

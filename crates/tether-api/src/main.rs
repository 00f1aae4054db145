//! Tether operator CLI entry point.
//!
//! Binary name: `tether`
//!
//! Parses CLI arguments, sets up tracing, opens the memory stack and
//! dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use tether_observe::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&tracing_options(&cli)) {
        eprintln!("Warning: tracing setup failed: {e}");
    }

    let result = run(cli).await;
    shutdown_tracing();
    result
}

/// Logging setup from the global flags. `--quiet` only lowers the log level.
fn tracing_options(cli: &Cli) -> TracingOptions {
    let mut options = TracingOptions::from_verbosity(cli.verbose);
    if cli.quiet && cli.verbose == 0 {
        options.default_filter = "error".to_string();
    }
    if cli.log_json {
        options.format = LogFormat::Json;
    }
    options.enable_otel = cli.otel;
    options
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Neither of these needs the vector store.
    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(*shell, &mut cmd, "tether", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Tools => return cli::tools::list(cli.json),
        _ => {}
    }

    let state = AppState::init().await?;
    let json = cli.json;

    match cli.command {
        Commands::Stats { user } => cli::memory::stats(&state, &user, json).await?,
        Commands::Context { user } => cli::memory::context(&state, &user, json).await?,
        Commands::Search { user, query, k, all } => {
            cli::memory::search(&state, &user, &query, k, all, json).await?;
        }
        Commands::Record {
            user,
            intervention,
            context,
            task,
            outcome,
        } => {
            cli::memory::record(&state, &user, &intervention, &context, &task, outcome, json)
                .await?;
        }
        Commands::Reflections { user, limit } => {
            cli::reflection::list(&state, &user, limit, json).await?;
        }
        Commands::Reflect { user, transcript } => {
            cli::reflection::reflect(&state, &user, &transcript, json).await?;
        }
        Commands::Purge { user, force } => cli::memory::purge(&state, &user, force, json).await?,
        Commands::Compact { user } => cli::memory::compact(&state, &user, json).await?,
        Commands::Health { user } => cli::health::health(&state, user.as_ref(), json).await?,
        Commands::Replay {
            user,
            script,
            instructions,
        } => {
            cli::replay::replay(&state, &user, &script, instructions.as_deref(), json).await?;
        }
        Commands::Completions { .. } | Commands::Tools => unreachable!("handled above"),
    }

    Ok(())
}

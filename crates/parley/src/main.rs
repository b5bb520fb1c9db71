// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley - a Telegram coaching bot.
//!
//! This is the binary entry point: the long-running `serve` process plus
//! admin subcommands that operate directly on the database.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod admin;
mod serve;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use parley_config::model::{AgentConfig, ParleyConfig};
use parley_config::ConfigError;

/// Parley - a Telegram coaching bot.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook gateway, queue workers and digest scheduler.
    Serve,
    /// Inspect and recover the work queue.
    Queue {
        #[command(subcommand)]
        action: QueueCommand,
    },
    /// Manage Parley configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
    /// Depth counters for the main queue and the dead-letter queue.
    Health,
    /// Most recently failed jobs.
    Failed {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Dead-letter entries, most recent first.
    Dlq {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Move a dead-letter entry back onto the main queue.
    Requeue {
        /// Original job id, as shown by `parley queue dlq`.
        job_id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the configuration, then print a summary.
    Check,
}

fn load_config(path: Option<&PathBuf>) -> Result<ParleyConfig, Vec<ConfigError>> {
    match path {
        Some(path) => parley_config::load_and_validate_path(path),
        None => parley_config::load_and_validate(),
    }
}

fn init_tracing(agent: &AgentConfig, default_directive: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("parley={level},{default_directive}", level = agent.log_level))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if agent.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            parley_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Serve => {
            init_tracing(&config.agent, "warn");
            serve::run_serve(config).await
        }
        Commands::Queue { action } => {
            init_tracing(&config.agent, "error");
            admin::run_queue_command(&config, action).await
        }
        Commands::Config {
            action: ConfigCommand::Check,
        } => {
            print_config_summary(&config);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_config_summary(config: &ParleyConfig) {
    let set = |v: &Option<String>| if v.is_some() { "set" } else { "not set" };
    println!("configuration OK");
    println!("  agent.name            {}", config.agent.name);
    println!("  storage.database_path {}", config.storage.database_path);
    println!(
        "  gateway               {}:{} (admin token {})",
        config.gateway.host,
        config.gateway.port,
        set(&config.gateway.admin_token)
    );
    println!("  telegram.bot_token    {}", set(&config.telegram.bot_token));
    println!("  openai.api_key        {}", set(&config.openai.api_key));
    println!(
        "  queue                 {} (concurrency {}, max attempts {})",
        config.queue.name, config.queue.concurrency, config.queue.max_attempts
    );
    if config.digest.enabled {
        println!(
            "  digest                \"{}\" in {}",
            config.digest.schedule, config.digest.timezone
        );
    } else {
        println!("  digest                disabled");
    }
}

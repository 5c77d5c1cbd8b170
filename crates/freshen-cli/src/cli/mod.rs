//! CLI for the freshen content updater.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use freshen_core::config;

use commands::{run_check, run_list, run_reset, run_status, run_sync, Env};

/// Top-level CLI: keeps local content sets in step with their server.
#[derive(Debug, Parser)]
#[command(name = "freshen")]
#[command(about = "freshen: differential, manifest-driven content updater", long_about = None)]
pub struct Cli {
    /// Server to update from instead of `default_server` (also `server` in config.toml).
    #[arg(long, global = true, value_name = "URL")]
    pub server: Option<String>,

    /// Debug-level logging unless RUST_LOG is set.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Check, download and commit updates for the configured loaders.
    Sync {
        /// Only these loaders (repeatable). Default: all, in config order.
        #[arg(long = "loader", value_name = "ID")]
        loaders: Vec<String>,
        /// Do not print download progress.
        #[arg(long)]
        quiet: bool,
    },

    /// Report whether updates are available without downloading anything.
    Check {
        #[arg(long = "loader", value_name = "ID")]
        loaders: Vec<String>,
    },

    /// Show installed manifests and loop-guard state.
    Status,

    /// Erase a loader's installed state and cached files.
    Reset {
        #[arg(long = "loader", value_name = "ID")]
        loaders: Vec<String>,
    },

    /// Print the local URLs of a loader's installed files, in load order.
    List {
        /// Loader identity.
        loader: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let env = Env::new(cfg, self.server.as_deref()).await?;

        match self.command {
            CliCommand::Sync { loaders, quiet } => run_sync(&env, &loaders, quiet).await?,
            CliCommand::Check { loaders } => run_check(&env, &loaders).await?,
            CliCommand::Status => run_status(&env).await?,
            CliCommand::Reset { loaders } => run_reset(&env, &loaders).await?,
            CliCommand::List { loader } => run_list(&env, &loader).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;

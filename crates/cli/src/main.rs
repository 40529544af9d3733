use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

/// rig.lua - declarative workstation provisioner
#[derive(Parser)]
#[command(name = "rig")]
#[command(author, version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Reconcile the system against a configuration file
  Apply {
    /// Path to the configuration file
    #[arg(default_value = "rig.lua")]
    config: String,
  },

  /// Show what changes would be made (dry-run)
  Plan {
    /// Path to the configuration file
    #[arg(default_value = "rig.lua")]
    config: String,

    /// Print the plan as JSON
    #[arg(long)]
    json: bool,
  },

  /// Show host facts and reconciler paths
  Status,

  /// Write a starter rig.lua into the current directory
  Init {
    /// Overwrite an existing rig.lua
    #[arg(short, long)]
    force: bool,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .without_time()
    .init();

  let cli = Cli::parse();

  match cli.command {
    Commands::Apply { config } => cmd::cmd_apply(&config),
    Commands::Plan { config, json } => cmd::cmd_plan(&config, json),
    Commands::Status => cmd::cmd_status(),
    Commands::Init { force } => cmd::cmd_init(force),
  }
}

//! CLI argument definitions using clap.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CONFIG_FILE_NAME;

/// Stratum CLI - schema migrations from model descriptions
#[derive(Parser, Debug)]
#[command(name = "stratum")]
#[command(version)]
#[command(about = "Stratum CLI - schema migrations from model descriptions", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE_NAME, env = "STRATUM_CONFIG")]
    pub config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a new migration for model changes
    Makemigrations(MakemigrationsArgs),

    /// Apply pending migrations
    Migrate(MigrateArgs),

    /// Show applied and pending migrations
    Status(StatusArgs),

    /// Print the actions of a migration
    Show(ShowArgs),

    /// Validate migration history of every engine
    Check(CheckArgs),
}

/// Arguments for the `makemigrations` command
#[derive(Args, Debug)]
pub struct MakemigrationsArgs {
    /// Engine to make migrations for (defaults to every configured engine)
    #[arg(short, long)]
    pub engine: Option<String>,

    /// Label for the migration name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Show the migration without writing it
    #[arg(long)]
    pub dry_run: bool,

    /// Do not warn about actions that drop data
    #[arg(long)]
    pub allow_destructive: bool,
}

/// Arguments for the `migrate` command
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Engine to migrate (defaults to every configured engine)
    #[arg(short, long)]
    pub engine: Option<String>,

    /// Write the rendered SQL to a file instead of stdout
    #[arg(long)]
    pub sql_out: Option<PathBuf>,

    /// List pending migrations without applying them
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `status` command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Engine to report on (defaults to every configured engine)
    #[arg(short, long)]
    pub engine: Option<String>,

    /// Print the status as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `show` command
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Name of the migration
    pub migration: String,

    /// Engine the migration belongs to
    #[arg(short, long)]
    pub engine: Option<String>,
}

/// Arguments for the `check` command
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Engine to check (defaults to every engine with migrations)
    #[arg(short, long)]
    pub engine: Option<String>,
}

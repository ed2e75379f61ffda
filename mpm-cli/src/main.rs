use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mpm_core::install::{DEFAULT_MAX_CONCURRENT, DEFAULT_PLUGINS_DIR, LOCK_FILE};
use mpm_core::manifest::PACKAGE_FILE;

mod commands;
mod progress;

use commands::{Command, Context};

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Which catalogs to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceChoice {
    /// Search and install from every catalog
    Auto,
    Modrinth,
    Hangar,
}

#[derive(Parser, Debug)]
#[clap(
    name = "mpm",
    about = "Plugin manager for Minecraft servers (Modrinth and Hangar)",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Emit logs as JSON
    #[clap(long, global = true)]
    log_json: bool,

    /// Project manifest
    #[clap(long, default_value = PACKAGE_FILE, global = true)]
    package: PathBuf,

    /// Lock file
    #[clap(long, default_value = LOCK_FILE, global = true)]
    lock: PathBuf,

    /// Plugin directory
    #[clap(long, default_value = DEFAULT_PLUGINS_DIR, global = true)]
    dir: PathBuf,

    /// Re-download files that already exist
    #[clap(long, global = true)]
    force: bool,

    /// Catalog to use
    #[clap(long, value_enum, default_value = "auto", global = true)]
    source: SourceChoice,

    /// Fail plugins that only have builds for a compatible platform
    #[clap(long, global = true)]
    no_fallback: bool,

    /// Maximum parallel downloads
    #[clap(long, default_value_t = DEFAULT_MAX_CONCURRENT, global = true)]
    jobs: usize,
}

fn initialize_tracing(log_level: &LogLevel, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr) // stdout is reserved for command output
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr) // stdout is reserved for command output
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level, cli.log_json);

    let ctx = Context {
        package: cli.package,
        lock: cli.lock,
        plugins_dir: cli.dir,
        force: cli.force,
        source: cli.source,
        no_fallback: cli.no_fallback,
        jobs: cli.jobs,
    };

    cli.command.execute(&ctx).await
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
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mpm",
            "install",
            "--jobs",
            "2",
            "--source",
            "hangar",
            "--no-fallback",
        ])
        .unwrap();
        assert_eq!(cli.jobs, 2);
        assert_eq!(cli.source, SourceChoice::Hangar);
        assert!(cli.no_fallback);
        assert_eq!(cli.package, PathBuf::from("package.yml"));
    }
}

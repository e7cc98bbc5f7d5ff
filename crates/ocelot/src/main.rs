//! Ocelot - ML compiler driver
//!
//! CLI driver running closure conversion over lowered programs.

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// ML compiler closure conversion driver
#[derive(Parser, Debug)]
#[command(name = "ocelot")]
#[command(author, version, about = "Run closure conversion over lowered ML programs")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Configuration file (defaults to ./ocelot.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a program and print the result
    Convert(commands::convert::ConvertArgs),

    /// Convert and verify a program, reporting diagnostics
    Check(commands::check::CheckArgs),

    /// Explain a diagnostic code
    Explain(commands::explain::ExplainArgs),
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    // RUST_LOG wins over -v
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    // Determine if colors should be used
    let use_color = !cli.no_color && !cli.quiet && atty::is(atty::Stream::Stdout);

    let Some(command) = cli.command else {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Convert(args) => {
            let config = config::Config::load(cli.config.as_deref())?;
            commands::convert::run(args, config, cli.format, use_color, cli.quiet)
        }
        Commands::Check(args) => {
            let config = config::Config::load(cli.config.as_deref())?;
            commands::check::run(args, config, cli.format, use_color)
        }
        Commands::Explain(args) => commands::explain::run(args, cli.format, use_color),
    }
}

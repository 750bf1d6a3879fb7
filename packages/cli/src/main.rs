mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{bundle, reset, save, show, BundleArgs, ResetArgs, SaveArgs, ShowArgs};
use tracing_subscriber::EnvFilter;

/// Nextbin - headless driver for live code sketches
#[derive(Parser, Debug)]
#[command(name = "nextbin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the current sketch and print the bundle
    Bundle(BundleArgs),

    /// Build the current sketch and save it as a snippet
    Save(SaveArgs),

    /// Print a saved snippet
    Show(ShowArgs),

    /// Forget the local session
    Reset(ResetArgs),
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(err) => {
            eprintln!("{} Cannot get current directory: {}", "Error:".red().bold(), err);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Bundle(args) => bundle(args, &cwd).await,
        Command::Save(args) => save(args, &cwd).await,
        Command::Show(args) => show(args, &cwd).await,
        Command::Reset(args) => reset(args, &cwd).await,
    };

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}

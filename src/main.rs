//! ptyharness - concurrent integration tests for interactive programs
//!
//! Runs a directory of YAML test cases, each in an isolated session that
//! drives a program through a pseudo-terminal, and reports every failure.

use clap::Parser;
use ptyharness::{cli, commands::Commands, common::logging};

#[derive(Parser)]
#[command(name = "ptyharness", about = "Concurrent pty-driven integration test harness")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug-level harness logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.verbose);

    match cli::dispatch(cli.command).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

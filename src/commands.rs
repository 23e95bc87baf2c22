//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run every test case in a directory, each in its own session
    Run {
        /// Directory containing *.yaml test cases
        dir: PathBuf,

        /// Only run cases whose name matches this regex
        #[arg(long, short)]
        filter: Option<String>,

        /// Configuration file (default: platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Keep session work directories after the run
        #[arg(long)]
        keep_workdirs: bool,

        /// Mirror each session's log to a file next to its work directory
        #[arg(long)]
        log_sessions: bool,

        /// Print the report as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List the test cases in a directory
    List {
        /// Directory containing *.yaml test cases
        dir: PathBuf,

        /// Only list cases whose name matches this regex
        #[arg(long, short)]
        filter: Option<String>,
    },

    /// Run a program attached to a pseudo-terminal and exit with its status
    #[command(hide = true)]
    PtyExec {
        /// Program to run
        program: String,

        /// Arguments to pass to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

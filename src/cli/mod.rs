//! CLI command handling
//!
//! Loads test cases and configuration, runs them, and formats output.

use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use regex::Regex;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::orchestrator;
use crate::pty::{self, PtyCommand};
use crate::script::{load_cases, StepEngine};
use crate::session::SessionOptions;

/// Dispatch a CLI command, returning the process exit code
pub async fn dispatch(command: Commands) -> Result<i32> {
    match command {
        Commands::Run {
            dir,
            filter,
            config,
            keep_workdirs,
            log_sessions,
            json,
        } => {
            let mut config = Config::load(config.as_deref())?;
            config.session.keep_workdirs |= keep_workdirs;
            config.session.log_sessions |= log_sessions;

            let cases = load_filtered(&dir, filter.as_deref())?;
            if cases.is_empty() {
                println!("No test cases found in {}", dir.display());
                return Ok(0);
            }

            if !json {
                println!(
                    "\n{} {} test case(s) from {}",
                    "Running".blue().bold(),
                    cases.len(),
                    dir.display()
                );
            }

            let options = SessionOptions::from_config(&config);
            let engine = Arc::new(StepEngine::default());
            let report = orchestrator::run_cases(cases, engine, &options).await?;

            if json {
                println!("{}", report.to_json()?);
            } else {
                report.print();
            }

            match report.result() {
                Ok(()) => Ok(0),
                Err(e) => {
                    tracing::debug!(error = %e, "run failed");
                    Ok(1)
                }
            }
        }

        Commands::List { dir, filter } => {
            let cases = load_filtered(&dir, filter.as_deref())?;
            for case in &cases {
                match &case.description {
                    Some(desc) => println!("{}  {}", case.name.bold(), desc.dimmed()),
                    None => println!("{}", case.name.bold()),
                }
            }
            Ok(0)
        }

        Commands::PtyExec { program, args } => {
            let cmd = PtyCommand::new(program).args(args);
            let code = tokio::task::spawn_blocking(move || pty::launch(&cmd, None))
                .await
                .map_err(|e| Error::Internal(format!("pty-exec task failed: {e}")))?;
            Ok(code)
        }
    }
}

fn load_filtered(dir: &Path, filter: Option<&str>) -> Result<Vec<crate::script::TestCase>> {
    let filter = filter
        .map(Regex::new)
        .transpose()
        .map_err(|e| Error::Config(format!("invalid --filter: {e}")))?;
    load_cases(dir, filter.as_ref())
}

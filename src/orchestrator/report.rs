//! Run summary

use colored::Colorize;
use serde::Serialize;

use super::aggregate::{combine, SessionOutcome};
use crate::common::Result;

/// Outcome of one session, as reported to the user
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    pub duration_ms: Option<u64>,
}

/// Outcome of a whole run; sessions appear in completion order
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub passed: usize,
    pub failed: usize,
    pub sessions: Vec<SessionReport>,
    #[serde(skip)]
    outcomes: Vec<SessionOutcome>,
}

impl RunReport {
    pub fn new(outcomes: Vec<SessionOutcome>) -> Self {
        let sessions: Vec<SessionReport> = outcomes
            .iter()
            .map(|o| SessionReport {
                name: o.id.clone(),
                passed: o.result.is_ok(),
                error: o.result.as_ref().err().map(|e| e.to_string()),
                code: o.result.as_ref().err().map(|e| e.code()),
                duration_ms: o.duration.map(|d| d.as_millis() as u64),
            })
            .collect();
        let passed = sessions.iter().filter(|s| s.passed).count();

        Self {
            passed,
            failed: sessions.len() - passed,
            sessions,
            outcomes,
        }
    }

    pub fn outcomes(&self) -> &[SessionOutcome] {
        &self.outcomes
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }

    /// Single combined result: `Error::Aggregate` with every failure, if any
    pub fn result(&self) -> Result<()> {
        combine(&self.outcomes)
    }

    /// Human-readable summary for the terminal
    pub fn print(&self) {
        println!();
        for session in &self.sessions {
            let timing = session
                .duration_ms
                .map(|ms| format!(" ({} ms)", ms))
                .unwrap_or_default();
            if session.passed {
                println!("  {} {}{}", "✓".green(), session.name, timing.dimmed());
            } else {
                println!("  {} {}{}", "✗".red(), session.name.bold(), timing.dimmed());
                if let Some(error) = &session.error {
                    for line in error.lines() {
                        println!("      {}", line.red());
                    }
                }
            }
        }

        let summary = format!("{} passed, {} failed", self.passed, self.failed);
        if self.success() {
            println!("\n{} {}\n", "✓".green().bold(), summary.green().bold());
        } else {
            println!("\n{} {}\n", "✗".red().bold(), summary.red().bold());
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

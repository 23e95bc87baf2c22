//! Test case file format
//!
//! A test case is a YAML document describing the program to drive, files to
//! seed into the session's work directory, and the steps to run.

use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};

use crate::common::{Error, Result};

/// A complete test case loaded from a YAML file
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestCase {
    /// Name of the test case, also the session id
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// Program driven by the script (argv), run on a pty for the whole session
    pub program: Option<Vec<String>>,
    /// Text typed into the program's terminal once the script has finished
    /// (e.g. a quit command); without it the program must exit on its own
    pub quit: Option<String>,
    /// Extra environment variables for this case
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Files written into the work directory before anything runs
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    /// The sequence of commands to execute
    pub steps: Vec<TestStep>,
    /// File the case was loaded from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// A single script command invocation
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TestStep {
    /// Command name (e.g. "exec", "errlogwait")
    pub cmd: String,
    /// Arguments passed to the command
    #[serde(default)]
    pub args: Vec<String>,
    /// Invert the command's expectation, where the command supports it
    #[serde(default)]
    pub negate: bool,
}

impl std::fmt::Display for TestStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negate {
            write!(f, "! ")?;
        }
        write!(f, "{}", self.cmd)?;
        for arg in &self.args {
            write!(f, " {:?}", arg)?;
        }
        Ok(())
    }
}

impl TestCase {
    /// Parse a test case from YAML text; `origin` is used in error messages
    pub fn parse(content: &str, origin: &str) -> Result<Self> {
        let case: TestCase = serde_yaml::from_str(content).map_err(|e| Error::CaseParse {
            path: origin.to_string(),
            reason: e.to_string(),
        })?;
        case.validate(origin)?;
        Ok(case)
    }

    /// Load a test case from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let mut case = Self::parse(&content, &path.display().to_string())?;
        case.source = Some(path.to_path_buf());
        Ok(case)
    }

    fn validate(&self, origin: &str) -> Result<()> {
        let invalid = |reason: String| Error::CaseParse {
            path: origin.to_string(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty".to_string()));
        }
        if let Some(program) = &self.program {
            if program.is_empty() {
                return Err(invalid("program must have at least one element".to_string()));
            }
        }
        if self.quit.is_some() && self.program.is_none() {
            return Err(invalid("quit requires a program".to_string()));
        }
        for name in self.files.keys() {
            if !is_contained(Path::new(name)) {
                return Err(invalid(format!(
                    "file '{}' must be a relative path inside the work directory",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// True for relative paths that cannot climb out of their base directory
pub(crate) fn is_contained(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Load every `*.yaml` / `*.yml` test case in `dir`, sorted by file name
///
/// When `filter` is given only cases whose name matches are returned.
pub fn load_cases(dir: &Path, filter: Option<&Regex>) -> Result<Vec<TestCase>> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::FileRead {
        path: dir.display().to_string(),
        error: e.to_string(),
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut seen = HashSet::new();
    let mut cases = Vec::new();
    for path in paths {
        let case = TestCase::from_file(&path)?;
        if !seen.insert(case.name.clone()) {
            return Err(Error::CaseParse {
                path: path.display().to_string(),
                reason: format!("duplicate test case name '{}'", case.name),
            });
        }
        if filter.map_or(true, |re| re.is_match(&case.name)) {
            cases.push(case);
        }
    }

    tracing::debug!(dir = %dir.display(), count = cases.len(), "loaded test cases");
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOVER: &str = r#"
name: hover
description: hover shows the type
program: ["sh", "-c", "echo ready; read line"]
quit: "bye\n"
env:
  EDITOR_MODE: test
files:
  main.go: "package main\n"
steps:
  - cmd: errlogwait
    args: ["ready"]
  - cmd: exists
    args: ["main.go"]
    negate: false
"#;

    #[test]
    fn test_parse_case() {
        let case = TestCase::parse(HOVER, "hover.yaml").unwrap();
        assert_eq!(case.name, "hover");
        assert_eq!(case.program.as_ref().unwrap()[0], "sh");
        assert_eq!(case.quit.as_deref(), Some("bye\n"));
        assert_eq!(case.env["EDITOR_MODE"], "test");
        assert_eq!(case.steps.len(), 2);
        assert_eq!(
            case.steps[0],
            TestStep {
                cmd: "errlogwait".to_string(),
                args: vec!["ready".to_string()],
                negate: false,
            }
        );
    }

    #[test]
    fn test_step_display() {
        let step = TestStep {
            cmd: "exec".to_string(),
            args: vec!["false".to_string()],
            negate: true,
        };
        assert_eq!(step.to_string(), "! exec \"false\"");
    }

    #[test]
    fn test_rejects_escaping_files() {
        let yaml = "name: bad\nfiles:\n  ../outside: x\nsteps: []\n";
        let err = TestCase::parse(yaml, "bad.yaml").unwrap_err();
        assert!(matches!(err, Error::CaseParse { .. }));
        assert!(!is_contained(Path::new("/etc/passwd")));
        assert!(is_contained(Path::new("sub/dir/file.txt")));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let yaml = "name: typo\nstep: []\nsteps: []\n";
        assert!(TestCase::parse(yaml, "typo.yaml").is_err());
    }

    #[test]
    fn test_quit_requires_program() {
        let yaml = "name: q\nquit: \"x\"\nsteps: []\n";
        assert!(TestCase::parse(yaml, "q.yaml").is_err());
    }

    #[test]
    fn test_load_cases_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yaml"), "name: beta\nsteps: []\n").unwrap();
        std::fs::write(dir.path().join("a.yml"), "name: alpha\nsteps: []\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let all = load_cases(dir.path(), None).unwrap();
        let names: Vec<_> = all.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert!(all[0].source.is_some());

        let re = Regex::new("^be").unwrap();
        let filtered = load_cases(dir.path(), Some(&re)).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "beta");
    }

    #[test]
    fn test_load_cases_rejects_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.yaml"), "name: same\nsteps: []\n").unwrap();
        std::fs::write(dir.path().join("two.yaml"), "name: same\nsteps: []\n").unwrap();

        let err = load_cases(dir.path(), None).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}

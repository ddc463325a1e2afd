//! Runs model-written code in a sandbox and folds the outcome into a textual summary.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::{
    printer::Reporter,
    sandbox::{ExecutionOutcome, Logs, ResultEntry, Sandbox},
};

pub mod artifacts;

pub use artifacts::ArtifactStore;

pub const NO_OUTPUT: &str = "There was no output of the execution.";

/// What one code execution produced, ready to show the user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interpretation {
    pub results: Vec<ResultEntry>,
    pub logs: Logs,
    pub summary: String,
    pub saved_files: Vec<PathBuf>,
}

impl Interpretation {
    /// Outcome with nothing but a summary line.
    pub fn message(summary: impl Into<String>) -> Self {
        Self { summary: summary.into(), ..Self::default() }
    }
}

/// Borrowed context for interpreting one turn's execution.
pub struct Interpreter<'a> {
    pub sandbox: &'a dyn Sandbox,
    pub store: &'a ArtifactStore,
    pub reporter: &'a dyn Reporter,
}

impl<'a> Interpreter<'a> {
    pub fn new(sandbox: &'a dyn Sandbox, store: &'a ArtifactStore, reporter: &'a dyn Reporter) -> Self {
        Self { sandbox, store, reporter }
    }

    /// Submits `code` as one notebook cell and normalizes what comes back.
    pub async fn run(&self, code: &str) -> Result<Interpretation> {
        self.reporter.code(code);
        let outcome = self
            .sandbox
            .execute_cell(code)
            .await
            .with_context(|| format!("executing code in sandbox {}", self.sandbox.id()))?;
        Ok(self.normalize(outcome).await)
    }

    pub async fn normalize(&self, outcome: ExecutionOutcome) -> Interpretation {
        if let Some(err) = &outcome.error {
            let summary = format!(
                "There was an error during execution: {}: {}.\n{}",
                err.name, err.value, err.traceback
            );
            self.reporter.execution_error(&summary);
            return Interpretation::message(summary);
        }

        let mut summary = String::new();
        let mut saved_files = Vec::new();

        for (i, entry) in outcome.results.iter().enumerate() {
            let n = i + 1;
            let label = if entry.is_main_result { "Main result" } else { "Display data" };
            let _ = write!(summary, "Result {}:\n[{}]: {}\n", n, label, entry.text);
            saved_files.extend(self.store.materialize(self.sandbox, self.reporter, entry, n).await);
        }
        if !summary.is_empty() {
            self.reporter.results(&summary);
        }

        if let Some(logs) = format_logs(&outcome.logs) {
            self.reporter.logs(&logs);
            summary.push_str(&logs);
        }

        if summary.is_empty() {
            summary = NO_OUTPUT.to_string();
            self.reporter.no_output(&summary);
        }

        Interpretation { results: outcome.results, logs: outcome.logs, summary, saved_files }
    }
}

fn format_logs(logs: &Logs) -> Option<String> {
    if logs.is_empty() {
        return None;
    }
    let mut text = String::from("Logs:\n");
    if !logs.stdout.is_empty() {
        let _ = writeln!(text, "Stdout: {}", logs.stdout.join(" "));
    }
    if !logs.stderr.is_empty() {
        let _ = writeln!(text, "Stderr: {}", logs.stderr.join(" "));
    }
    Some(text)
}

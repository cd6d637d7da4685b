//! The `ActionRunner` trait — the contract every action source must fulfil.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ActionError;

/// Context handed to a runner for one action execution.
///
/// Defined here (in the actions crate) so both the engine and individual
/// runners can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// ID of the workflow run this action belongs to.
    pub run_id: uuid::Uuid,
    /// Name of the workflow being run.
    pub workflow: String,
    /// Name of the action being run.
    pub action: String,
    /// The event that triggered the run, e.g. `push`.
    pub event: String,
    /// Repository checkout the action operates on.
    pub workspace: PathBuf,
    /// Extra environment variables declared on the action.
    pub env: BTreeMap<String, String>,
}

/// Exit status of an action command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ExitStatus {
    pub const SUCCESS: ExitStatus = ExitStatus { code: Some(0) };

    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self { code: status.code() }
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// What an action produced: its exit status and captured logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ActionOutput {
    pub fn from_status(status: ExitStatus) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

impl From<std::process::Output> for ActionOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            status: output.status.into(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// The core runner trait.
///
/// One implementation per supported action source.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    /// Run the action's `args` in an isolated environment and report how it
    /// exited.
    async fn run(&self, args: &str, ctx: &ExecutionContext) -> Result<ActionOutput, ActionError>;
}

//! Engine-level error types.

use thiserror::Error;

/// Errors produced by the workflow engine (loading + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Load-time errors ------

    /// A declaration is malformed (bad name, duplicate, unreadable file, ...).
    #[error("config error: {0}")]
    Config(String),

    /// A `resolves` or `needs` list names an action that was never declared.
    #[error("reference error: {referrer} references undeclared action '{target}'")]
    Reference { referrer: String, target: String },

    /// The action graph is not acyclic.
    #[error("cycle error: {}", path.join(" -> "))]
    Cycle {
        /// The cycle, starting and ending with the same action.
        path: Vec<String>,
    },

    // ------ Execution errors ------

    /// An action did not finish successfully.
    #[error("action '{action}' failed: {message}")]
    Execution { action: String, message: String },
}

impl EngineError {
    /// Load-time errors are reported before anything runs.
    pub fn is_load_error(&self) -> bool {
        !matches!(self, Self::Execution { .. })
    }
}

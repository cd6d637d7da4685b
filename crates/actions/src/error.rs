//! Action-level error type.

use std::time::Duration;

use thiserror::Error;

/// Errors returned when an action could not produce an exit status.
///
/// A command that runs and exits non-zero is *not* an error at this level;
/// it is an [`ActionOutput`](crate::ActionOutput) with a failing status.
/// The engine turns both into a `Failed` action.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The process could not be started.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure while preparing or running the action.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The action ran longer than the configured timeout.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The run was cancelled while the action was in flight.
    #[error("cancelled")]
    Cancelled,

    /// The runner panicked.
    #[error("runner panicked: {0}")]
    Panicked(String),

    /// No runner can serve this `uses` reference.
    #[error("unsupported action source '{0}'")]
    UnsupportedSource(String),
}

impl ActionError {
    /// Whether another attempt could change the outcome.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::UnsupportedSource(_))
    }
}

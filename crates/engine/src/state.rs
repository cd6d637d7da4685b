//! Per-action state machine.
//!
//! ```text
//! Pending ──► Running ──► Succeeded
//!    │            └─────► Failed
//!    └──────► Skipped
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Lifecycle state of one action within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl ActionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    pub fn can_transition_to(self, next: ActionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Skipped)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"   => Ok(Self::Pending),
            "running"   => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed"    => Ok(Self::Failed),
            "skipped"   => Ok(Self::Skipped),
            other       => Err(format!("unknown action status: {other}")),
        }
    }
}

/// Current state of every action in a run.
#[derive(Debug, Clone, Default)]
pub struct StateTable {
    states: HashMap<String, ActionStatus>,
}

impl StateTable {
    /// Every named action starts `Pending`.
    pub fn new<I: IntoIterator<Item = String>>(actions: I) -> Self {
        Self {
            states: actions
                .into_iter()
                .map(|name| (name, ActionStatus::Pending))
                .collect(),
        }
    }

    pub fn get(&self, action: &str) -> Option<ActionStatus> {
        self.states.get(action).copied()
    }

    /// Apply a transition; illegal ones are refused and logged.
    pub fn transition(&mut self, action: &str, next: ActionStatus) -> bool {
        match self.states.get_mut(action) {
            Some(current) if current.can_transition_to(next) => {
                *current = next;
                true
            }
            Some(current) => {
                warn!(action, from = %current, to = %next, "refusing illegal state transition");
                false
            }
            None => {
                warn!(action, "state transition for unknown action");
                false
            }
        }
    }

    /// `Pending` with every upstream `Succeeded`.
    pub fn is_ready(&self, action: &str, upstream: &[String]) -> bool {
        self.get(action) == Some(ActionStatus::Pending)
            && upstream
                .iter()
                .all(|u| self.get(u) == Some(ActionStatus::Succeeded))
    }

    pub fn all_terminal(&self) -> bool {
        self.states.values().all(|s| s.is_terminal())
    }

    pub fn count(&self, status: ActionStatus) -> usize {
        self.states.values().filter(|&&s| s == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ActionStatus::*;

    #[test]
    fn legal_transitions() {
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Skipped));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));
    }

    #[test]
    fn skipped_action_never_runs() {
        assert!(!Skipped.can_transition_to(Running));
        assert!(!Pending.can_transition_to(Succeeded));
        assert!(!Running.can_transition_to(Skipped));
        for terminal in [Succeeded, Failed, Skipped] {
            assert!(terminal.is_terminal());
            for next in [Pending, Running, Succeeded, Failed, Skipped] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn readiness_requires_all_upstream_succeeded() {
        let mut table = StateTable::new(["a", "b", "c"].map(String::from));
        let upstream = vec!["a".to_owned(), "b".to_owned()];
        assert!(!table.is_ready("c", &upstream));

        assert!(table.transition("a", Running));
        assert!(table.transition("a", Succeeded));
        assert!(!table.is_ready("c", &upstream));

        assert!(table.transition("b", Running));
        assert!(table.transition("b", Succeeded));
        assert!(table.is_ready("c", &upstream));
    }

    #[test]
    fn illegal_transition_is_refused() {
        let mut table = StateTable::new(["a".to_owned()]);
        assert!(table.transition("a", Skipped));
        assert!(!table.transition("a", Running));
        assert_eq!(table.get("a"), Some(Skipped));
        assert!(!table.transition("ghost", Running));
        assert!(table.all_terminal());
        assert_eq!(table.count(Skipped), 1);
    }

    #[test]
    fn status_names_parse_back() {
        for status in [Pending, Running, Succeeded, Failed, Skipped] {
            assert_eq!(status.to_string().parse::<ActionStatus>(), Ok(status));
        }
    }
}

//! Result aggregation for workflow runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Event;
use crate::state::ActionStatus;

/// Overall outcome of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal record of one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReport {
    pub name: String,
    pub uses: String,
    pub status: ActionStatus,
    /// `None` if the action never produced an exit status.
    pub exit_code: Option<i32>,
    pub attempts: u32,
    pub stdout: String,
    pub stderr: String,
    /// Why the action failed or was skipped.
    pub reason: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ActionReport {
    pub fn pending(name: impl Into<String>, uses: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uses: uses.into(),
            status: ActionStatus::Pending,
            exit_code: None,
            attempts: 0,
            stdout: String::new(),
            stderr: String::new(),
            reason: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// The result of running a full workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub workflow: String,
    pub event: Event,
    pub status: RunStatus,
    /// Whether the run was cancelled before it finished.
    pub cancelled: bool,
    /// One entry per planned action, in topological order.
    pub actions: Vec<ActionReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn action(&self, name: &str) -> Option<&ActionReport> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// `(name, status)` pairs, in plan order.
    pub fn statuses(&self) -> Vec<(&str, ActionStatus)> {
        self.actions
            .iter()
            .map(|a| (a.name.as_str(), a.status))
            .collect()
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

/// A run succeeds iff every action succeeded.
pub fn aggregate<I: IntoIterator<Item = ActionStatus>>(statuses: I) -> RunStatus {
    if statuses
        .into_iter()
        .all(|status| status == ActionStatus::Succeeded)
    {
        RunStatus::Succeeded
    } else {
        RunStatus::Failed
    }
}

/// Process exit code for a set of runs: 0 if all succeeded, 1 otherwise.
pub fn exit_code(reports: &[RunReport]) -> i32 {
    if reports.iter().all(RunReport::succeeded) {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ActionStatus::*;

    fn run(status: RunStatus) -> RunReport {
        let now = Utc::now();
        RunReport {
            run_id: Uuid::new_v4(),
            workflow: "ci".into(),
            event: Event::Push,
            status,
            cancelled: false,
            actions: vec![],
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn all_succeeded_aggregates_to_success() {
        assert_eq!(aggregate([Succeeded, Succeeded]), RunStatus::Succeeded);
    }

    #[test]
    fn any_other_status_aggregates_to_failure() {
        assert_eq!(aggregate([Succeeded, Failed]), RunStatus::Failed);
        assert_eq!(aggregate([Succeeded, Skipped]), RunStatus::Failed);
        assert_eq!(aggregate([Pending]), RunStatus::Failed);
    }

    #[test]
    fn exit_code_is_zero_only_when_every_run_succeeds() {
        assert_eq!(exit_code(&[]), 0);
        assert_eq!(exit_code(&[run(RunStatus::Succeeded)]), 0);
        assert_eq!(
            exit_code(&[run(RunStatus::Succeeded), run(RunStatus::Failed)]),
            1
        );
    }

    #[test]
    fn report_serialises_statuses_in_snake_case() {
        let mut report = run(RunStatus::Failed);
        let mut action = ActionReport::pending("test", "sh");
        action.status = Skipped;
        report.actions.push(action);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["event"], "push");
        assert_eq!(json["actions"][0]["status"], "skipped");
    }
}

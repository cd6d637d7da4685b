//! Core domain models for the workflow engine.
//!
//! Two layers live here:
//! - *Declarations* (`Declarations`, `WorkflowDecl`, `ActionDecl`) are the
//!   raw, serde-deserialised contents of a workflow file.  Nothing about them
//!   is validated.
//! - *Validated* models (`Workflow`, `Action`) are only produced by
//!   [`ActionGraph::build`](crate::dag::ActionGraph::build) and are
//!   immutable afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Repository events a workflow can be triggered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    Push,
    PullRequest,
    Release,
    Schedule,
    WorkflowDispatch,
    RepositoryDispatch,
}

impl Event {
    pub const ALL: [Event; 6] = [
        Event::Push,
        Event::PullRequest,
        Event::Release,
        Event::Schedule,
        Event::WorkflowDispatch,
        Event::RepositoryDispatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::PullRequest => "pull_request",
            Self::Release => "release",
            Self::Schedule => "schedule",
            Self::WorkflowDispatch => "workflow_dispatch",
            Self::RepositoryDispatch => "repository_dispatch",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Event {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s.trim())
            .ok_or_else(|| format!("unknown event: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// A `workflow "<name>" { on = ..., resolves = [...] }` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowDecl {
    pub name: String,
    pub on: String,
    #[serde(default)]
    pub resolves: Vec<String>,
}

impl WorkflowDecl {
    pub fn new<I, S>(name: impl Into<String>, on: impl Into<String>, resolves: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            on: on.into(),
            resolves: resolves.into_iter().map(Into::into).collect(),
        }
    }
}

/// An `action "<name>" { uses = ..., args = ... }` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionDecl {
    pub name: String,
    pub uses: String,
    #[serde(default)]
    pub args: String,
    /// Actions to run after this one succeeds.
    #[serde(default)]
    pub resolves: Vec<String>,
    /// Actions that must succeed before this one runs.
    #[serde(default)]
    pub needs: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ActionDecl {
    pub fn new(name: impl Into<String>, uses: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uses: uses.into(),
            args: args.into(),
            resolves: Vec::new(),
            needs: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn resolves<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resolves.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn needs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.needs.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// The full contents of a workflow file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Declarations {
    #[serde(default)]
    pub workflows: Vec<WorkflowDecl>,
    #[serde(default)]
    pub actions: Vec<ActionDecl>,
}

impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workflow(mut self, workflow: WorkflowDecl) -> Self {
        self.workflows.push(workflow);
        self
    }

    pub fn action(mut self, action: ActionDecl) -> Self {
        self.actions.push(action);
        self
    }
}

// ---------------------------------------------------------------------------
// Validated models
// ---------------------------------------------------------------------------

/// A validated workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workflow {
    pub name: String,
    pub on: Event,
    /// Entry actions, in declaration order.
    pub resolves: Vec<String>,
}

/// A validated action.  Its edges live in the graph, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub name: String,
    pub uses: String,
    pub args: String,
    pub env: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_round_trip_through_their_names() {
        for event in Event::ALL {
            assert_eq!(event.as_str().parse::<Event>(), Ok(event));
        }
        assert!("deploy".parse::<Event>().is_err());
    }

    #[test]
    fn action_defaults_apply_when_fields_are_omitted() {
        let decls: Declarations = serde_json::from_str(
            r#"{ "actions": [{ "name": "fmt", "uses": "sh" }] }"#,
        )
        .unwrap();

        assert!(decls.workflows.is_empty());
        assert_eq!(decls.actions[0], ActionDecl::new("fmt", "sh", ""));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<Declarations, _> = serde_json::from_str(
            r#"{ "actions": [{ "name": "fmt", "uses": "sh", "argz": "typo" }] }"#,
        );
        assert!(result.is_err());
    }
}

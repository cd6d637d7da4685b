//! Action graph construction and validation — run this before executing
//! anything.
//!
//! Rules enforced by [`ActionGraph::build`]:
//! 1. Workflow and action names are non-empty and unique; every action has a
//!    `uses` reference; every workflow has an `on` event we support and at
//!    least one entry in `resolves`.
//! 2. Every `resolves`/`needs` entry names a declared action.
//! 3. The directed action graph is acyclic (DFS with recursion-stack
//!    marking).
//!
//! The resulting graph is immutable.  Reloading means building a new one.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use serde::Serialize;

use crate::models::{Action, ActionDecl, Declarations, Event, Workflow};
use crate::EngineError;

/// Validated workflows plus the action DAG they run over.
#[derive(Debug, Clone)]
pub struct ActionGraph {
    workflows: Vec<Workflow>,
    actions: Vec<Action>,
    index: HashMap<String, usize>,
    /// Adjacency list: action index -> downstream action indices.
    downstream: Vec<Vec<usize>>,
    /// Reverse adjacency: action index -> upstream action indices.
    upstream: Vec<Vec<usize>>,
    /// All action indices in topological order.
    order: Vec<usize>,
}

/// What a single workflow run has to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    pub workflow: String,
    pub event: Event,
    /// Steps in topological order.
    pub steps: Vec<PlanStep>,
}

/// One action inside an [`ExecutionPlan`], with its edges restricted to the
/// plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    pub action: Action,
    pub upstream: Vec<String>,
    pub downstream: Vec<String>,
}

impl ExecutionPlan {
    pub fn step(&self, name: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.action.name == name)
    }

    pub fn action_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.action.name.as_str()).collect()
    }
}

impl ActionGraph {
    /// Read and build a graph from a JSON workflow file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    /// Build a graph from JSON declarations.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let declarations: Declarations = serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("invalid declarations: {e}")))?;
        Self::build(declarations)
    }

    /// Validate `declarations` and build the graph.
    ///
    /// # Errors
    /// - [`EngineError::Config`] for malformed declarations.
    /// - [`EngineError::Reference`] if a `resolves`/`needs` target is undeclared.
    /// - [`EngineError::Cycle`] if the action graph is not acyclic.
    pub fn build(declarations: Declarations) -> Result<Self, EngineError> {
        let Declarations { workflows, actions } = declarations;

        // -------------------------------------------------------------------
        // 1. Names, uses and events
        // -------------------------------------------------------------------
        let mut index: HashMap<String, usize> = HashMap::with_capacity(actions.len());
        for (i, action) in actions.iter().enumerate() {
            if action.name.trim().is_empty() {
                return Err(EngineError::Config(format!("action #{} has an empty name", i + 1)));
            }
            if action.uses.trim().is_empty() {
                return Err(EngineError::Config(format!(
                    "action '{}' has an empty 'uses'",
                    action.name
                )));
            }
            if index.insert(action.name.clone(), i).is_some() {
                return Err(EngineError::Config(format!(
                    "duplicate action name: '{}'",
                    action.name
                )));
            }
        }

        let mut seen_workflows: HashSet<&str> = HashSet::new();
        let mut validated: Vec<Workflow> = Vec::with_capacity(workflows.len());
        for (i, workflow) in workflows.iter().enumerate() {
            if workflow.name.trim().is_empty() {
                return Err(EngineError::Config(format!(
                    "workflow #{} has an empty name",
                    i + 1
                )));
            }
            if !seen_workflows.insert(workflow.name.as_str()) {
                return Err(EngineError::Config(format!(
                    "duplicate workflow name: '{}'",
                    workflow.name
                )));
            }
            let on: Event = workflow.on.parse().map_err(|e| {
                EngineError::Config(format!("workflow '{}': {e}", workflow.name))
            })?;
            if workflow.resolves.is_empty() {
                return Err(EngineError::Config(format!(
                    "workflow '{}' resolves no actions",
                    workflow.name
                )));
            }

            // ---------------------------------------------------------------
            // 2a. Workflow references
            // ---------------------------------------------------------------
            for target in &workflow.resolves {
                if !index.contains_key(target) {
                    return Err(EngineError::Reference {
                        referrer: format!("workflow '{}'", workflow.name),
                        target: target.clone(),
                    });
                }
            }

            validated.push(Workflow {
                name: workflow.name.clone(),
                on,
                resolves: workflow.resolves.clone(),
            });
        }

        // -------------------------------------------------------------------
        // 2b. Action references -> edges
        // -------------------------------------------------------------------
        let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); actions.len()];
        let mut upstream: Vec<Vec<usize>> = vec![Vec::new(); actions.len()];
        let mut add_edge = |from: usize, to: usize| {
            if !downstream[from].contains(&to) {
                downstream[from].push(to);
                upstream[to].push(from);
            }
        };

        for (i, action) in actions.iter().enumerate() {
            let lookup = |target: &String| {
                index.get(target).copied().ok_or_else(|| EngineError::Reference {
                    referrer: format!("action '{}'", action.name),
                    target: target.clone(),
                })
            };
            for target in &action.resolves {
                add_edge(i, lookup(target)?);
            }
            for target in &action.needs {
                add_edge(lookup(target)?, i);
            }
        }

        // -------------------------------------------------------------------
        // 3. Cycle detection + topological order
        // -------------------------------------------------------------------
        let order = topological_order(&actions, &downstream)?;

        let actions = actions
            .into_iter()
            .map(|decl| Action {
                name: decl.name,
                uses: decl.uses,
                args: decl.args,
                env: decl.env,
            })
            .collect();

        Ok(Self {
            workflows: validated,
            actions,
            index,
            downstream,
            upstream,
            order,
        })
    }

    pub fn workflows(&self) -> &[Workflow] {
        &self.workflows
    }

    pub fn workflow(&self, name: &str) -> Option<&Workflow> {
        self.workflows.iter().find(|w| w.name == name)
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.index.get(name).map(|&i| &self.actions[i])
    }

    /// Actions that run after `name` succeeds.
    pub fn downstream(&self, name: &str) -> Vec<&str> {
        self.neighbours(name, &self.downstream)
    }

    /// Actions that must succeed before `name` runs.
    pub fn upstream(&self, name: &str) -> Vec<&str> {
        self.neighbours(name, &self.upstream)
    }

    /// Every action, upstream before downstream.
    pub fn topological_order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.actions[i].name.as_str()).collect()
    }

    /// Build the execution plan for `workflow`.
    ///
    /// The plan holds every action reachable downstream from the workflow's
    /// `resolves`, plus all of their upstream ancestors, since an action can
    /// never start before its upstreams succeed.
    pub fn plan(&self, workflow: &Workflow) -> ExecutionPlan {
        let roots = workflow
            .resolves
            .iter()
            .filter_map(|name| self.index.get(name).copied());
        let reachable = closure(roots, &self.downstream);
        let members = closure(reachable.iter().copied(), &self.upstream);

        let steps = self
            .order
            .iter()
            .filter(|&i| members.contains(i))
            .map(|&i| PlanStep {
                action: self.actions[i].clone(),
                upstream: self.names(&self.upstream[i], &members),
                downstream: self.names(&self.downstream[i], &members),
            })
            .collect();

        ExecutionPlan {
            workflow: workflow.name.clone(),
            event: workflow.on,
            steps,
        }
    }

    fn neighbours<'a>(&'a self, name: &str, adjacency: &'a [Vec<usize>]) -> Vec<&'a str> {
        self.index
            .get(name)
            .map(|&i| {
                adjacency[i]
                    .iter()
                    .map(|&j| self.actions[j].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn names(&self, indices: &[usize], members: &HashSet<usize>) -> Vec<String> {
        indices
            .iter()
            .filter(|&i| members.contains(i))
            .map(|&i| self.actions[i].name.clone())
            .collect()
    }
}

/// All nodes reachable from `start` (inclusive) along `adjacency`.
fn closure(start: impl IntoIterator<Item = usize>, adjacency: &[Vec<usize>]) -> HashSet<usize> {
    let mut seen: HashSet<usize> = HashSet::new();
    let mut queue: VecDeque<usize> = start.into_iter().collect();
    while let Some(node) = queue.pop_front() {
        if seen.insert(node) {
            queue.extend(adjacency[node].iter().copied());
        }
    }
    seen
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Reverse DFS post-order; fails with the first cycle found.
///
/// Roots and neighbours are walked in reverse declaration order so that,
/// once the post-order is reversed, independent actions keep their
/// declaration order.
fn topological_order(
    actions: &[ActionDecl],
    downstream: &[Vec<usize>],
) -> Result<Vec<usize>, EngineError> {
    fn visit(
        node: usize,
        actions: &[ActionDecl],
        downstream: &[Vec<usize>],
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        post_order: &mut Vec<usize>,
    ) -> Result<(), EngineError> {
        marks[node] = Mark::OnStack;
        stack.push(node);

        for &next in downstream[node].iter().rev() {
            match marks[next] {
                Mark::Done => {}
                Mark::OnStack => {
                    let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                    let path = stack[start..]
                        .iter()
                        .chain(std::iter::once(&next))
                        .map(|&n| actions[n].name.clone())
                        .collect();
                    return Err(EngineError::Cycle { path });
                }
                Mark::Unvisited => visit(next, actions, downstream, marks, stack, post_order)?,
            }
        }

        stack.pop();
        marks[node] = Mark::Done;
        post_order.push(node);
        Ok(())
    }

    let mut marks = vec![Mark::Unvisited; actions.len()];
    let mut stack = Vec::new();
    let mut post_order = Vec::with_capacity(actions.len());

    for root in (0..actions.len()).rev() {
        if marks[root] == Mark::Unvisited {
            visit(root, actions, downstream, &mut marks, &mut stack, &mut post_order)?;
        }
    }

    post_order.reverse();
    Ok(post_order)
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkflowDecl;

    fn action(name: &str) -> ActionDecl {
        ActionDecl::new(name, "sh", format!("echo {name}"))
    }

    fn graph(actions: Vec<ActionDecl>, resolves: &[&str]) -> Result<ActionGraph, EngineError> {
        ActionGraph::build(Declarations {
            workflows: vec![WorkflowDecl::new("ci", "push", resolves.iter().copied())],
            actions,
        })
    }

    #[test]
    fn valid_linear_dag_returns_sorted_order() {
        // A → B → C
        let graph = graph(
            vec![
                action("c"),
                action("b").resolves(["c"]),
                action("a").resolves(["b"]),
            ],
            &["a"],
        )
        .expect("should be valid");

        assert_eq!(graph.topological_order(), vec!["a", "b", "c"]);
    }

    #[test]
    fn valid_diamond_dag() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let graph = graph(
            vec![
                action("a").resolves(["b", "c"]),
                action("b").resolves(["d"]),
                action("c").resolves(["d"]),
                action("d"),
            ],
            &["a"],
        )
        .expect("should be valid");

        assert_eq!(graph.topological_order(), vec!["a", "b", "c", "d"]);
        assert_eq!(graph.upstream("d"), vec!["b", "c"]);
        assert_eq!(graph.downstream("a"), vec!["b", "c"]);
    }

    #[test]
    fn independent_actions_keep_declaration_order() {
        let graph = graph(vec![action("fmt"), action("clippy"), action("test")], &["fmt"])
            .expect("should be valid");
        assert_eq!(graph.topological_order(), vec!["fmt", "clippy", "test"]);
    }

    #[test]
    fn needs_and_resolves_describe_the_same_edge() {
        let graph = graph(
            vec![action("build").resolves(["test"]), action("test").needs(["build"])],
            &["build"],
        )
        .expect("should be valid");
        assert_eq!(graph.downstream("build"), vec!["test"]);
        assert_eq!(graph.upstream("test"), vec!["build"]);
    }

    #[test]
    fn duplicate_action_name_is_rejected() {
        let result = graph(vec![action("a"), action("a")], &["a"]);
        assert!(matches!(result, Err(EngineError::Config(msg)) if msg.contains("duplicate action")));
    }

    #[test]
    fn duplicate_workflow_name_is_rejected() {
        let result = ActionGraph::build(
            Declarations::new()
                .workflow(WorkflowDecl::new("ci", "push", ["a"]))
                .workflow(WorkflowDecl::new("ci", "release", ["a"]))
                .action(action("a")),
        );
        assert!(matches!(result, Err(EngineError::Config(msg)) if msg.contains("duplicate workflow")));
    }

    #[test]
    fn empty_uses_is_rejected() {
        let result = graph(vec![ActionDecl::new("a", " ", "")], &["a"]);
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn unsupported_event_is_rejected() {
        let result = ActionGraph::build(
            Declarations::new()
                .workflow(WorkflowDecl::new("ci", "deploy", ["a"]))
                .action(action("a")),
        );
        assert!(matches!(result, Err(EngineError::Config(msg)) if msg.contains("unknown event")));
    }

    #[test]
    fn workflow_without_resolves_is_rejected() {
        let result = graph(vec![action("a")], &[]);
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn workflow_resolving_missing_action_is_rejected() {
        let result = graph(vec![action("a")], &["ghost"]);
        assert!(matches!(
            result,
            Err(EngineError::Reference { referrer, target })
                if referrer == "workflow 'ci'" && target == "ghost"
        ));
    }

    #[test]
    fn action_resolving_missing_action_is_rejected() {
        let result = graph(vec![action("a").resolves(["ghost"])], &["a"]);
        assert!(matches!(
            result,
            Err(EngineError::Reference { target, .. }) if target == "ghost"
        ));

        let result = graph(vec![action("a").needs(["phantom"])], &["a"]);
        assert!(matches!(
            result,
            Err(EngineError::Reference { target, .. }) if target == "phantom"
        ));
    }

    #[test]
    fn cycle_is_detected_with_its_path() {
        // A → B → C → A
        let result = graph(
            vec![
                action("a").resolves(["b"]),
                action("b").resolves(["c"]),
                action("c").resolves(["a"]),
            ],
            &["a"],
        );
        match result {
            Err(EngineError::Cycle { path }) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let result = graph(vec![action("a").resolves(["a"])], &["a"]);
        assert!(matches!(result, Err(EngineError::Cycle { path }) if path == ["a", "a"]));
    }

    #[test]
    fn plan_contains_downstream_closure_and_ancestors() {
        // setup → build → test ; lint is unrelated ; docs needs build
        let graph = graph(
            vec![
                action("setup").resolves(["build"]),
                action("build").resolves(["test"]),
                action("test"),
                action("lint"),
                action("docs").needs(["build"]),
            ],
            &["build"],
        )
        .expect("should be valid");

        let plan = graph.plan(&graph.workflows()[0]);
        assert_eq!(plan.workflow, "ci");
        assert_eq!(plan.event, Event::Push);
        assert_eq!(plan.action_names(), vec!["setup", "build", "test", "docs"]);

        let build = plan.step("build").unwrap();
        assert_eq!(build.upstream, vec!["setup"]);
        assert_eq!(build.downstream, vec!["test", "docs"]);
        assert!(plan.step("lint").is_none());
    }

    #[test]
    fn from_json_builds_the_documented_format() {
        let graph = ActionGraph::from_json(
            r#"{
                "workflows": [{ "name": "CI", "on": "push", "resolves": ["test"] }],
                "actions": [{ "name": "test", "uses": "sh", "args": "cargo test" }]
            }"#,
        )
        .expect("should be valid");

        assert_eq!(graph.workflow("CI").map(|w| w.on), Some(Event::Push));
        assert_eq!(graph.action("test").map(|a| a.args.as_str()), Some("cargo test"));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            ActionGraph::from_json("{ not json"),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn load_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflow.json");
        std::fs::write(
            &path,
            r#"{ "workflows": [{ "name": "CI", "on": "push", "resolves": ["fmt"] }],
                 "actions": [{ "name": "fmt", "uses": "sh", "args": "cargo fmt" }] }"#,
        )
        .unwrap();

        let graph = ActionGraph::load_file(&path).expect("should load");
        assert_eq!(graph.actions().len(), 1);

        assert!(matches!(
            ActionGraph::load_file(dir.path().join("missing.json")),
            Err(EngineError::Config(_))
        ));
    }
}

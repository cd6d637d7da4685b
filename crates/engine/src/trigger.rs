//! Trigger matching — which workflows does an incoming event start?

use crate::dag::ActionGraph;
use crate::models::{Event, Workflow};

/// Workflows whose `on` filter matches `event`, in declaration order.
///
/// Pure: unknown event names simply match nothing.
pub fn match_event<'a>(graph: &'a ActionGraph, event: &str) -> Vec<&'a Workflow> {
    match event.parse::<Event>() {
        Ok(event) => matching(graph, event),
        Err(_) => Vec::new(),
    }
}

/// Workflows triggered by an already-parsed `event`.
pub fn matching(graph: &ActionGraph, event: Event) -> Vec<&Workflow> {
    graph
        .workflows()
        .iter()
        .filter(|workflow| workflow.on == event)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionDecl, Declarations, WorkflowDecl};

    fn graph() -> ActionGraph {
        ActionGraph::build(
            Declarations::new()
                .workflow(WorkflowDecl::new("ci", "push", ["test"]))
                .workflow(WorkflowDecl::new("review", "pull_request", ["test"]))
                .workflow(WorkflowDecl::new("lint", "push", ["fmt"]))
                .action(ActionDecl::new("test", "sh", "cargo test"))
                .action(ActionDecl::new("fmt", "sh", "cargo fmt -- --check")),
        )
        .expect("valid graph")
    }

    #[test]
    fn push_matches_push_workflows_in_order() {
        let graph = graph();
        let names: Vec<_> = match_event(&graph, "push")
            .into_iter()
            .map(|w| w.name.as_str())
            .collect();
        assert_eq!(names, vec!["ci", "lint"]);
    }

    #[test]
    fn other_events_match_their_own_workflows() {
        let graph = graph();
        let matched = match_event(&graph, "pull_request");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "review");
        assert!(match_event(&graph, "release").is_empty());
    }

    #[test]
    fn unknown_event_matches_nothing() {
        assert!(match_event(&graph(), "deploy").is_empty());
    }
}

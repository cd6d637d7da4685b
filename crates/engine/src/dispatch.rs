//! Event dispatch — from "something happened to the repository" to finished
//! workflow runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::dag::{ActionGraph, ExecutionPlan};
use crate::executor::WorkflowExecutor;
use crate::report::RunReport;
use crate::trigger::match_event;
use crate::EngineError;

/// Ties an immutable [`ActionGraph`] to an executor and a checkout.
pub struct Engine {
    graph: Arc<ActionGraph>,
    executor: Arc<WorkflowExecutor>,
    workspace: PathBuf,
}

impl Engine {
    pub fn new(
        graph: Arc<ActionGraph>,
        executor: WorkflowExecutor,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        Self {
            graph,
            executor: Arc::new(executor),
            workspace: workspace.into(),
        }
    }

    pub fn graph(&self) -> &ActionGraph {
        &self.graph
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Swap in a freshly loaded graph.  Runs already in flight keep the old one.
    pub fn reload(&mut self, graph: Arc<ActionGraph>) {
        self.graph = graph;
    }

    /// Execution plans of every workflow `event` triggers.
    pub fn plans_for(&self, event: &str) -> Vec<ExecutionPlan> {
        match_event(&self.graph, event)
            .into_iter()
            .map(|workflow| self.graph.plan(workflow))
            .collect()
    }

    /// Run every workflow triggered by `event`, concurrently.
    ///
    /// All runners are resolved before any workflow starts, so an
    /// unresolvable `uses` anywhere means nothing runs.
    ///
    /// # Errors
    /// [`EngineError::Config`] if some planned action has no runner.
    #[instrument(skip(self, cancel))]
    pub async fn dispatch(
        &self,
        event: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<RunReport>, EngineError> {
        let plans = self.plans_for(event);
        if plans.is_empty() {
            info!("no workflow matches event");
            return Ok(Vec::new());
        }

        for plan in &plans {
            self.executor.resolve_runners(plan)?;
        }
        info!(workflows = plans.len(), "dispatching workflows");

        let runs = plans
            .iter()
            .map(|plan| self.executor.run(plan, &self.workspace, cancel.child_token()));

        futures::future::join_all(runs).await.into_iter().collect()
    }
}

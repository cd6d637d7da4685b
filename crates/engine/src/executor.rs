//! Workflow execution engine.
//!
//! `WorkflowExecutor` runs one [`ExecutionPlan`]:
//! 1. Resolves every action's `uses` to a runner before anything starts.
//! 2. Launches an action as soon as all of its upstream actions succeeded;
//!    independent branches run concurrently on a `JoinSet`.
//! 3. Marks everything downstream of a failed action `Skipped`.
//! 4. Handles cancellation, and the opt-in timeout / retry / parallelism
//!    limits from [`ExecutorConfig`].  The parallelism limit is shared by
//!    every run of one executor.
//! 5. Aggregates the terminal states into a [`RunReport`].

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use actions::{ActionError, ActionOutput, ActionRunner, ExecutionContext, RunnerRegistry};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

use crate::dag::{ExecutionPlan, PlanStep};
use crate::report::{aggregate, ActionReport, RunReport};
use crate::state::{ActionStatus, StateTable};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.  The defaults impose no limits.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of actions running at once across every run of one
    /// executor (`None` = unbounded).
    pub max_parallel: Option<usize>,
    /// Per-attempt time limit for an action (`None` = no limit).
    pub action_timeout: Option<Duration>,
    /// How many times a failed action is re-run before it counts as failed.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel: None,
            action_timeout: None,
            max_retries: 0,
            retry_base_delay: Duration::from_millis(100),
        }
    }
}

/// Runner lookup for every action of a plan.
pub type ResolvedRunners = HashMap<String, Arc<dyn ActionRunner>>;

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Runs execution plans against a registry of action runners.
///
/// One instance can serve any number of concurrent runs.  The only state
/// they share is the pool of `max_parallel` slots.
pub struct WorkflowExecutor {
    registry: RunnerRegistry,
    config: ExecutorConfig,
    slots: Option<Arc<Semaphore>>,
}

impl WorkflowExecutor {
    pub fn new(registry: RunnerRegistry, config: ExecutorConfig) -> Self {
        let slots = config
            .max_parallel
            .map(|max| Arc::new(Semaphore::new(max.max(1))));
        Self {
            registry,
            config,
            slots,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Resolve the runner of every planned action.
    ///
    /// # Errors
    /// [`EngineError::Config`] naming the first action whose `uses` has no
    /// runner.
    pub fn resolve_runners(&self, plan: &ExecutionPlan) -> Result<ResolvedRunners, EngineError> {
        plan.steps
            .iter()
            .map(|step| {
                self.registry
                    .resolve(&step.action.uses)
                    .map(|runner| (step.action.name.clone(), runner))
                    .map_err(|e| {
                        EngineError::Config(format!("action '{}': {e}", step.action.name))
                    })
            })
            .collect()
    }

    /// Run `plan` against the checkout in `workspace`.
    ///
    /// Action failures do not make this return `Err`; they are recorded in
    /// the report.
    ///
    /// # Errors
    /// Returns [`EngineError::Config`] if an action's `uses` cannot be
    /// resolved.  Nothing has run in that case.
    #[instrument(skip_all, fields(workflow = %plan.workflow, event = %plan.event))]
    pub async fn run(
        &self,
        plan: &ExecutionPlan,
        workspace: &Path,
        cancel: CancellationToken,
    ) -> Result<RunReport, EngineError> {
        let runners = self.resolve_runners(plan)?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, actions = plan.steps.len(), "starting workflow run");

        let mut run = RunState::new(plan);
        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();
        let mut cancelled = false;
        let mut spare: Option<OwnedSemaphorePermit> = None;

        loop {
            if !cancelled && cancel.is_cancelled() {
                warn!(%run_id, "workflow run cancelled");
                cancelled = true;
                tasks.abort_all();
                run.cancel_all();
            }

            // ------------------------------------------------------------------
            // Launch everything that is ready, in plan order, while slots last.
            // ------------------------------------------------------------------
            let mut starved = false;
            if !cancelled {
                for step in &plan.steps {
                    if !run.states.is_ready(&step.action.name, &step.upstream) {
                        continue;
                    }
                    let permit = match &self.slots {
                        None => None,
                        Some(slots) => {
                            let permit = spare
                                .take()
                                .or_else(|| Arc::clone(slots).try_acquire_owned().ok());
                            if permit.is_none() {
                                starved = true;
                                break;
                            }
                            permit
                        }
                    };
                    run.mark_running(&step.action.name);

                    let ctx = ExecutionContext {
                        run_id,
                        workflow: plan.workflow.clone(),
                        action: step.action.name.clone(),
                        event: plan.event.to_string(),
                        workspace: workspace.to_path_buf(),
                        env: step.action.env.clone(),
                    };
                    let runner = Arc::clone(&runners[&step.action.name]);
                    let span = info_span!("action", action = %step.action.name, %run_id);

                    debug!(action = %step.action.name, "launching action");
                    let attempt =
                        execute_with_retry(runner, step.action.args.clone(), ctx, self.config.clone());
                    tasks.spawn(
                        async move {
                            // Held until the action settles or is aborted.
                            let _permit = permit;
                            attempt.await
                        }
                        .instrument(span),
                    );
                }
            }

            if tasks.is_empty() && !starved {
                break;
            }

            // ------------------------------------------------------------------
            // Wait for the next completion, a free slot, or cancellation.
            // ------------------------------------------------------------------
            let next = tokio::select! {
                _ = cancel.cancelled(), if !cancelled => Next::Cancelled,
                joined = tasks.join_next(), if !tasks.is_empty() => Next::Joined(joined),
                permit = free_slot(self.slots.clone()), if starved => Next::Slot(permit),
                else => Next::Joined(None),
            };

            match next {
                Next::Cancelled => continue,
                Next::Slot(permit) => spare = permit,
                Next::Joined(Some(Ok(outcome))) => run.record(outcome),
                Next::Joined(Some(Err(e))) if e.is_cancelled() => {}
                Next::Joined(Some(Err(e))) => {
                    error!(%run_id, error = %e, "action task failed to join");
                }
                Next::Joined(None) => break,
            }
        }

        let report = run.finish(run_id, started_at, cancelled);
        info!(
            %run_id,
            status = %report.status,
            cancelled = report.cancelled,
            "workflow run finished"
        );
        Ok(report)
    }
}

enum Next {
    Cancelled,
    Joined(Option<Result<TaskOutcome, JoinError>>),
    Slot(Option<OwnedSemaphorePermit>),
}

/// Wait for a `max_parallel` slot another run is holding.
async fn free_slot(slots: Option<Arc<Semaphore>>) -> Option<OwnedSemaphorePermit> {
    match slots {
        Some(slots) => slots.acquire_owned().await.ok(),
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Per-run bookkeeping
// ---------------------------------------------------------------------------

struct TaskOutcome {
    action: String,
    result: Result<ActionOutput, ActionError>,
    attempts: u32,
    finished_at: DateTime<Utc>,
}

struct RunState<'p> {
    plan: &'p ExecutionPlan,
    steps: HashMap<&'p str, &'p PlanStep>,
    states: StateTable,
    reports: HashMap<String, ActionReport>,
}

impl<'p> RunState<'p> {
    fn new(plan: &'p ExecutionPlan) -> Self {
        Self {
            plan,
            steps: plan
                .steps
                .iter()
                .map(|step| (step.action.name.as_str(), step))
                .collect(),
            states: StateTable::new(plan.steps.iter().map(|s| s.action.name.clone())),
            reports: plan
                .steps
                .iter()
                .map(|s| {
                    (
                        s.action.name.clone(),
                        ActionReport::pending(&s.action.name, &s.action.uses),
                    )
                })
                .collect(),
        }
    }

    fn mark_running(&mut self, action: &str) {
        if self.states.transition(action, ActionStatus::Running) {
            if let Some(report) = self.reports.get_mut(action) {
                report.status = ActionStatus::Running;
                report.started_at = Some(Utc::now());
            }
        }
    }

    fn record(&mut self, outcome: TaskOutcome) {
        let TaskOutcome {
            action,
            result,
            attempts,
            finished_at,
        } = outcome;

        if self.states.get(&action) != Some(ActionStatus::Running) {
            debug!(action = %action, "ignoring result of an action that is no longer running");
            return;
        }
        if let Some(report) = self.reports.get_mut(&action) {
            report.attempts = attempts;
            report.finished_at = Some(finished_at);
        }

        let message = match result {
            Ok(output) => {
                let success = output.status.success();
                let status = output.status;
                if let Some(report) = self.reports.get_mut(&action) {
                    report.exit_code = status.code;
                    report.stdout = output.stdout;
                    report.stderr = output.stderr;
                }
                if success {
                    self.settle(&action, ActionStatus::Succeeded, None);
                    info!(action = %action, attempts, "action succeeded");
                    return;
                }
                status.to_string()
            }
            Err(e) => e.to_string(),
        };

        let reason = EngineError::Execution {
            action: action.clone(),
            message,
        };
        warn!(action = %action, attempts, error = %reason, "action failed");
        self.settle(&action, ActionStatus::Failed, Some(reason.to_string()));
        self.skip_downstream(&action);
    }

    /// Skip every transitive downstream action that has not started.
    fn skip_downstream(&mut self, failed: &str) {
        let mut queue: VecDeque<&str> = self.downstream_of(failed);
        while let Some(action) = queue.pop_front() {
            if self.states.get(action) != Some(ActionStatus::Pending) {
                continue;
            }
            self.settle(
                action,
                ActionStatus::Skipped,
                Some(format!("upstream action '{failed}' failed")),
            );
            debug!(action, upstream = failed, "action skipped");
            queue.extend(self.downstream_of(action));
        }
    }

    fn downstream_of(&self, action: &str) -> VecDeque<&'p str> {
        self.steps
            .get(action)
            .map(|&step| step.downstream.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Running actions fail, pending ones are skipped.
    fn cancel_all(&mut self) {
        let now = Utc::now();
        let plan = self.plan;
        for step in &plan.steps {
            let action = step.action.name.as_str();
            match self.states.get(action) {
                Some(ActionStatus::Running) => {
                    let reason = EngineError::Execution {
                        action: action.to_owned(),
                        message: ActionError::Cancelled.to_string(),
                    };
                    self.settle(action, ActionStatus::Failed, Some(reason.to_string()));
                    if let Some(report) = self.reports.get_mut(action) {
                        report.finished_at = Some(now);
                    }
                }
                Some(ActionStatus::Pending) => {
                    self.settle(action, ActionStatus::Skipped, Some("run cancelled".to_owned()));
                }
                _ => {}
            }
        }
    }

    fn settle(&mut self, action: &str, status: ActionStatus, reason: Option<String>) {
        if self.states.transition(action, status) {
            if let Some(report) = self.reports.get_mut(action) {
                report.status = status;
                report.reason = reason;
            }
        }
    }

    fn finish(mut self, run_id: Uuid, started_at: DateTime<Utc>, cancelled: bool) -> RunReport {
        // Anything left over never got a result.
        let plan = self.plan;
        for step in &plan.steps {
            let action = step.action.name.as_str();
            match self.states.get(action) {
                Some(ActionStatus::Pending) => {
                    self.settle(action, ActionStatus::Skipped, Some("never became ready".to_owned()));
                }
                Some(ActionStatus::Running) => {
                    self.settle(action, ActionStatus::Failed, Some("action task was lost".to_owned()));
                }
                _ => {}
            }
        }
        debug_assert!(self.states.all_terminal());
        debug!(
            succeeded = self.states.count(ActionStatus::Succeeded),
            failed = self.states.count(ActionStatus::Failed),
            skipped = self.states.count(ActionStatus::Skipped),
            "action states settled"
        );

        let actions: Vec<ActionReport> = plan
            .steps
            .iter()
            .filter_map(|step| self.reports.remove(&step.action.name))
            .collect();

        RunReport {
            run_id,
            workflow: plan.workflow.clone(),
            event: plan.event,
            status: aggregate(actions.iter().map(|a| a.status)),
            cancelled,
            actions,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal: execute a single action with timeout + retry logic.
// ---------------------------------------------------------------------------

async fn execute_with_retry(
    runner: Arc<dyn ActionRunner>,
    args: String,
    ctx: ExecutionContext,
    config: ExecutorConfig,
) -> TaskOutcome {
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let result = execute_once(runner.as_ref(), &args, &ctx, config.action_timeout).await;

        let retryable = match &result {
            Ok(output) => !output.status.success(),
            Err(e) => e.is_retryable(),
        };
        if !retryable || attempts > config.max_retries {
            return TaskOutcome {
                action: ctx.action,
                result,
                attempts,
                finished_at: Utc::now(),
            };
        }

        let delay = config
            .retry_base_delay
            .saturating_mul(2u32.saturating_pow(attempts - 1));
        warn!(
            "action '{}' failed (attempt {}/{}), retrying in {:?}",
            ctx.action,
            attempts,
            config.max_retries + 1,
            delay
        );
        tokio::time::sleep(delay).await;
    }
}

async fn execute_once(
    runner: &dyn ActionRunner,
    args: &str,
    ctx: &ExecutionContext,
    timeout: Option<Duration>,
) -> Result<ActionOutput, ActionError> {
    let attempt = AssertUnwindSafe(runner.run(args, ctx)).catch_unwind();

    let caught = match timeout {
        Some(limit) => match tokio::time::timeout(limit, attempt).await {
            Ok(caught) => caught,
            Err(_) => return Err(ActionError::TimedOut(limit)),
        },
        None => attempt.await,
    };

    caught.unwrap_or_else(|panic| {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_owned());
        Err(ActionError::Panicked(message))
    })
}

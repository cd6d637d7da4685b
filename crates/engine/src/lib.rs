//! `engine` crate — workflow/action models, graph building, trigger matching,
//! scheduling and result aggregation.

pub mod models;
pub mod error;
pub mod dag;
pub mod trigger;
pub mod state;
pub mod report;
pub mod executor;
pub mod dispatch;

pub use models::{Action, ActionDecl, Declarations, Event, Workflow, WorkflowDecl};
pub use error::EngineError;
pub use dag::{ActionGraph, ExecutionPlan, PlanStep};
pub use trigger::match_event;
pub use state::ActionStatus;
pub use report::{exit_code, ActionReport, RunReport, RunStatus};
pub use executor::{ExecutorConfig, WorkflowExecutor};
pub use dispatch::Engine;

//! `actions` crate — the `ActionRunner` capability and built-in runners.
//!
//! A workflow action's `uses` reference is resolved through a
//! [`RunnerRegistry`] to an [`ActionRunner`] trait object.  The engine crate
//! dispatches every action through that trait; it never knows which source
//! (shell, docker image, registered implementation) is behind it.

pub mod error;
pub mod traits;
pub mod source;
pub mod sandbox;
pub mod registry;
pub mod shell;
pub mod docker;
pub mod mock;

pub use error::ActionError;
pub use registry::RunnerRegistry;
pub use source::ActionSource;
pub use traits::{ActionOutput, ActionRunner, ExecutionContext, ExitStatus};

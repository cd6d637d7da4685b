//! `ShellRunner` — runs an action's args as a shell command line.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::sandbox::Sandbox;
use crate::{ActionError, ActionOutput, ActionRunner, ExecutionContext};

/// Executes `<shell> -c <args>` in a fresh [`Sandbox`].
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl ShellRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self { shell: shell.into() }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new("sh")
    }
}

#[async_trait]
impl ActionRunner for ShellRunner {
    async fn run(&self, args: &str, ctx: &ExecutionContext) -> Result<ActionOutput, ActionError> {
        let sandbox = Sandbox::create()?;

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(args);
        sandbox.apply(&mut cmd, ctx);

        debug!(action = %ctx.action, shell = %self.shell, "spawning shell command");
        sandbox.output(cmd, &self.shell).await
    }
}

//! Disposable per-action execution environment.
//!
//! Every action gets a fresh scratch directory (used as `HOME` and `TMPDIR`)
//! and a cleared environment containing only `PATH`, the engine's `CI_*`
//! variables and the action's own `env`.  The scratch directory is deleted
//! when the [`Sandbox`] is dropped, so nothing leaks between actions.
//!
//! On unix each action also runs in its own process group.  When an action
//! finishes, times out or is cancelled, the whole group is killed, so
//! nothing the action started keeps running against the workspace.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use tempfile::TempDir;
use tokio::process::{Child, Command};
use tracing::warn;

use crate::{ActionError, ActionOutput, ExecutionContext};

pub struct Sandbox {
    scratch: TempDir,
}

impl Sandbox {
    pub fn create() -> Result<Self, ActionError> {
        let scratch = tempfile::Builder::new().prefix("ci-action-").tempdir()?;
        Ok(Self { scratch })
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// The full environment an action sees.
    pub fn environment(&self, ctx: &ExecutionContext) -> BTreeMap<String, String> {
        let scratch = self.scratch_dir().display().to_string();
        let mut env = BTreeMap::new();

        if let Ok(path) = std::env::var("PATH") {
            env.insert("PATH".to_owned(), path);
        }
        env.insert("HOME".to_owned(), scratch.clone());
        env.insert("TMPDIR".to_owned(), scratch);
        env.insert("CI".to_owned(), "true".to_owned());
        env.insert("CI_RUN_ID".to_owned(), ctx.run_id.to_string());
        env.insert("CI_WORKFLOW".to_owned(), ctx.workflow.clone());
        env.insert("CI_ACTION".to_owned(), ctx.action.clone());
        env.insert("CI_EVENT".to_owned(), ctx.event.clone());
        env.insert(
            "CI_WORKSPACE".to_owned(),
            ctx.workspace.display().to_string(),
        );

        // Declared env wins over engine defaults.
        for (key, value) in &ctx.env {
            env.insert(key.clone(), value.clone());
        }
        env
    }

    /// Configure `cmd` to run inside this sandbox.
    pub fn apply(&self, cmd: &mut Command, ctx: &ExecutionContext) {
        cmd.env_clear()
            .envs(self.environment(ctx))
            .current_dir(&ctx.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);
    }

    /// Spawn `cmd` and collect its exit status and logs.
    ///
    /// If the returned future is dropped (timeout, cancellation) the child's
    /// whole process group is killed.  The group is also killed once the
    /// child exits, which reaps any background processes it left behind.
    pub async fn output(&self, mut cmd: Command, program: &str) -> Result<ActionOutput, ActionError> {
        let child = cmd.spawn().map_err(|source| ActionError::Spawn {
            program: program.to_owned(),
            source,
        })?;
        let _group = ProcessGroup::of(&child);

        let output = child.wait_with_output().await?;
        Ok(output.into())
    }
}

/// Kills every process in a child's process group when dropped.
#[cfg_attr(not(unix), allow(dead_code))]
struct ProcessGroup {
    leader: Option<u32>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self { leader: child.id() }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.leader.and_then(|id| i32::try_from(id).ok()) {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!(pgid, error = %e, "failed to kill action process group"),
            }
        }
    }
}

//! `DockerRunner` — runs an action inside a throwaway container.
//!
//! The repository checkout is bind-mounted at [`CONTAINER_WORKSPACE`] and the
//! container is started with `--rm`, so every run begins from the image's
//! pristine filesystem.  Each container gets a unique name; if the action is
//! timed out or cancelled, the container is force-removed by that name,
//! since killing the `docker` client alone leaves it running.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::sandbox::Sandbox;
use crate::{ActionError, ActionOutput, ActionRunner, ExecutionContext};

pub const CONTAINER_WORKSPACE: &str = "/github/workspace";

#[derive(Debug, Clone)]
pub struct DockerRunner {
    docker: String,
    image: String,
}

impl DockerRunner {
    pub fn new(docker: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            docker: docker.into(),
            image: image.into(),
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Build the `docker run` invocation for `args`.
    ///
    /// Empty args run the image's default entrypoint.
    pub fn build_command(
        &self,
        args: &str,
        container: &str,
        sandbox: &Sandbox,
        ctx: &ExecutionContext,
    ) -> Command {
        let mut cmd = Command::new(&self.docker);
        cmd.arg("run")
            .arg("--rm")
            .arg("--name")
            .arg(container)
            .arg("-v")
            .arg(format!("{}:{CONTAINER_WORKSPACE}", ctx.workspace.display()))
            .arg("-w")
            .arg(CONTAINER_WORKSPACE);

        for (key, value) in &ctx.env {
            cmd.arg("-e").arg(format!("{key}={value}"));
        }
        for key in ["CI", "CI_RUN_ID", "CI_WORKFLOW", "CI_ACTION", "CI_EVENT"] {
            cmd.arg("-e").arg(key);
        }

        cmd.arg(&self.image);
        if !args.trim().is_empty() {
            cmd.arg("sh").arg("-c").arg(args);
        }

        // The docker client itself runs sandboxed; `-e KEY` forwards the
        // engine variables from that environment into the container.
        sandbox.apply(&mut cmd, ctx);
        cmd
    }
}

/// A container name unique to one attempt of one action.
///
/// Docker names allow `[a-zA-Z0-9_.-]`; anything else in the action name
/// becomes `-`.
pub fn container_name(ctx: &ExecutionContext) -> String {
    let action: String = ctx
        .action
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.' | '-' => c,
            _ => '-',
        })
        .collect();
    let run = ctx.run_id.simple().to_string();
    let attempt = uuid::Uuid::new_v4().simple().to_string();
    format!("ci-{}-{action}-{}", &run[..8], &attempt[..8])
}

/// Force-removes a container when dropped, unless disarmed first.
pub struct ContainerGuard {
    docker: String,
    name: String,
    armed: bool,
}

impl ContainerGuard {
    pub fn new(docker: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            docker: docker.into(),
            name: name.into(),
            armed: true,
        }
    }

    /// The container exited on its own; `--rm` already removed it.
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        debug!(container = %self.name, "removing abandoned container");

        let mut rm = std::process::Command::new(&self.docker);
        rm.arg("rm")
            .arg("-f")
            .arg(&self.name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Spawned synchronously so the removal starts even if the runtime is
        // shutting down; a plain thread reaps it.
        match rm.spawn() {
            Ok(mut child) => {
                std::thread::spawn(move || child.wait());
            }
            Err(e) => warn!(container = %self.name, error = %e, "failed to remove container"),
        }
    }
}

#[async_trait]
impl ActionRunner for DockerRunner {
    async fn run(&self, args: &str, ctx: &ExecutionContext) -> Result<ActionOutput, ActionError> {
        let sandbox = Sandbox::create()?;
        let container = container_name(ctx);
        let cmd = self.build_command(args, &container, &sandbox, ctx);

        debug!(action = %ctx.action, image = %self.image, %container, "starting container");
        let mut guard = ContainerGuard::new(&self.docker, &container);
        let output = sandbox.output(cmd, &self.docker).await;
        guard.disarm();
        output
    }
}

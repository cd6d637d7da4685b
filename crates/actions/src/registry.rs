//! Resolution of `uses` references to runners.

use std::collections::HashMap;
use std::sync::Arc;

use crate::docker::DockerRunner;
use crate::shell::ShellRunner;
use crate::{ActionError, ActionRunner, ActionSource};

/// Maps `uses` references to [`ActionRunner`] implementations.
///
/// Lookup order:
/// 1. an exact registration of the full `uses` string;
/// 2. for `name@ref`, a registration of `name`;
/// 3. for `docker://image`, the docker runner (if enabled).
#[derive(Clone, Default)]
pub struct RunnerRegistry {
    runners: HashMap<String, Arc<dyn ActionRunner>>,
    docker: Option<String>,
}

impl RunnerRegistry {
    /// An empty registry; nothing resolves until registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// The `sh` shell runner plus `docker://` support via the `docker` CLI.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("sh", ShellRunner::default());
        registry.enable_docker("docker");
        registry
    }

    pub fn register(&mut self, uses: impl Into<String>, runner: impl ActionRunner + 'static) {
        self.register_arc(uses, Arc::new(runner));
    }

    pub fn register_arc(&mut self, uses: impl Into<String>, runner: Arc<dyn ActionRunner>) {
        self.runners.insert(uses.into(), runner);
    }

    /// Serve `docker://` references with the given docker binary.
    pub fn enable_docker(&mut self, docker: impl Into<String>) {
        self.docker = Some(docker.into());
    }

    pub fn resolve(&self, uses: &str) -> Result<Arc<dyn ActionRunner>, ActionError> {
        if let Some(runner) = self.runners.get(uses.trim()) {
            return Ok(Arc::clone(runner));
        }

        match ActionSource::parse(uses) {
            ActionSource::Named {
                name,
                reference: Some(_),
            } => self.runners.get(&name).map(Arc::clone),
            ActionSource::Docker { image } if !image.is_empty() => self
                .docker
                .as_ref()
                .map(|docker| Arc::new(DockerRunner::new(docker, image)) as Arc<dyn ActionRunner>),
            _ => None,
        }
        .ok_or_else(|| ActionError::UnsupportedSource(uses.to_owned()))
    }
}

impl std::fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.runners.keys().collect();
        names.sort();
        f.debug_struct("RunnerRegistry")
            .field("runners", &names)
            .field("docker", &self.docker)
            .finish()
    }
}

//! Parsing of `uses` references into the kind of source they point at.

use std::fmt;

const DOCKER_SCHEME: &str = "docker://";

/// Where an action's implementation comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionSource {
    /// `docker://<image>` — run the args inside a throwaway container.
    Docker { image: String },
    /// `./path` — an action stored in the repository itself.
    Local { path: String },
    /// `owner/name@ref` or a bare name like `sh`.
    Named {
        name: String,
        reference: Option<String>,
    },
}

impl ActionSource {
    pub fn parse(uses: &str) -> Self {
        let uses = uses.trim();
        if let Some(image) = uses.strip_prefix(DOCKER_SCHEME) {
            return Self::Docker {
                image: image.to_owned(),
            };
        }
        if uses.starts_with("./") || uses.starts_with("../") {
            return Self::Local {
                path: uses.to_owned(),
            };
        }
        match uses.rsplit_once('@') {
            Some((name, reference)) if !name.is_empty() && !reference.is_empty() => Self::Named {
                name: name.to_owned(),
                reference: Some(reference.to_owned()),
            },
            _ => Self::Named {
                name: uses.to_owned(),
                reference: None,
            },
        }
    }
}

impl fmt::Display for ActionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Docker { image } => write!(f, "{DOCKER_SCHEME}{image}"),
            Self::Local { path } => f.write_str(path),
            Self::Named {
                name,
                reference: Some(reference),
            } => write!(f, "{name}@{reference}"),
            Self::Named { name, reference: None } => f.write_str(name),
        }
    }
}

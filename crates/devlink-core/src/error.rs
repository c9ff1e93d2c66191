use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = LinkError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("could not read '{}'", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not write '{}'", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not parse '{}'", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not serialize manifest for '{}'", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("discovery failed for '{}': {reason}", path.display())]
    Discovery { path: PathBuf, reason: String },

    #[error("invalid manifest field '{field}': {reason}")]
    InvalidManifest { field: &'static str, reason: String },

    #[error(
        "package directory '{}' is not located under project root '{}'",
        path.display(),
        root.display()
    )]
    PackageOutsideRoot { path: PathBuf, root: PathBuf },

    #[error("could not remove package link '{}'", path.display())]
    RemoveLink {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration in '{}': {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    #[error("could not launch resolver: {command}")]
    ResolverLaunch {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error(
        "restoring '{}' failed, on-disk state may differ from the pre-run snapshot: {reason}",
        path.display()
    )]
    Restore { path: PathBuf, reason: String },

    #[error("interrupted by a termination signal during {stage}")]
    Interrupted { stage: &'static str },
}

impl LinkError {
    pub fn is_restore_failure(&self) -> bool {
        matches!(self, Self::Restore { .. })
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}

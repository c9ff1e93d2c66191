mod error;
mod manifest;
mod package;

pub use error::{LinkError, Result};
pub use manifest::{
    PathRepositoryOptions, ProjectManifest, RepositoryDescriptor, DEV_VERSION_CONSTRAINT,
};
pub use package::{CandidateManifest, DuplicatePackage, PackagePathIndex, PackageRecord};

pub const MANIFEST_FILE: &str = "composer.json";
pub const LOCK_FILE: &str = "composer.lock";

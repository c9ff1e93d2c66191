use std::fs;
use std::path::{Path, PathBuf};

use devlink_core::{LinkError, PackagePathIndex, PackageRecord, Result};
use glob::MatchOptions;
use tracing::debug;

use crate::fs_ops::read_file;
use crate::layout::ProjectLayout;

/// Scans `<root>/<package-dir>/*/composer.json`. A missing package directory
/// yields an empty index.
pub fn discover(layout: &ProjectLayout) -> Result<PackagePathIndex> {
    let pattern = layout.discovery_pattern();
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let matches = glob::glob_with(&pattern, options).map_err(|err| LinkError::Discovery {
        path: layout.package_root(),
        reason: format!("could not search for packages: {err}"),
    })?;

    let mut canonical_root: Option<PathBuf> = None;
    let mut index = PackagePathIndex::new();
    for entry in matches {
        let manifest_path = entry.map_err(|err| LinkError::Discovery {
            path: err.path().to_path_buf(),
            reason: format!("could not search for packages: {}", err.error()),
        })?;

        let bytes = read_file(&manifest_path)?;
        let record = PackageRecord::from_candidate_manifest(&manifest_path, &bytes)?;

        if canonical_root.is_none() {
            canonical_root = Some(canonicalize(layout.root())?);
        }
        if let Some(root) = &canonical_root {
            ensure_within_root(&record.path, root)?;
        }

        debug!(package = %record.name, path = %record.path.display(), "discovered local package");
        index.insert(record);
    }

    Ok(index)
}

fn canonicalize(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).map_err(|source| LinkError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn ensure_within_root(package_path: &Path, canonical_root: &Path) -> Result<()> {
    let resolved = canonicalize(package_path)?;
    if resolved.starts_with(canonical_root) {
        return Ok(());
    }

    Err(LinkError::PackageOutsideRoot {
        path: package_path.to_path_buf(),
        root: canonical_root.to_path_buf(),
    })
}

/// Memoizes discovery for one invocation.
///
/// The first call scans, every later call returns the same index. A failed
/// scan is not cached.
#[derive(Debug, Default)]
pub struct PackageIndexCache {
    index: Option<PackagePathIndex>,
    scans: usize,
}

impl PackageIndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_discover(&mut self, layout: &ProjectLayout) -> Result<&PackagePathIndex> {
        if self.index.is_none() {
            self.scans += 1;
            let index = discover(layout)?;
            debug!(packages = index.len(), "package discovery complete");
            self.index = Some(index);
        }

        Ok(self.index.get_or_insert_with(PackagePathIndex::new))
    }

    pub fn scan_count(&self) -> usize {
        self.scans
    }
}

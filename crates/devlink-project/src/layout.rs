use std::path::{Path, PathBuf};

use devlink_core::{LOCK_FILE, MANIFEST_FILE};

use crate::settings::LinkSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
    package_dir: String,
    vendor_dir: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>, settings: &LinkSettings) -> Self {
        let root = root.into();
        let vendor_dir = root.join(&settings.vendor_dir);
        Self {
            root,
            package_dir: settings.package_dir.clone(),
            vendor_dir,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    pub fn package_dir(&self) -> &str {
        &self.package_dir
    }

    pub fn package_root(&self) -> PathBuf {
        self.root.join(&self.package_dir)
    }

    pub fn vendor_dir(&self) -> &Path {
        &self.vendor_dir
    }

    pub fn vendor_package_path(&self, package_name: &str) -> PathBuf {
        package_name
            .split('/')
            .fold(self.vendor_dir.clone(), |path, segment| path.join(segment))
    }

    /// Glob matching `composer.json` one level below the package root.
    pub fn discovery_pattern(&self) -> String {
        let package_root = glob::Pattern::escape(&self.package_root().to_string_lossy());
        format!("{package_root}/*/{MANIFEST_FILE}")
    }
}

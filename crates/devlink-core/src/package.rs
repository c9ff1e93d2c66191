use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::{LinkError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub path: PathBuf,
}

/// The part of a candidate's `composer.json` discovery cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateManifest {
    #[serde(default)]
    pub name: Option<String>,
}

impl PackageRecord {
    /// Builds a record from the raw `composer.json` found at `manifest_path`.
    /// The package directory is the manifest's parent.
    pub fn from_candidate_manifest(manifest_path: &Path, bytes: &[u8]) -> Result<Self> {
        let candidate: CandidateManifest =
            serde_json::from_slice(bytes).map_err(|err| LinkError::Discovery {
                path: manifest_path.to_path_buf(),
                reason: format!("invalid package manifest: {err}"),
            })?;

        let name = candidate
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| LinkError::Discovery {
                path: manifest_path.to_path_buf(),
                reason: "package manifest has no name attribute".to_string(),
            })?;

        let path = manifest_path
            .parent()
            .ok_or_else(|| LinkError::Discovery {
                path: manifest_path.to_path_buf(),
                reason: "package manifest has no parent directory".to_string(),
            })?
            .to_path_buf();

        Ok(Self { name, path })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatePackage {
    pub name: String,
    pub kept: PathBuf,
    pub replaced: PathBuf,
}

/// Package name to package directory. Later inserts of the same name win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackagePathIndex {
    packages: BTreeMap<String, PathBuf>,
    duplicates: Vec<DuplicatePackage>,
}

impl PackagePathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: PackageRecord) -> Option<PathBuf> {
        let replaced = self
            .packages
            .insert(record.name.clone(), record.path.clone())?;

        warn!(
            package = %record.name,
            kept = %record.path.display(),
            replaced = %replaced.display(),
            "duplicate package name, keeping the later directory"
        );
        self.duplicates.push(DuplicatePackage {
            name: record.name,
            kept: record.path,
            replaced: replaced.clone(),
        });
        Some(replaced)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.packages
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_path()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.packages.keys().map(String::as_str).collect()
    }

    pub fn duplicates(&self) -> &[DuplicatePackage] {
        &self.duplicates
    }
}

impl FromIterator<PackageRecord> for PackagePathIndex {
    fn from_iter<I: IntoIterator<Item = PackageRecord>>(records: I) -> Self {
        let mut index = Self::new();
        for record in records {
            index.insert(record);
        }
        index
    }
}

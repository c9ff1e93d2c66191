use std::path::{Component, Path};

use devlink_core::{LinkError, ProjectManifest, Result};
use serde::Deserialize;
use tracing::debug;

use crate::fs_ops::read_optional_file;

pub const SETTINGS_FILE: &str = "devlink.toml";
/// `extra` blocks consulted for `package-dir`, first match wins.
/// `composer-package-development-toolset` is the key existing projects
/// already carry; `devlink` is accepted as a shorter alias.
pub const EXTRA_NAMESPACES: [&str; 2] = ["composer-package-development-toolset", "devlink"];
pub const DEFAULT_PACKAGE_DIR: &str = "dev-packages";
pub const DEFAULT_VENDOR_DIR: &str = "vendor";
pub const DEFAULT_RESOLVER: &str = "composer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    pub package_dir: String,
    pub vendor_dir: String,
    pub resolver: String,
}

/// Values given on the command line; they win over every other layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    pub package_dir: Option<String>,
    pub vendor_dir: Option<String>,
    pub resolver: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct SettingsFile {
    package_dir: Option<String>,
    vendor_dir: Option<String>,
    resolver: Option<String>,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            package_dir: DEFAULT_PACKAGE_DIR.to_string(),
            vendor_dir: DEFAULT_VENDOR_DIR.to_string(),
            resolver: DEFAULT_RESOLVER.to_string(),
        }
    }
}

impl LinkSettings {
    /// Layers, highest first: overrides, `devlink.toml`, the manifest's
    /// `extra` / `config` blocks, defaults.
    pub fn load(
        root: &Path,
        overrides: &SettingsOverrides,
        manifest: Option<&ProjectManifest>,
    ) -> Result<Self> {
        let settings_path = root.join(SETTINGS_FILE);
        let file = match read_optional_file(&settings_path)? {
            Some(bytes) => parse_settings_file(&settings_path, &bytes)?,
            None => SettingsFile::default(),
        };

        let package_dir = overrides
            .package_dir
            .clone()
            .or(file.package_dir)
            .or_else(|| {
                let manifest = manifest?;
                EXTRA_NAMESPACES
                    .iter()
                    .find_map(|namespace| manifest.package_dir_override(namespace))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| DEFAULT_PACKAGE_DIR.to_string());
        let vendor_dir = overrides
            .vendor_dir
            .clone()
            .or(file.vendor_dir)
            .or_else(|| manifest.and_then(ProjectManifest::vendor_dir).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_VENDOR_DIR.to_string());
        let resolver = overrides
            .resolver
            .clone()
            .or(file.resolver)
            .unwrap_or_else(|| DEFAULT_RESOLVER.to_string());

        let settings = Self {
            package_dir: normalize_package_dir(&settings_path, &package_dir)?,
            vendor_dir,
            resolver,
        };
        debug!(?settings, "resolved link settings");
        Ok(settings)
    }
}

fn parse_settings_file(path: &Path, bytes: &[u8]) -> Result<SettingsFile> {
    let raw = std::str::from_utf8(bytes).map_err(|err| LinkError::Config {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    toml::from_str(raw).map_err(|err| LinkError::Config {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

/// Reduced to its plain segments joined with `/`. The result must stay below
/// the project root lexically, so absolute paths and `..` are refused here.
fn normalize_package_dir(settings_path: &Path, raw: &str) -> Result<String> {
    let invalid = |reason: &str| LinkError::Config {
        path: settings_path.to_path_buf(),
        reason: format!("package-dir '{raw}' {reason}"),
    };

    let mut segments = Vec::new();
    for component in Path::new(raw.trim()).components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_string_lossy()),
            Component::CurDir => {}
            _ => {
                return Err(invalid(
                    "must be a relative path inside the project without '..' segments",
                ))
            }
        }
    }
    if segments.is_empty() {
        return Err(invalid("must name a directory"));
    }
    Ok(segments.join("/"))
}

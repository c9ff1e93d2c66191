use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{json, Map, Value};

use crate::error::{LinkError, Result};

/// Constraint that makes the resolver accept whatever version the path repository offers.
pub const DEV_VERSION_CONSTRAINT: &str = "@dev";

const REPOSITORIES_FIELD: &str = "repositories";
const REQUIRE_FIELD: &str = "require";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub options: PathRepositoryOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRepositoryOptions {
    pub symlink: bool,
}

impl RepositoryDescriptor {
    pub fn symlinked_path(url: impl Into<String>) -> Self {
        Self {
            kind: "path".to_string(),
            url: url.into(),
            options: PathRepositoryOptions { symlink: true },
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "type": self.kind,
            "url": self.url,
            "options": {
                "symlink": self.options.symlink,
            },
        })
    }
}

/// Root `composer.json` held as an ordered object.
///
/// Only `repositories` and `require` are interpreted. Every other field is
/// carried through untouched and keeps its position when the document is
/// serialized again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectManifest {
    fields: Map<String, Value>,
}

impl ProjectManifest {
    pub fn from_json_slice(path: &Path, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|source| LinkError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Pretty-printed with four-space indentation and unescaped slashes.
    pub fn to_pretty_json(&self, path: &Path) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)
            .map_err(|source| LinkError::Serialize {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(out)
    }

    /// `extra.<namespace>.package-dir`, when declared as a string.
    pub fn package_dir_override(&self, namespace: &str) -> Option<&str> {
        self.fields
            .get("extra")?
            .get(namespace)?
            .get("package-dir")?
            .as_str()
    }

    /// `config.vendor-dir`, when declared as a string.
    pub fn vendor_dir(&self) -> Option<&str> {
        self.fields.get("config")?.get("vendor-dir")?.as_str()
    }

    pub fn add_path_repository(&mut self, package_path: &Path, project_root: &Path) -> Result<()> {
        let url = relative_package_url(package_path, project_root)?;
        let descriptor = RepositoryDescriptor::symlinked_path(url);

        let repositories = self
            .fields
            .entry(REPOSITORIES_FIELD)
            .or_insert_with(|| Value::Array(Vec::new()));

        match repositories {
            Value::Array(entries) => {
                entries.insert(0, descriptor.to_json());
            }
            Value::Object(entries) => {
                // Keyed form: the new entry becomes the first key.
                let mut reordered = Map::new();
                reordered.insert(descriptor.url.clone(), descriptor.to_json());
                for (key, value) in std::mem::take(entries) {
                    if key != descriptor.url {
                        reordered.insert(key, value);
                    }
                }
                *entries = reordered;
            }
            other => {
                return Err(LinkError::InvalidManifest {
                    field: REPOSITORIES_FIELD,
                    reason: format!("expected an array or object, found {}", json_kind(other)),
                });
            }
        }

        Ok(())
    }

    pub fn pin_dev_version(&mut self, package_name: &str) -> Result<()> {
        let require = self
            .fields
            .entry(REQUIRE_FIELD)
            .or_insert_with(|| Value::Object(Map::new()));

        match require {
            Value::Object(constraints) => {
                constraints.insert(
                    package_name.to_string(),
                    Value::String(DEV_VERSION_CONSTRAINT.to_string()),
                );
                Ok(())
            }
            other => Err(LinkError::InvalidManifest {
                field: REQUIRE_FIELD,
                reason: format!("expected an object, found {}", json_kind(other)),
            }),
        }
    }
}

/// Lexical path of `package_path` below `project_root`, joined with `/`.
pub(crate) fn relative_package_url(package_path: &Path, project_root: &Path) -> Result<String> {
    let outside = || LinkError::PackageOutsideRoot {
        path: package_path.to_path_buf(),
        root: project_root.to_path_buf(),
    };

    let relative = package_path.strip_prefix(project_root).map_err(|_| outside())?;
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_string_lossy()),
            Component::CurDir => {}
            _ => return Err(outside()),
        }
    }

    if segments.is_empty() {
        return Err(outside());
    }

    Ok(segments.join("/"))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

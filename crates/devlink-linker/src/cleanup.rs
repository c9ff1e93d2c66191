use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use devlink_core::{LinkError, PackagePathIndex, Result};
use devlink_project::ProjectLayout;
use tracing::{debug, info};

/// Removes `<vendor-dir>/<name>` for every discovered package when that entry
/// is a symbolic link. Real directories are left alone.
pub fn remove_local_package_links(
    index: &PackagePathIndex,
    layout: &ProjectLayout,
) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();

    for (name, _) in index.iter() {
        let link_path = layout.vendor_package_path(name);
        let metadata = match fs::symlink_metadata(&link_path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(source) => {
                return Err(LinkError::RemoveLink {
                    path: link_path,
                    source,
                });
            }
        };

        if !metadata.file_type().is_symlink() {
            debug!(package = name, path = %link_path.display(), "vendor entry is not a link, keeping it");
            continue;
        }

        remove_link(&link_path).map_err(|source| LinkError::RemoveLink {
            path: link_path.clone(),
            source,
        })?;
        info!(package = name, path = %link_path.display(), "removed stale package link");
        removed.push(link_path);
    }

    Ok(removed)
}

fn remove_link(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        // Directory symlinks on Windows are removed as directories.
        Err(_) if cfg!(windows) => fs::remove_dir(path),
        result => result,
    }
}

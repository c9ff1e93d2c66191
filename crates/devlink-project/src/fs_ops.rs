use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use devlink_core::{LinkError, Result};
use sha2::{Digest, Sha256};

pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| LinkError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// `None` when the file does not exist; any other failure is a read error.
pub fn read_optional_file(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LinkError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Replaces `path` through a sibling temp file and a rename, keeping the
/// permissions of the file being replaced. Symlinked targets are written in
/// place so the link itself survives.
pub fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    let write_error = |source| LinkError::Write {
        path: path.to_path_buf(),
        source,
    };

    let existing = match fs::symlink_metadata(path) {
        Ok(metadata) => Some(metadata),
        Err(err) if err.kind() == io::ErrorKind::NotFound => None,
        Err(err) => return Err(write_error(err)),
    };
    if existing
        .as_ref()
        .is_some_and(|metadata| metadata.file_type().is_symlink())
    {
        return fs::write(path, contents).map_err(write_error);
    }

    let tmp_path = temp_sibling_path(path);
    let staged = fs::write(&tmp_path, contents).and_then(|()| match &existing {
        Some(metadata) => fs::set_permissions(&tmp_path, metadata.permissions()),
        None => Ok(()),
    });
    if let Err(err) = staged.and_then(|()| fs::rename(&tmp_path, path)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(write_error(err));
    }

    Ok(())
}

pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn temp_sibling_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.devlink-{}.tmp", std::process::id()))
}

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::PersistenceError;

pub(crate) fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Replace `path` with `contents` through a synced sibling temp file
///
/// Readers see either the old file or the new one, never a partial write.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let tmp = temp_path(path);
    let discard = |target: &Path, e: std::io::Error| {
        let _ = fs::remove_file(&tmp);
        io_error(target, e)
    };

    let mut file = File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
    file.write_all(contents).map_err(|e| discard(&tmp, e))?;
    file.sync_all().map_err(|e| discard(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| discard(path, e))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

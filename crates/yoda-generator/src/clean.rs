//! Build directory removal.

use std::{fs, io, path::Path};

use tracing::debug;

/// Remove `build_dir` and everything below it.
///
/// Returns `false` when there was nothing to remove.
pub fn clean(build_dir: &Path) -> io::Result<bool> {
    match fs::remove_dir_all(build_dir) {
        Ok(()) => {
            debug!(dir = %build_dir.display(), "cleaned build directory");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

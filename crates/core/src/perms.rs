use std::io;
use std::path::Path;

use tracing::debug;

use crate::config::Ownership;

/// Applies the configured owner and mode to `path`.
#[cfg(unix)]
pub fn apply_ownership(path: &Path, ownership: &Ownership) -> io::Result<()> {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    std::os::unix::fs::chown(path, Some(ownership.uid), Some(ownership.gid))?;
    let mode = if path.is_dir() {
        ownership.dir_mode
    } else {
        ownership.file_mode
    };
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub fn apply_ownership(_path: &Path, _ownership: &Ownership) -> io::Result<()> {
    Ok(())
}

/// Best-effort variant: a failure is logged and otherwise ignored.
pub fn normalize(path: &Path, ownership: Option<&Ownership>) {
    let Some(ownership) = ownership else {
        return;
    };
    if let Err(err) = apply_ownership(path, ownership) {
        debug!("could not normalize ownership of {}: {}", path.display(), err);
    }
}

/// Creates `dir` and any missing ancestors, normalizing only the directories
/// that did not exist before.
pub fn create_dir_all_owned(dir: &Path, ownership: Option<&Ownership>) -> io::Result<()> {
    let mut missing = Vec::new();
    let mut cursor = Some(dir);
    while let Some(current) = cursor {
        if current.exists() {
            break;
        }
        missing.push(current.to_path_buf());
        cursor = current.parent();
    }

    std::fs::create_dir_all(dir)?;
    for created in missing.iter().rev() {
        normalize(created, ownership);
    }
    Ok(())
}

/// Re-applies ownership to the directories between `path` and `root`
/// (exclusive) whose owner or mode differ from the configured ones.
pub fn repair_ancestors(path: &Path, root: &Path, ownership: Option<&Ownership>) {
    let Some(ownership) = ownership else {
        return;
    };
    for dir in path.ancestors().skip(1) {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        if is_owned(dir, ownership) {
            continue;
        }
        if let Err(err) = apply_ownership(dir, ownership) {
            debug!("could not repair ownership of {}: {}", dir.display(), err);
        }
    }
}

#[cfg(unix)]
fn is_owned(dir: &Path, ownership: &Ownership) -> bool {
    use std::os::unix::fs::MetadataExt;

    match std::fs::metadata(dir) {
        Ok(meta) => {
            meta.uid() == ownership.uid
                && meta.gid() == ownership.gid
                && meta.mode() & 0o777 == ownership.dir_mode & 0o777
        }
        Err(_) => true,
    }
}

#[cfg(not(unix))]
fn is_owned(_dir: &Path, _ownership: &Ownership) -> bool {
    true
}

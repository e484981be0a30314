use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("another run holds the lock at {}", .path.display())]
    LockHeld { path: PathBuf },
    #[error("failed to open lock file {}: {source}", .path.display())]
    LockIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive advisory lock guarding a whole run. Released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: &Path) -> Result<Self, RunError> {
        let io_err = |source: io::Error| RunError::LockIo {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;

        if let Err(err) = file.try_lock_exclusive() {
            debug!("lock attempt on {} failed: {}", path.display(), err);
            return Err(RunError::LockHeld {
                path: path.to_path_buf(),
            });
        }

        file.set_len(0).map_err(io_err)?;
        writeln!(file, "{}", std::process::id()).map_err(io_err)?;
        info!("acquired run lock {}", path.display());

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            debug!("could not release lock {}: {}", self.path.display(), err);
        }
    }
}

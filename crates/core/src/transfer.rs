use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Ownership;
use crate::model::{Disk, TransferState};
use crate::perms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    StatSource,
    StatDestination,
    CreateParent,
    Copy,
    Verify,
    Commit,
    RemoveSource,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransferStage::StatSource => "stat source",
            TransferStage::StatDestination => "stat destination",
            TransferStage::CreateParent => "create parent",
            TransferStage::Copy => "copy",
            TransferStage::Verify => "verify",
            TransferStage::Commit => "commit",
            TransferStage::RemoveSource => "remove source",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("destination exists with a different size (source {source_size} B, destination {destination_size} B)")]
    SizeConflict {
        source_size: u64,
        destination_size: u64,
    },
    #[error("copied {copied} B but source has {expected} B")]
    CopyMismatch { expected: u64, copied: u64 },
    #[error("source and destination are the same path")]
    SamePath,
    #[error("{stage} failed for {}: {source}", .path.display())]
    Io {
        stage: TransferStage,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    fn io(stage: TransferStage, path: &Path, source: io::Error) -> Self {
        TransferError::Io {
            stage,
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug)]
pub enum TransferOutcome {
    Committed { bytes: u64 },
    /// A destination of identical size already existed; the source was removed.
    SkippedIdentical { bytes: u64 },
    /// Dry-run: the transfer (or redundant-source removal) would have happened.
    SkippedDryRun { bytes: u64 },
    Failed(TransferError),
}

/// One file moving from a fragment on `from` to the target fragment on `to`.
#[derive(Debug, Clone)]
pub struct TransferUnit {
    pub from: Disk,
    pub to: Disk,
    pub source: PathBuf,
    pub destination: PathBuf,
    state: TransferState,
}

impl TransferUnit {
    pub fn new(from: Disk, to: Disk, source: PathBuf, destination: PathBuf) -> Self {
        Self {
            from,
            to,
            source,
            destination,
            state: TransferState::Pending,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    fn advance(&mut self, state: TransferState) {
        debug!(
            "{} : {:?} -> {:?}",
            self.source.display(),
            self.state,
            state
        );
        self.state = state;
    }

    fn label(&self) -> String {
        let name = self
            .source
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("[{} -> {}] {}", self.from.id, self.to.id, name)
    }
}

/// Moves single files across disks with copy, verify, commit, delete-source
/// ordering. The source is never removed before a size-matching destination
/// exists under its final name.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    temp_suffix: String,
    ownership: Option<Ownership>,
}

impl TransferEngine {
    pub fn new(temp_suffix: impl Into<String>, ownership: Option<Ownership>) -> Self {
        Self {
            temp_suffix: temp_suffix.into(),
            ownership,
        }
    }

    pub fn temp_path(&self, destination: &Path) -> Option<PathBuf> {
        let mut name: OsString = destination.file_name()?.to_os_string();
        name.push(&self.temp_suffix);
        Some(destination.with_file_name(name))
    }

    pub fn execute(&self, unit: &mut TransferUnit, dry_run: bool) -> TransferOutcome {
        match self.run(unit, dry_run) {
            Ok(outcome) => outcome,
            Err(err) => {
                // A committed destination stays committed; only the redundant source is left.
                if unit.state != TransferState::Committed {
                    unit.advance(TransferState::Failed);
                }
                warn!("{} failed: {}", unit.label(), err);
                TransferOutcome::Failed(err)
            }
        }
    }

    fn run(&self, unit: &mut TransferUnit, dry_run: bool) -> Result<TransferOutcome, TransferError> {
        if unit.source == unit.destination {
            return Err(TransferError::SamePath);
        }

        let source_size = fs::metadata(&unit.source)
            .map_err(|err| TransferError::io(TransferStage::StatSource, &unit.source, err))?
            .len();

        match fs::metadata(&unit.destination) {
            Ok(existing) if existing.len() == source_size => {
                if dry_run {
                    info!("[dry-run] identical copy exists, would remove source {}", unit.label());
                    return Ok(TransferOutcome::SkippedDryRun { bytes: source_size });
                }
                info!(
                    "identical copy exists on {}, removing source on {}: {}",
                    unit.to.id,
                    unit.from.id,
                    unit.source.display()
                );
                fs::remove_file(&unit.source).map_err(|err| {
                    TransferError::io(TransferStage::RemoveSource, &unit.source, err)
                })?;
                unit.advance(TransferState::SkippedIdentical);
                return Ok(TransferOutcome::SkippedIdentical { bytes: source_size });
            }
            Ok(existing) => {
                return Err(TransferError::SizeConflict {
                    source_size,
                    destination_size: existing.len(),
                });
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(TransferError::io(
                    TransferStage::StatDestination,
                    &unit.destination,
                    err,
                ))
            }
        }

        if dry_run {
            info!("[dry-run] {}", unit.label());
            return Ok(TransferOutcome::SkippedDryRun { bytes: source_size });
        }

        info!("{}", unit.label());
        let temp = self.temp_path(&unit.destination).ok_or_else(|| {
            TransferError::io(
                TransferStage::CreateParent,
                &unit.destination,
                io::Error::new(ErrorKind::InvalidInput, "destination has no file name"),
            )
        })?;
        if let Some(parent) = unit.destination.parent() {
            perms::create_dir_all_owned(parent, self.ownership.as_ref())
                .map_err(|err| TransferError::io(TransferStage::CreateParent, parent, err))?;
        }

        unit.advance(TransferState::Copying);
        if let Err(err) = fs::copy(&unit.source, &temp) {
            discard_temp(&temp);
            return Err(TransferError::io(TransferStage::Copy, &unit.source, err));
        }
        if let Err(err) = preserve_mtime(&unit.source, &temp) {
            discard_temp(&temp);
            return Err(TransferError::io(TransferStage::Copy, &temp, err));
        }
        let copied = match fs::metadata(&temp) {
            Ok(meta) => meta.len(),
            Err(err) => {
                discard_temp(&temp);
                return Err(TransferError::io(TransferStage::Verify, &temp, err));
            }
        };
        if copied != source_size {
            discard_temp(&temp);
            return Err(TransferError::CopyMismatch {
                expected: source_size,
                copied,
            });
        }
        unit.advance(TransferState::SizeVerified);

        if let Err(err) = fs::rename(&temp, &unit.destination) {
            discard_temp(&temp);
            return Err(TransferError::io(TransferStage::Commit, &unit.destination, err));
        }
        unit.advance(TransferState::Committed);
        perms::normalize(&unit.destination, self.ownership.as_ref());
        perms::repair_ancestors(&unit.destination, &unit.to.mount, self.ownership.as_ref());

        fs::remove_file(&unit.source)
            .map_err(|err| TransferError::io(TransferStage::RemoveSource, &unit.source, err))?;

        Ok(TransferOutcome::Committed { bytes: source_size })
    }
}

/// Opens the temp file read-only: it carries the source's permission bits.
fn preserve_mtime(source: &Path, temp: &Path) -> io::Result<()> {
    let modified = fs::metadata(source)?.modified()?;
    File::open(temp)?.set_modified(modified)
}

fn discard_temp(temp: &Path) {
    match fs::remove_file(temp) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!("could not remove temporary file {}: {}", temp.display(), err),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use super::{TransferEngine, TransferError, TransferOutcome, TransferUnit};
    use crate::model::{Disk, TransferState};

    fn disk(root: &Path, index: u32) -> Disk {
        Disk {
            id: format!("disk{index}"),
            index,
            mount: root.join(format!("disk{index}")),
        }
    }

    fn unit(root: &Path, relative: &str) -> TransferUnit {
        let from = disk(root, 2);
        let to = disk(root, 1);
        let source = from.mount.join(relative);
        let destination = to.mount.join(relative);
        TransferUnit::new(from, to, source, destination)
    }

    fn write(path: &PathBuf, bytes: &[u8]) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, bytes).expect("write");
    }

    fn engine() -> TransferEngine {
        TransferEngine::new(".partial", None)
    }

    #[test]
    fn commits_copy_and_removes_source() {
        let root = tempfile::tempdir().expect("tempdir");
        let mut unit = unit(root.path(), "movies/Heat/Heat.mkv");
        write(&unit.source, b"0123456789");

        let outcome = engine().execute(&mut unit, false);
        assert!(matches!(outcome, TransferOutcome::Committed { bytes: 10 }));
        assert_eq!(unit.state(), TransferState::Committed);
        assert!(!unit.source.exists());
        assert_eq!(fs::read(&unit.destination).expect("read"), b"0123456789");
        assert!(!root.path().join("disk1/movies/Heat/Heat.mkv.partial").exists());
    }

    #[test]
    fn copy_keeps_source_modification_time() {
        let root = tempfile::tempdir().expect("tempdir");
        let mut unit = unit(root.path(), "movies/Heat/Heat.nfo");
        write(&unit.source, b"<movie/>");
        let before = fs::metadata(&unit.source).expect("meta").modified().expect("mtime");

        engine().execute(&mut unit, false);
        let after = fs::metadata(&unit.destination).expect("meta").modified().expect("mtime");
        assert_eq!(before, after);
    }

    #[test]
    fn identical_destination_removes_redundant_source() {
        let root = tempfile::tempdir().expect("tempdir");
        let mut unit = unit(root.path(), "movies/Heat/Heat.mkv");
        write(&unit.source, b"abc");
        write(&unit.destination, b"xyz");

        let outcome = engine().execute(&mut unit, false);
        assert!(matches!(outcome, TransferOutcome::SkippedIdentical { bytes: 3 }));
        assert_eq!(unit.state(), TransferState::SkippedIdentical);
        assert!(!unit.source.exists());
        assert_eq!(fs::read(&unit.destination).expect("read"), b"xyz");
    }

    #[test]
    fn size_conflict_leaves_both_files_untouched() {
        let root = tempfile::tempdir().expect("tempdir");
        let mut unit = unit(root.path(), "movies/Heat/Heat.mkv");
        write(&unit.source, b"abcdef");
        write(&unit.destination, b"xyz");

        let outcome = engine().execute(&mut unit, false);
        assert!(matches!(
            outcome,
            TransferOutcome::Failed(TransferError::SizeConflict {
                source_size: 6,
                destination_size: 3
            })
        ));
        assert_eq!(unit.state(), TransferState::Failed);
        assert_eq!(fs::read(&unit.source).expect("read"), b"abcdef");
        assert_eq!(fs::read(&unit.destination).expect("read"), b"xyz");
    }

    #[test]
    fn dry_run_touches_nothing() {
        let root = tempfile::tempdir().expect("tempdir");
        let mut fresh = unit(root.path(), "movies/Heat/Heat.mkv");
        write(&fresh.source, b"abc");

        let outcome = engine().execute(&mut fresh, true);
        assert!(matches!(outcome, TransferOutcome::SkippedDryRun { bytes: 3 }));
        assert!(fresh.source.exists());
        assert!(!fresh.destination.exists());
        assert!(!root.path().join("disk1").exists());

        let mut identical = unit(root.path(), "movies/Heat/poster.jpg");
        write(&identical.source, b"img");
        write(&identical.destination, b"img");
        let outcome = engine().execute(&mut identical, true);
        assert!(matches!(outcome, TransferOutcome::SkippedDryRun { bytes: 3 }));
        assert!(identical.source.exists());
    }

    #[test]
    fn missing_source_fails_without_side_effects() {
        let root = tempfile::tempdir().expect("tempdir");
        let mut unit = unit(root.path(), "movies/Heat/gone.mkv");

        let outcome = engine().execute(&mut unit, false);
        assert!(matches!(outcome, TransferOutcome::Failed(TransferError::Io { .. })));
        assert!(!unit.destination.exists());
    }

    #[test]
    fn same_path_is_refused() {
        let root = tempfile::tempdir().expect("tempdir");
        let d = disk(root.path(), 1);
        let path = d.mount.join("movies/Heat/Heat.mkv");
        write(&path, b"abc");
        let mut unit = TransferUnit::new(d.clone(), d, path.clone(), path.clone());

        let outcome = engine().execute(&mut unit, false);
        assert!(matches!(outcome, TransferOutcome::Failed(TransferError::SamePath)));
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn read_only_source_is_transferred() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().expect("tempdir");
        let mut unit = unit(root.path(), "movies/Heat/Heat.mkv");
        write(&unit.source, b"0123456789");
        fs::set_permissions(&unit.source, fs::Permissions::from_mode(0o444)).expect("chmod");
        let before = fs::metadata(&unit.source).expect("meta").modified().expect("mtime");

        let outcome = engine().execute(&mut unit, false);
        assert!(matches!(outcome, TransferOutcome::Committed { bytes: 10 }));
        assert!(!unit.source.exists());
        let meta = fs::metadata(&unit.destination).expect("meta");
        assert_eq!(meta.len(), 10);
        assert_eq!(meta.modified().expect("mtime"), before);
        assert!(!root.path().join("disk1/movies/Heat/Heat.mkv.partial").exists());
    }

    #[test]
    fn temp_path_appends_suffix_to_file_name() {
        let temp = engine()
            .temp_path(Path::new("/mnt/disk1/movies/Heat/Heat.mkv"))
            .expect("has file name");
        assert_eq!(temp, PathBuf::from("/mnt/disk1/movies/Heat/Heat.mkv.partial"));
    }
}
